// ============================================================
// Layer 3 — Classification Scores
// ============================================================
// Per-epoch statistics: average loss, accuracy (percent) and
// macro-averaged F1 / precision / recall.
//
// Macro averaging: a score is computed per class and averaged
// without weights. The classes are the union of the true and
// the predicted classes; a per-class score whose denominator
// is zero counts as 0.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroScores {
    pub f1:        f64,
    pub precision: f64,
    pub recall:    f64,
}

impl MacroScores {
    pub fn compute(targets: &[i64], predictions: &[i64]) -> Self {
        // class → (true positives, false positives, false negatives)
        let mut counts: BTreeMap<i64, (usize, usize, usize)> = BTreeMap::new();
        for (&t, &p) in targets.iter().zip(predictions) {
            if t == p {
                counts.entry(t).or_default().0 += 1;
            } else {
                counts.entry(p).or_default().1 += 1;
                counts.entry(t).or_default().2 += 1;
            }
        }
        if counts.is_empty() {
            return Self::default();
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let n = counts.len() as f64;
        let (mut f1, mut precision, mut recall) = (0.0, 0.0, 0.0);
        for &(tp, fp, fn_) in counts.values() {
            precision += ratio(tp, tp + fp);
            recall    += ratio(tp, tp + fn_);
            f1        += ratio(2 * tp, 2 * tp + fp + fn_);
        }
        Self { f1: f1 / n, precision: precision / n, recall: recall / n }
    }
}

/// Summary of one pass over a split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub loss:      f64,
    pub accuracy:  f64,
    pub f1:        f64,
    pub precision: f64,
    pub recall:    f64,
}

/// Accumulates batch results; one instance per epoch.
#[derive(Debug, Default)]
pub struct EpochAccumulator {
    loss_sum:    f64,
    batches:     usize,
    correct:     usize,
    targets:     Vec<i64>,
    predictions: Vec<i64>,
}

impl EpochAccumulator {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, loss: f64, targets: &[i64], predictions: &[i64]) {
        self.loss_sum += loss;
        self.batches  += 1;
        self.correct  += targets.iter().zip(predictions).filter(|(t, p)| t == p).count();
        self.targets.extend_from_slice(targets);
        self.predictions.extend_from_slice(predictions);
    }

    pub fn batches(&self) -> usize { self.batches }

    /// Loss is averaged over batches, accuracy over `dataset_len` examples.
    pub fn finish(self, dataset_len: usize) -> EpochStats {
        let loss     = if self.batches > 0 { self.loss_sum / self.batches as f64 } else { f64::NAN };
        let accuracy = if dataset_len > 0 { self.correct as f64 / dataset_len as f64 * 100.0 } else { 0.0 };
        let macro_scores = MacroScores::compute(&self.targets, &self.predictions);
        EpochStats {
            loss,
            accuracy,
            f1:        macro_scores.f1,
            precision: macro_scores.precision,
            recall:    macro_scores.recall,
        }
    }
}
