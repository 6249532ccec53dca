// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Keeps the per-epoch history of a run and writes it as JSON:
//
//   logs/metrics.json
//   {
//     "train_loss": [...], "train_acc": [...], "train_f1": [...],
//     "train_prec": [...], "train_rec": [...],
//     "eval_loss":  [...], "eval_acc":  [...], "eval_f1":  [...],
//     "eval_prec":  [...], "eval_rec":  [...],
//     "best": 87.5
//   }
//
// The file is rewritten after every epoch, so an aborted run
// still leaves the epochs it finished on disk.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::domain::scores::EpochStats;

/// One epoch: training and validation statistics plus the running best accuracy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train: EpochStats,
    pub eval:  EpochStats,
    pub best:  f64,
}

impl EpochMetrics {
    pub const HEADER: &'static str =
        "Epoch\tTrLoss\tTrAcc\tTrF1\tTrPrec\tTrRec\tEvLoss\tEvAcc\tEvF1\tEvPrec\tEvRec\tBestEvAcc";

    pub fn new(epoch: usize, train: EpochStats, eval: EpochStats, best: f64) -> Self {
        Self { epoch, train, eval, best }
    }

    /// Tab-separated row matching [`EpochMetrics::HEADER`].
    pub fn tsv_row(&self) -> String {
        let (t, e) = (&self.train, &self.eval);
        format!(
            "{}\t{:.5}\t{:.2}\t{:.2}\t{:.2}\t{:.2}\t{:.5}\t{:.2}\t{:.2}\t{:.2}\t{:.2}\t{:.2}",
            self.epoch, t.loss, t.accuracy, t.f1, t.precision, t.recall,
            e.loss, e.accuracy, e.f1, e.precision, e.recall, self.best,
        )
    }
}

pub const TEST_HEADER: &str = "Test Acc\tTest F1\tTest Precision\tTest Recall";

/// Tab-separated test scores matching [`TEST_HEADER`].
pub fn test_row(stats: &EpochStats) -> String {
    format!(
        "{:.4}\t{:.4}\t{:.4}\t{:.4}",
        stats.accuracy, stats.f1, stats.precision, stats.recall
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsHistory {
    pub train_loss: Vec<f64>,
    pub train_acc:  Vec<f64>,
    pub train_f1:   Vec<f64>,
    pub train_prec: Vec<f64>,
    pub train_rec:  Vec<f64>,
    pub eval_loss:  Vec<f64>,
    pub eval_acc:   Vec<f64>,
    pub eval_f1:    Vec<f64>,
    pub eval_prec:  Vec<f64>,
    pub eval_rec:   Vec<f64>,
    pub best:       f64,
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self {
            train_loss: Vec::new(),
            train_acc:  Vec::new(),
            train_f1:   Vec::new(),
            train_prec: Vec::new(),
            train_rec:  Vec::new(),
            eval_loss:  Vec::new(),
            eval_acc:   Vec::new(),
            eval_f1:    Vec::new(),
            eval_prec:  Vec::new(),
            eval_rec:   Vec::new(),
            best:       -1.0,
        }
    }
}

impl MetricsHistory {
    pub fn push(&mut self, m: &EpochMetrics) {
        self.train_loss.push(m.train.loss);
        self.train_acc.push(m.train.accuracy);
        self.train_f1.push(m.train.f1);
        self.train_prec.push(m.train.precision);
        self.train_rec.push(m.train.recall);
        self.eval_loss.push(m.eval.loss);
        self.eval_acc.push(m.eval.accuracy);
        self.eval_f1.push(m.eval.f1);
        self.eval_prec.push(m.eval.precision);
        self.eval_rec.push(m.eval.recall);
        self.best = m.best;
    }

    pub fn epochs(&self) -> usize { self.train_loss.len() }
}

pub struct MetricsLogger {
    json_path: PathBuf,
    history:   MetricsHistory,
}

impl MetricsLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        Ok(Self { json_path: dir.join("metrics.json"), history: MetricsHistory::default() })
    }

    /// Append one epoch and rewrite the JSON file.
    pub fn log(&mut self, m: &EpochMetrics) -> Result<()> {
        self.history.push(m);
        let json = serde_json::to_string_pretty(&self.history)?;
        fs::write(&self.json_path, json)
            .with_context(|| format!("Cannot write '{}'", self.json_path.display()))?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, eval_loss={:.4}",
            m.epoch,
            m.train.loss,
            m.eval.loss,
        );
        Ok(())
    }

    pub fn history(&self) -> &MetricsHistory { &self.history }

    pub fn json_path(&self) -> &PathBuf { &self.json_path }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(loss: f64, accuracy: f64) -> EpochStats {
        EpochStats { loss, accuracy, f1: 0.5, precision: 0.5, recall: 0.5 }
    }

    #[test]
    fn test_row_matches_header_columns() {
        let m = EpochMetrics::new(0, stats(1.0, 50.0), stats(0.9, 60.0), 60.0);
        assert_eq!(m.tsv_row().split('\t').count(), EpochMetrics::HEADER.split('\t').count());
        assert!(m.tsv_row().starts_with("0\t1.00000\t50.00"));
    }

    #[test]
    fn test_writes_history_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = MetricsLogger::new(dir.path().join("logs")).unwrap();
        logger.log(&EpochMetrics::new(0, stats(1.0, 50.0), stats(0.9, 60.0), 60.0)).unwrap();
        logger.log(&EpochMetrics::new(1, stats(0.8, 55.0), stats(1.1, 40.0), 60.0)).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(logger.json_path()).unwrap()).unwrap();
        assert_eq!(json["eval_acc"], serde_json::json!([60.0, 40.0]));
        assert_eq!(json["best"], serde_json::json!(60.0));
        assert_eq!(logger.history().epochs(), 2);
    }

    #[test]
    fn test_test_row_uses_four_decimals() {
        let row = test_row(&stats(0.3, 66.666666));
        assert_eq!(row, "66.6667\t0.5000\t0.5000\t0.5000");
        assert_eq!(TEST_HEADER.split('\t').count(), 4);
    }

    #[test]
    fn test_best_starts_at_minus_one() {
        assert_eq!(MetricsHistory::default().best, -1.0);
    }
}
