// ============================================================
// Layer 5 — Stopping and Checkpoint Criteria
// ============================================================
// Two independent trackers, updated once per epoch from the
// validation statistics:
//
//   BestAccuracy   — did validation accuracy beat the best so far?
//                    (drives checkpointing; value never decreases)
//   EarlyStopping  — has validation loss failed to improve on its
//                    best for `patience` consecutive epochs?

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience:     usize,
    best_loss:    f64,
    stale_epochs: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self { patience, best_loss: f64::INFINITY, stale_epochs: 0 }
    }

    /// Record one epoch's validation loss; returns true when training should stop.
    /// A NaN loss never counts as an improvement.
    pub fn update(&mut self, loss: f64) -> bool {
        if loss < self.best_loss {
            self.best_loss    = loss;
            self.stale_epochs = 0;
        } else {
            self.stale_epochs += 1;
        }
        self.stale_epochs >= self.patience
    }

    pub fn best_loss(&self) -> f64 { self.best_loss }

    pub fn stale_epochs(&self) -> usize { self.stale_epochs }
}

#[derive(Debug, Clone)]
pub struct BestAccuracy {
    best: f64,
}

impl BestAccuracy {
    /// Starts at -1 so that a first epoch at 0% still counts as an improvement.
    pub fn new() -> Self {
        Self { best: -1.0 }
    }

    /// Returns true when `accuracy` is a strict improvement.
    pub fn update(&mut self, accuracy: f64) -> bool {
        if accuracy > self.best {
            self.best = accuracy;
            true
        } else {
            false
        }
    }

    pub fn value(&self) -> f64 { self.best }
}

impl Default for BestAccuracy {
    fn default() -> Self {
        Self::new()
    }
}
