// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Train / validate / test epochs with Adam and cross-entropy.
//
// Backends:
//   - Training runs on B (an AutodiffBackend) for gradients
//   - model.valid() returns the model on B::InnerBackend, with
//     dropout off and BatchNorm on its running statistics
//   - Validation and test loaders therefore use B::InnerBackend
//   - argmax(1) returns [batch,1] so we flatten before readback
//
// After every Adam step the gradient of the padding row is
// masked out beforehand, and embedding / attention rows longer
// than max_norm are shrunk back onto the ball afterwards.
//
// Per epoch:
//   1. train_epoch()  → EpochStats on the training split
//   2. validate()     → EpochStats on the validation split
//   3. checkpoint if validation accuracy beats the best so far
//   4. stop early if validation loss has not improved for
//      `patience` consecutive epochs
//
// Checkpoint and early stopping track different quantities
// (accuracy vs loss), so either can move without the other.

use anyhow::Result;
use burn::{
    data::dataloader::DataLoader,
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::{AstBatch, AstLoader};
use crate::domain::scores::{EpochAccumulator, EpochStats};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    early_stopping::{BestAccuracy, EarlyStopping},
    model::AstCodaModel,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSummary {
    /// Epochs completed, including the one that triggered early stopping
    pub epochs_run:    usize,
    /// Best validation accuracy in percent, -1 if no epoch ran
    pub best_accuracy: f64,
    pub stopped_early: bool,
    /// True once at least one checkpoint has been written
    pub checkpointed:  bool,
}

pub struct Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<AstCodaModel<B>, B>,
{
    model:         AstCodaModel<B>,
    optim:         O,
    learning_rate: f64,
    train_loader:  AstLoader<B>,
    valid_loader:  AstLoader<B::InnerBackend>,
    test_loader:   AstLoader<B::InnerBackend>,
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<AstCodaModel<B>, B>,
{
    pub fn new(
        model:         AstCodaModel<B>,
        optim:         O,
        learning_rate: f64,
        train_loader:  AstLoader<B>,
        valid_loader:  AstLoader<B::InnerBackend>,
        test_loader:   AstLoader<B::InnerBackend>,
    ) -> Self {
        Self { model, optim, learning_rate, train_loader, valid_loader, test_loader }
    }

    pub fn model(&self) -> &AstCodaModel<B> { &self.model }

    /// Replace the current parameters, e.g. with the best checkpoint.
    pub fn restore(&mut self, model: AstCodaModel<B>) { self.model = model; }

    /// One pass over the training split with a parameter update per batch.
    pub fn train_epoch(&mut self) -> Result<EpochStats> {
        let total = self.train_loader.num_items();
        let mut seen = 0;
        let mut acc = EpochAccumulator::new();

        for batch in self.train_loader.iter() {
            let AstBatch { tokens, domains, classes, class_ids } = batch;

            let (loss, output) = self.model.forward_loss(tokens, domains, classes);
            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            let preds = predictions(output.logits)?;

            // Backward pass + Adam update
            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            let grads = self.model.mask_padding_grad(grads);
            self.model = self
                .optim
                .step(self.learning_rate, self.model.clone(), grads)
                .clip_norms();

            seen += class_ids.len();
            acc.push(loss_val, &class_ids, &preds);
            log_progress("train", &acc, seen, total, loss_val);
        }

        Ok(acc.finish(total))
    }

    pub fn validate(&self) -> Result<EpochStats> {
        evaluate(&self.model.valid(), self.valid_loader.as_ref(), "valid")
    }

    pub fn test(&self) -> Result<EpochStats> {
        evaluate(&self.model.valid(), self.test_loader.as_ref(), "test")
    }

    /// Run up to `num_epochs` epochs, printing one row per epoch.
    pub fn fit(
        &mut self,
        num_epochs: usize,
        patience:   usize,
        ckpt:       &CheckpointManager,
        logger:     &mut MetricsLogger,
    ) -> Result<FitSummary> {
        let mut best = BestAccuracy::new();
        let mut stopper = EarlyStopping::new(patience);
        let mut summary = FitSummary {
            epochs_run:    0,
            best_accuracy: best.value(),
            stopped_early: false,
            checkpointed:  false,
        };

        println!("{}", EpochMetrics::HEADER);

        for epoch in 0..num_epochs {
            let train = self.train_epoch()?;
            let eval  = self.validate()?;

            if !train.loss.is_finite() || !eval.loss.is_finite() {
                tracing::warn!("Epoch {}: non-finite loss (train={}, eval={})", epoch, train.loss, eval.loss);
            }

            if best.update(eval.accuracy) {
                ckpt.save_model(&self.model)?;
                summary.checkpointed = true;
                tracing::info!("Epoch {}: new best validation accuracy {:.2}", epoch, eval.accuracy);
            }

            let row = EpochMetrics::new(epoch, train, eval, best.value());
            println!("{}", row.tsv_row());
            logger.log(&row)?;
            tracing::debug!("Metrics written to '{}'", logger.json_path().display());

            summary.epochs_run    = epoch + 1;
            summary.best_accuracy = best.value();

            if stopper.update(eval.loss) {
                tracing::info!(
                    "No validation loss improvement for {} epochs (best {:.5})",
                    stopper.stale_epochs(),
                    stopper.best_loss(),
                );
                println!("Early stopping triggered");
                summary.stopped_early = true;
                break;
            }
        }

        Ok(summary)
    }
}

/// Loss and scores of `model` over one pass of `loader`, without updates.
pub fn evaluate<B: Backend>(
    model:  &AstCodaModel<B>,
    loader: &dyn DataLoader<B, AstBatch<B>>,
    phase:  &str,
) -> Result<EpochStats> {
    let total = loader.num_items();
    let mut seen = 0;
    let mut acc = EpochAccumulator::new();

    for batch in loader.iter() {
        let AstBatch { tokens, domains, classes, class_ids } = batch;
        let (loss, output) = model.forward_loss(tokens, domains, classes);
        let loss_val: f64 = loss.into_scalar().elem::<f64>();
        seen += class_ids.len();
        acc.push(loss_val, &class_ids, &predictions(output.logits)?);
        log_progress(phase, &acc, seen, total, loss_val);
    }

    Ok(acc.finish(total))
}

fn log_progress(phase: &str, acc: &EpochAccumulator, seen: usize, total: usize, loss: f64) {
    tracing::info!("{} batch {} [{}/{}] loss={:.5}", phase, acc.batches(), seen, total, loss);
}

fn predictions<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<i64>> {
    logits
        .argmax(1)
        .flatten::<1>(0, 1)
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow::anyhow!("Cannot read predictions: {e:?}"))
}
