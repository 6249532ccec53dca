// ============================================================
// Layer 4 — AST Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<AstSample>
// into tensors, and builds the DataLoaders that feed them.
//
// Sequences have different lengths, so they are right-padded
// with PAD_ID (0) to the longest sequence of the batch. No
// sequence is ever truncated. A batch whose sequences are all
// empty still gets one padding column so the model always sees
// at least one position.
//
//   [a b c]      [a b c]
//   [a a]    →   [a a 0]
//   [b c c]      [b c c]
//
// Label ids are split into the domain that picks the attention
// vector and head, and the class that is the cross-entropy
// target. Labels were range-checked when the dataset was built.
//
// Reference: Burn Book §4 (Batcher)

use std::sync::Arc;

use burn::{
    data::dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
    prelude::*,
};

use crate::data::dataset::{AstDataset, AstSample};
use crate::domain::{label::LabelCodec, vocabulary::PAD_ID};

// ─── AstBatch ─────────────────────────────────────────────────────────────────
/// A padded batch ready for the model forward pass.
/// All tensors have batch_size as their first dimension.
#[derive(Debug, Clone)]
pub struct AstBatch<B: Backend> {
    /// Token ids — shape: [batch_size, max_len]
    pub tokens: Tensor<B, 2, Int>,

    /// label div num_classes — shape: [batch_size]
    /// Selects the attention vector and the head of each example
    pub domains: Tensor<B, 1, Int>,

    /// label mod num_classes — shape: [batch_size]
    pub classes: Tensor<B, 1, Int>,

    /// Host copy of `classes`, used for the metrics.
    pub class_ids: Vec<i64>,
}

/// Loader over padded AST batches on backend B.
pub type AstLoader<B> = Arc<dyn DataLoader<B, AstBatch<B>>>;

// ─── AstBatcher ───────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct AstBatcher {
    /// Splits label ids into (domain, class)
    pub codec: LabelCodec,
}

impl AstBatcher {
    pub fn new(codec: LabelCodec) -> Self {
        Self { codec }
    }
}

impl<B: Backend> Batcher<B, AstSample, AstBatch<B>> for AstBatcher {
    fn batch(&self, items: Vec<AstSample>, device: &B::Device) -> AstBatch<B> {
        let batch_size = items.len();
        let max_len = items
            .iter()
            .map(|s| s.token_ids.len())
            .max()
            .unwrap_or(0)
            .max(1);

        let mut token_flat = Vec::with_capacity(batch_size * max_len);
        for sample in &items {
            token_flat.extend(sample.token_ids.iter().map(|&id| id as i32));
            token_flat.extend(std::iter::repeat(PAD_ID as i32).take(max_len - sample.token_ids.len()));
        }

        let num_classes = self.codec.num_classes();
        let domains: Vec<i32> = items.iter().map(|s| (s.label / num_classes) as i32).collect();
        let classes: Vec<i32> = items.iter().map(|s| (s.label % num_classes) as i32).collect();

        let tokens = Tensor::<B, 1, Int>::from_ints(token_flat.as_slice(), device)
            .reshape([batch_size, max_len]);

        AstBatch {
            tokens,
            domains:   Tensor::<B, 1, Int>::from_ints(domains.as_slice(), device),
            classes:   Tensor::<B, 1, Int>::from_ints(classes.as_slice(), device),
            class_ids: classes.iter().map(|&c| c as i64).collect(),
        }
    }
}

/// Build a single-threaded loader; `shuffle` carries the seed of a
/// loader that reshuffles on every pass.
pub fn build_loader<B: Backend>(
    dataset:    AstDataset,
    codec:      LabelCodec,
    batch_size: usize,
    shuffle:    Option<u64>,
    device:     B::Device,
) -> AstLoader<B> {
    let builder = DataLoaderBuilder::new(AstBatcher::new(codec))
        .batch_size(batch_size)
        .set_device(device);
    match shuffle {
        Some(seed) => builder.shuffle(seed).build(dataset),
        None       => builder.build(dataset),
    }
}
