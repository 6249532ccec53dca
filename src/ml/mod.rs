// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Model architecture and training loop.
//
//   model.rs          — ASTCODA network
//                       • Token embeddings (row 0 is padding)
//                       • Strided 1-D convolution over k-grams
//                       • BatchNorm + ReLU + dropout
//                       • Domain-supplied attention over positions
//                       • One linear head per domain
//
//   trainer.rs        — Train / validate / test epochs, Adam
//                       updates, checkpoint on best accuracy
//
//   early_stopping.rs — Best-accuracy and loss-patience trackers
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// ASTCODA domain-attention CNN
pub mod model;

/// Epoch loops, checkpointing and early stopping
pub mod trainer;

pub mod early_stopping;
