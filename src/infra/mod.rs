// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// File formats and persistence used by the other layers:
//
//   checkpoint.rs — Run directory layout, Burn recorder
//                   checkpoints and the config.json snapshot
//
//   metrics.rs    — Per-epoch metric rows and logs/metrics.json
//
//   weights.rs    — Flat binary export of every parameter group
//                   for the downstream inference engine
//
//   word2vec.rs   — Reader for word2vec binary vectors used to
//                   seed the embedding table
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Run directory, model checkpoints and config snapshot
pub mod checkpoint;

/// Training metrics JSON logger
pub mod metrics;

/// Binary weight export
pub mod weights;

/// Pretrained word vectors
pub mod word2vec;
