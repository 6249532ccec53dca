// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From plain-text files to padded tensor batches:
//
//   token / label / vocabulary files
//       │
//       ▼
//   TextFileLoader   → reads lines through the Preprocessor
//       │
//       ▼
//   AstDataset       → numericalised (token ids, label id) pairs
//       │
//       ▼
//   AstBatcher       → right-padded tensors + domain / class split
//       │
//       ▼
//   DataLoader       → Burn's loader, reshuffled every pass for training

/// Strips NUL bytes and surrounding whitespace from every line
pub mod preprocessor;

/// Reads newline-delimited text files and vocabularies
pub mod loader;

/// Implements Burn's Dataset trait for AST samples
pub mod dataset;

/// Pads samples into tensor batches and builds the loaders
pub mod batcher;
