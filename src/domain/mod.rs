// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types: no Burn, no file I/O.
//
//   vocabulary.rs — token / label vocabularies and the builder
//                   that writes their files
//   label.rs      — label id ↔ (domain, class) arithmetic
//   scores.rs     — accuracy and macro F1 / precision / recall
//   error.rs      — typed configuration and data errors

pub mod error;
pub mod label;
pub mod scores;
pub mod vocabulary;
