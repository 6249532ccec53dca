// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// One use case per command. Each one wires the other layers
// together for a single workflow and owns no ML math itself.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

/// Vocabularies → datasets → training → test → weight export
pub mod train_use_case;

/// Vocabulary files from the raw split files
pub mod vocab_use_case;

/// Test score of a stored checkpoint
pub mod evaluate_use_case;
