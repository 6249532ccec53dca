// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// One subcommand per script. Every script takes exactly one
// positional argument: the path of its JSON configuration.

use clap::{Args, Subcommand};
use std::path::PathBuf;

/// The three top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the classifier, keep the best checkpoint and export its weights
    Train(ConfigArg),

    /// Build token, label and domain vocabulary files from the splits
    Vocab(ConfigArg),

    /// Score the best checkpoint of a finished run on the test split
    Evaluate(ConfigArg),
}

/// The single positional argument shared by every subcommand
#[derive(Args, Debug)]
pub struct ConfigArg {
    /// Path of the JSON configuration document
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}
