// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parsing is done by
// clap; every command is routed to a use case in Layer 2.
//
//   1. `train`    — full training run + weight export
//   2. `vocab`    — vocabulary files for `train`
//   3. `evaluate` — test-split score of a stored checkpoint

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, ConfigArg};

#[derive(Parser, Debug)]
#[command(
    name = "astcoda",
    version,
    about = "Train a domain-attention CNN over AST token sequences and export its weights."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(arg)    => Self::run_train(arg),
            Commands::Vocab(arg)    => Self::run_vocab(arg),
            Commands::Evaluate(arg) => Self::run_evaluate(arg),
        }
    }

    fn run_train(arg: ConfigArg) -> Result<()> {
        use crate::application::train_use_case::{TrainConfig, TrainUseCase};

        tracing::info!("Reading training config '{}'", arg.config.display());
        let config = TrainConfig::from_file(&arg.config)?;
        TrainUseCase::new(config).execute()?;

        println!("Training complete. Weights exported.");
        Ok(())
    }

    fn run_vocab(arg: ConfigArg) -> Result<()> {
        use crate::application::vocab_use_case::{VocabConfig, VocabUseCase};

        let config = VocabConfig::from_file(&arg.config)?;
        VocabUseCase::new(config).execute()
    }

    fn run_evaluate(arg: ConfigArg) -> Result<()> {
        use crate::application::evaluate_use_case::EvaluateUseCase;
        use crate::application::train_use_case::TrainConfig;

        let config = TrainConfig::from_file(&arg.config)?;
        EvaluateUseCase::new(config).execute()?;
        Ok(())
    }
}
