// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores the stored best checkpoint of a run on its test split:
//
//   Step 1: Load vocabularies and the test split   (Layer 4 - data)
//   Step 2: Rebuild the model, load the checkpoint (Layer 6 - infra)
//   Step 3: One evaluation pass, print the row     (Layer 5 - ml)
//
// No autodiff: the model lives on the plain backend, so dropout
// is off and BatchNorm uses its running statistics.

use anyhow::{bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    prelude::*,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::build_loader,
    dataset::{AstDataset, Numericalizer},
};
use crate::domain::scores::EpochStats;
use crate::infra::{checkpoint::CheckpointManager, metrics};
use crate::ml::{model::AstCodaModel, trainer::evaluate};

pub struct EvaluateUseCase {
    config: TrainConfig,
}

impl EvaluateUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EpochStats> {
        if self.config.cuda {
            self.evaluate_on::<Wgpu>(WgpuDevice::default())
        } else {
            self.evaluate_on::<NdArray>(NdArrayDevice::Cpu)
        }
    }

    fn evaluate_on<B: Backend>(&self, device: B::Device) -> Result<EpochStats> {
        let cfg = &self.config;
        let run = cfg.run_directory();
        let ckpt = CheckpointManager::new(&run.root);
        if !ckpt.has_checkpoint() {
            bail!("No checkpoint in '{}'. Run `train` first.", run.root.display());
        }

        let (tokens, labels) = cfg.load_vocabularies()?;
        let model_cfg = cfg.model_config(tokens.len(), labels.len());
        let codec = model_cfg.codec()?;
        let num = Numericalizer { tokens: &tokens, labels: &labels, codec, policy: cfg.unknown_tokens };
        let test = AstDataset::from_files(&cfg.test_x, &cfg.test_y, &num)?;

        let model: AstCodaModel<B> = model_cfg.init(&device)?;
        let model = ckpt.load_model(model, &device)?;
        tracing::info!("Loaded checkpoint from '{}'", run.root.display());

        let loader = build_loader::<B>(test, codec, cfg.test_batch_size, None, device);
        let stats = evaluate(&model, loader.as_ref(), "test")?;

        println!("{}", metrics::TEST_HEADER);
        println!("{}", metrics::test_row(&stats));
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainUseCase;
    use std::{fs, path::Path};

    fn config(dir: &Path) -> TrainConfig {
        let write = |name: &str, body: &str| {
            let p = dir.join(name);
            fs::write(&p, body).unwrap();
            p.to_string_lossy().into_owned()
        };
        let x = write("x.txt", "a b c\na a\nb c c\n");
        let y = write("y.txt", "java_bad\npython_good\njava_good\n");
        let json = serde_json::json!({
            "train_x": x, "train_y": y, "valid_x": x, "valid_y": y, "test_x": x, "test_y": y,
            "token_to_idx": write("tokens.txt", "a\nb\nc\n"),
            "label_to_idx": write("labels.txt", "java_bad\njava_good\npython_bad\npython_good\n"),
            "embedding_dim": 4, "kernel_size": 2, "num_filters": 3,
            "domain_classes": ["bad", "good"],
            "model_path": dir.join("runs").to_string_lossy(),
            "batch_size": 2, "num_epochs": 2, "seed": 3
        });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_requires_a_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EvaluateUseCase::new(config(dir.path())).execute().is_err());
    }

    #[test]
    fn test_reproduces_the_training_test_score() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let report = TrainUseCase::new(cfg.clone()).execute().unwrap();
        let stats  = EvaluateUseCase::new(cfg).execute().unwrap();

        assert!((stats.accuracy - report.test.accuracy).abs() < 1e-9);
        assert!((stats.loss - report.test.loss).abs() < 1e-4);
    }
}
