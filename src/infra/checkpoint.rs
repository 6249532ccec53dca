// ============================================================
// Layer 6 — Run Directory and Checkpoints
// ============================================================
// Every training run owns one directory:
//
//   <model_path>/model_k<kernel>_nf<filters>_e<emb_dim>/
//     config.json      ← resolved configuration snapshot
//     model.mpk.gz     ← best checkpoint (highest validation accuracy)
//     logs/metrics.json
//     weights/*.bin    ← binary export for the inference engine
//
// Checkpoints go through Burn's full-precision MessagePack+gzip
// recorder so that the reloaded best model exports the exact
// parameters it was trained to.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};

use crate::ml::model::AstCodaModel;

type CheckpointRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

const CHECKPOINT_NAME: &str = "model";
const CHECKPOINT_FILE: &str = "model.mpk.gz";
const CONFIG_FILE:     &str = "config.json";

#[derive(Debug, Clone)]
pub struct RunDirectory {
    /// `<model_path>/model_k<k>_nf<filters>_e<emb>`
    pub root:    PathBuf,
    /// Holds `metrics.json`
    pub logs:    PathBuf,
    /// Binary export for the inference engine
    pub weights: PathBuf,
}

impl RunDirectory {
    pub fn new(model_path: impl AsRef<Path>, kernel_size: usize, num_filters: usize, embedding_dim: usize) -> Self {
        let root = model_path
            .as_ref()
            .join(format!("model_k{kernel_size}_nf{num_filters}_e{embedding_dim}"));
        Self { logs: root.join("logs"), weights: root.join("weights"), root }
    }

    /// Create the run directory and its subdirectories.
    pub fn create(&self) -> Result<()> {
        for dir in [&self.root, &self.logs, &self.weights] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        }
        Ok(())
    }
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn has_checkpoint(&self) -> bool {
        self.dir.join(CHECKPOINT_FILE).exists()
    }

    /// Overwrite the stored checkpoint with `model`.
    pub fn save_model<B: Backend>(&self, model: &AstCodaModel<B>) -> Result<()> {
        let path = self.dir.join(CHECKPOINT_NAME);
        CheckpointRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        tracing::debug!("Saved checkpoint '{}'", path.display());
        Ok(())
    }

    /// Load the stored checkpoint into a model of the same architecture.
    pub fn load_model<B: Backend>(&self, model: AstCodaModel<B>, device: &B::Device) -> Result<AstCodaModel<B>> {
        let path = self.dir.join(CHECKPOINT_NAME);
        let record = CheckpointRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Has the run been trained?", path.display())
            })?;
        Ok(model.load_record(record))
    }

    pub fn save_config<C: Serialize>(&self, cfg: &C) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved config snapshot to '{}'", path.display());
        Ok(())
    }

    pub fn load_config<C: DeserializeOwned>(&self) -> Result<C> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::AstCodaConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_run_directory_layout() {
        let run = RunDirectory::new("runs", 3, 64, 16);
        assert_eq!(run.root, PathBuf::from("runs/model_k3_nf64_e16"));
        assert_eq!(run.logs, PathBuf::from("runs/model_k3_nf64_e16/logs"));
        assert_eq!(run.weights, PathBuf::from("runs/model_k3_nf64_e16/weights"));
    }

    #[test]
    fn test_create_makes_all_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let run = RunDirectory::new(tmp.path().join("nested"), 2, 4, 8);
        run.create().unwrap();
        assert!(run.logs.is_dir() && run.weights.is_dir());
    }

    #[test]
    fn test_config_snapshot_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path());
        let value = serde_json::json!({ "kernel_size": 3, "domain_classes": ["a", "b"] });
        ckpt.save_config(&value).unwrap();
        assert_eq!(ckpt.load_config::<serde_json::Value>().unwrap(), value);
    }

    #[test]
    fn test_checkpoint_restores_parameters() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path());
        let device = Default::default();
        let config = AstCodaConfig::new(2, 3, 4, 4, 2, 5);

        let trained = config.init::<TestBackend>(&device).unwrap();
        assert!(!ckpt.has_checkpoint());
        ckpt.save_model(&trained).unwrap();
        assert!(ckpt.has_checkpoint());

        let fresh = config.init::<TestBackend>(&device).unwrap();
        let restored = ckpt.load_model(fresh, &device).unwrap();
        assert_eq!(
            restored.export_weights().unwrap(),
            trained.export_weights().unwrap()
        );
    }
}
