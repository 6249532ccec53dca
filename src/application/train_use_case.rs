// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load token and label vocabularies   (Layer 4 - data)
//   Step 2: Numericalise train/valid/test        (Layer 4 - data)
//   Step 3: Pretrained embeddings, if any        (Layer 6 - infra)
//   Step 4: Create run directory, save config    (Layer 6 - infra)
//   Step 5: Build model, Adam and loaders        (Layer 5 - ml)
//   Step 6: Train with checkpoint/early stop     (Layer 5 - ml)
//   Step 7: Reload best checkpoint, test it      (Layer 5 - ml)
//   Step 8: Export binary weights                (Layer 6 - infra)
//
// Reference: Burn Book §5 (Training)

use anyhow::{ensure, Context, Result};
use burn::{
    data::dataset::Dataset,
    backend::{
        ndarray::NdArrayDevice,
        wgpu::WgpuDevice,
        Autodiff, NdArray, Wgpu,
    },
    optim::{decay::WeightDecayConfig, AdamConfig},
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::data::{
    batcher::build_loader,
    dataset::{AstDataset, Numericalizer},
    loader::TextFileLoader,
};
use crate::domain::{
    error::DomainError,
    label::LabelCodec,
    scores::EpochStats,
    vocabulary::{LabelVocabulary, TokenVocabulary, UnknownTokens},
};
use crate::infra::{
    checkpoint::{CheckpointManager, RunDirectory},
    metrics::{self, MetricsLogger},
    weights::{HostMatrix, WeightExporter},
    word2vec::KeyedVectors,
};
use crate::ml::{
    model::{AstCodaConfig, AstCodaModel},
    trainer::{FitSummary, Trainer},
};

fn default_learning_rate() -> f64 { 1e-3 }
fn default_weight_decay()  -> f64 { 1e-4 }
fn default_dropout()       -> f64 { 0.5 }
fn default_patience()      -> usize { 3 }
fn default_test_batch()    -> usize { 1 }
fn default_max_norm()      -> f64 { 1.0 }

// ─── Training Configuration ──────────────────────────────────────────────────
// Read from the JSON document given on the command line and written
// back into the run directory as the resolved snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Token lines of the training split, one AST sequence per line
    pub train_x:        String,
    /// Label lines of the training split, aligned with `train_x`
    pub train_y:        String,
    pub valid_x:        String,
    pub valid_y:        String,
    pub test_x:         String,
    pub test_y:         String,
    /// Token vocabulary file, one token per line
    pub token_to_idx:   String,
    /// Label vocabulary file, domain-major
    pub label_to_idx:   String,
    /// Path of a word2vec binary file, or empty for random init.
    #[serde(default)]
    pub embeddings:     String,
    pub embedding_dim:  usize,
    /// Train on the WGPU backend instead of ndarray
    #[serde(default)]
    pub cuda:           bool,
    pub kernel_size:    usize,
    pub num_filters:    usize,
    /// Class names shared by every domain; their count is num_classes
    pub domain_classes: Vec<String>,
    /// Parent of the run directory
    pub model_path:     String,
    pub batch_size:     usize,
    pub num_epochs:     usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate:  f64,
    /// Adam L2 penalty
    #[serde(default = "default_weight_decay")]
    pub weight_decay:   f64,
    #[serde(default = "default_dropout")]
    pub dropout:        f64,
    /// Epochs without validation loss improvement before stopping
    #[serde(default = "default_patience")]
    pub patience:       usize,
    /// Seeds the training shuffle and the UNK vector; random when absent
    #[serde(default)]
    pub seed:           Option<u64>,
    #[serde(default)]
    pub unknown_tokens: UnknownTokens,
    /// Also pad kernel_size - 1 positions after each sequence
    #[serde(default)]
    pub trailing_padding: bool,
    /// Row norm bound for embeddings and attention vectors
    #[serde(default = "default_max_norm")]
    pub max_norm:         f64,
    /// Defaults to `batch_size`
    #[serde(default)]
    pub valid_batch_size: Option<usize>,
    #[serde(default = "default_test_batch")]
    pub test_batch_size:  usize,
}

impl TrainConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config '{}'", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject sizes that would only fail later inside the model.
    pub fn validate(&self) -> Result<()> {
        if self.domain_classes.is_empty() {
            return Err(DomainError::EmptyDomainClasses.into());
        }
        for (value, name) in [
            (self.batch_size,      "batch_size"),
            (self.test_batch_size, "test_batch_size"),
            (self.kernel_size,     "kernel_size"),
            (self.num_filters,     "num_filters"),
            (self.embedding_dim,   "embedding_dim"),
        ] {
            if value == 0 {
                return Err(DomainError::InvalidDimension(name).into());
            }
        }
        if self.valid_batch_size == Some(0) {
            return Err(DomainError::InvalidDimension("valid_batch_size").into());
        }
        ensure!(
            (0.0..1.0).contains(&self.dropout),
            "dropout must be in [0, 1), got {}",
            self.dropout
        );
        ensure!(self.max_norm > 0.0, "max_norm must be positive, got {}", self.max_norm);
        Ok(())
    }

    pub fn num_classes(&self) -> usize { self.domain_classes.len() }

    pub fn run_directory(&self) -> RunDirectory {
        RunDirectory::new(&self.model_path, self.kernel_size, self.num_filters, self.embedding_dim)
    }

    pub fn model_config(&self, vocab_size: usize, num_labels: usize) -> AstCodaConfig {
        AstCodaConfig::new(
            self.kernel_size,
            self.embedding_dim,
            self.num_filters,
            num_labels,
            self.num_classes(),
            vocab_size,
        )
        .with_dropout(self.dropout)
        .with_trailing_padding(self.trailing_padding)
        .with_max_norm(self.max_norm)
    }

    pub fn load_vocabularies(&self) -> Result<(TokenVocabulary, LabelVocabulary)> {
        let loader = TextFileLoader::new();
        let tokens = loader.token_vocabulary(&self.token_to_idx)?;
        let labels = loader.label_vocabulary(&self.label_to_idx)?;
        tracing::info!("Vocabularies: {} tokens, {} labels", tokens.len(), labels.len());
        Ok((tokens, labels))
    }
}

// ─── Prepared inputs ──────────────────────────────────────────────────────────
// Everything a run needs before a backend is chosen.
pub struct TrainingData {
    pub tokens:     TokenVocabulary,
    pub codec:      LabelCodec,
    pub model:      AstCodaConfig,
    pub train:      AstDataset,
    pub valid:      AstDataset,
    pub test:       AstDataset,
    pub pretrained: Option<HostMatrix>,
}

impl TrainingData {
    pub fn load(cfg: &TrainConfig) -> Result<Self> {
        let (tokens, labels) = cfg.load_vocabularies()?;
        let model = cfg.model_config(tokens.len(), labels.len());
        let codec = model.codec()?;
        tracing::info!(
            "{} domains x {} classes",
            codec.num_domains(),
            codec.num_classes()
        );

        let num = Numericalizer { tokens: &tokens, labels: &labels, codec, policy: cfg.unknown_tokens };
        let train = AstDataset::from_files(&cfg.train_x, &cfg.train_y, &num)?;
        let valid = AstDataset::from_files(&cfg.valid_x, &cfg.valid_y, &num)?;
        let test  = AstDataset::from_files(&cfg.test_x,  &cfg.test_y,  &num)?;
        tracing::info!(
            "Datasets: {} train, {} valid, {} test",
            train.len(),
            valid.len(),
            test.len()
        );

        let pretrained = if cfg.embeddings.trim().is_empty() {
            None
        } else {
            let vectors = KeyedVectors::load_binary(&cfg.embeddings)?;
            tracing::info!("Loaded {} pretrained vectors from '{}'", vectors.len(), cfg.embeddings);
            ensure!(
                vectors.dim() == cfg.embedding_dim,
                "'{}' holds {}-dimensional vectors, embedding_dim is {}",
                cfg.embeddings,
                vectors.dim(),
                cfg.embedding_dim
            );
            let mut rng = match cfg.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None       => StdRng::from_entropy(),
            };
            Some(vectors.embedding_matrix(&tokens, &mut rng)?)
        };

        Ok(Self { tokens, codec, model, train, valid, test, pretrained })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrainReport {
    pub fit:  FitSummary,
    pub test: EpochStats,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end.
    pub fn execute(&self) -> Result<TrainReport> {
        let cfg  = &self.config;
        let data = TrainingData::load(cfg)?;

        let run = cfg.run_directory();
        run.create()?;
        CheckpointManager::new(&run.root).save_config(cfg)?;
        tracing::info!("Run directory '{}'", run.root.display());

        if cfg.cuda {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            self.train_on::<Autodiff<Wgpu>>(data, &run, device)
        } else {
            tracing::info!("Using CPU (ndarray) backend");
            self.train_on::<Autodiff<NdArray>>(data, &run, NdArrayDevice::Cpu)
        }
    }

    fn train_on<B: AutodiffBackend>(
        &self,
        data:   TrainingData,
        run:    &RunDirectory,
        device: B::Device,
    ) -> Result<TrainReport> {
        let cfg = &self.config;
        let TrainingData { tokens, codec, model, train, valid, test, pretrained } = data;

        // ── Model + Adam ──────────────────────────────────────────────────────
        let model: AstCodaModel<B> = model.init_with(pretrained.as_ref(), &device)?;
        tracing::info!(
            "Model ready: k={}, filters={}, emb={}, vocab={}",
            cfg.kernel_size,
            cfg.num_filters,
            cfg.embedding_dim,
            tokens.len()
        );
        let optim = AdamConfig::new()
            .with_epsilon(1e-8)
            .with_weight_decay(Some(WeightDecayConfig::new(cfg.weight_decay as f32)))
            .init::<B, AstCodaModel<B>>();

        // ── Loaders: training on B, evaluation on the inner backend ───────────
        let shuffle_seed = cfg.seed.unwrap_or_else(rand::random);
        let train = build_loader::<B>(train, codec, cfg.batch_size, Some(shuffle_seed), device.clone());
        let valid = build_loader::<B::InnerBackend>(
            valid,
            codec,
            cfg.valid_batch_size.unwrap_or(cfg.batch_size),
            None,
            device.clone(),
        );
        let test = build_loader::<B::InnerBackend>(test, codec, cfg.test_batch_size, None, device.clone());

        // ── Train ─────────────────────────────────────────────────────────────
        let ckpt = CheckpointManager::new(&run.root);
        let mut logger = MetricsLogger::new(&run.logs)?;
        let mut trainer = Trainer::new(model, optim, cfg.learning_rate, train, valid, test);
        let fit = trainer.fit(cfg.num_epochs, cfg.patience, &ckpt, &mut logger)?;
        tracing::info!(
            "Trained {} epochs, best validation accuracy {:.2}",
            fit.epochs_run,
            fit.best_accuracy
        );

        // ── Test the best checkpoint ──────────────────────────────────────────
        if ckpt.has_checkpoint() {
            let best = ckpt.load_model(trainer.model().clone(), &device)?;
            trainer.restore(best);
        } else {
            tracing::warn!("No checkpoint was written; testing the current model");
        }

        println!("{}", metrics::TEST_HEADER);
        let test = trainer.test()?;
        println!("{}", metrics::test_row(&test));

        // ── Export ────────────────────────────────────────────────────────────
        let weights = trainer.model().export_weights()?;
        WeightExporter::new(&run.weights).export(&weights, &tokens)?;

        Ok(TrainReport { fit, test })
    }
}
