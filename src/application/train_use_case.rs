// ============================================================
// Layer 2: TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load and validate the dataset file   (Layer 4 - data)
//   Step 2: Pick train / validation / test sets  (Layer 4 - data)
//   Step 3: Drop proteins over max_len           (Layer 4 - data)
//   Step 4: Report rejected records              (Layer 4 - data)
//   Step 5: Save the resolved config             (Layer 6 - infra)
//   Step 6: Run training loop                    (Layer 5 - ml)
//   Step 7: Evaluate best checkpoint on test     (Layer 5 - ml)

use anyhow::{bail, Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff},
    prelude::Backend,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::data::{
    dataset::{drop_long, ProteinDataset},
    errors::LoadReport,
    loader::ProteinNetLoader,
    sampler::BatchMode,
    splitter::split_train_val,
};
use crate::domain::protein::ProteinRecord;
use crate::domain::corpus::ProteinCorpus;
use crate::infra::checkpoint::{CheckpointManager, SaveMode};
use crate::ml::{
    evaluator::{evaluate_dataset, EvalOptions, EvalReport},
    losses::LossKind,
    model::{ProteinTransformer, ProteinTransformerConfig},
    schedule::{ScheduleConfig, ScheduleKind},
    trainer::run_training,
    BackendKind, NdArrayBackend, WgpuBackend,
};

pub const TRAIN_SPLIT: &str = "train";
pub const TEST_SPLIT: &str = "test";

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Saved next to the weights
// as train_config.json so evaluate/predict can rebuild the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_path:        String,
    pub checkpoint_dir:   String,
    /// Validation split name; None merges every "valid*" split.
    pub valid_split:      Option<String>,
    /// Used only when the file has no validation split.
    pub train_fraction:   f64,
    /// Longest protein kept; None uses the dataset file's setting.
    pub max_len:          Option<usize>,

    pub batch_size:       usize,
    pub batch_mode:       BatchMode,
    pub num_workers:      usize,
    pub epochs:           usize,
    pub seed:             u64,

    pub d_model:          usize,
    pub num_heads:        usize,
    pub num_layers:       usize,
    pub d_ff:             usize,
    pub dropout:          f64,
    pub conv_kernel:      usize,
    pub decoder_layers:   usize,

    pub loss:             LossKind,
    pub schedule:         ScheduleKind,
    pub lr:               f64,
    pub warmup_steps:     usize,
    pub noam_factor:      f64,
    pub plateau_factor:   f64,
    pub plateau_patience: usize,
    pub min_lr:           f64,
    pub clip_grad:        Option<f64>,

    pub early_stopping:   usize,
    pub save_mode:        SaveMode,
    pub backend:          BackendKind,
    /// Write a structure snapshot every N epochs, 0 = never.
    pub viz_every:        usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path:        "data/proteinnet.json".to_string(),
            checkpoint_dir:   "checkpoints".to_string(),
            valid_split:      None,
            train_fraction:   0.9,
            max_len:          None,
            batch_size:       8,
            batch_mode:       BatchMode::Binned,
            num_workers:      2,
            epochs:           10,
            seed:             42,
            d_model:          256,
            num_heads:        8,
            num_layers:       6,
            d_ff:             1024,
            dropout:          0.1,
            conv_kernel:      0,
            decoder_layers:   0,
            loss:             LossKind::Combined,
            schedule:         ScheduleKind::Noam,
            lr:               1e-4,
            warmup_steps:     4000,
            noam_factor:      1.0,
            plateau_factor:   0.5,
            plateau_patience: 10,
            min_lr:           1e-6,
            clip_grad:        None,
            early_stopping:   100,
            save_mode:        SaveMode::Best,
            backend:          BackendKind::Wgpu,
            viz_every:        5,
        }
    }
}

impl TrainConfig {
    /// Model architecture. `max_len` must already be resolved.
    pub fn model_config(&self) -> ProteinTransformerConfig {
        ProteinTransformerConfig::new(
            self.max_len.unwrap_or(1),
            self.d_model,
            self.num_heads,
            self.num_layers,
            self.d_ff,
            self.dropout,
        )
        .with_conv_kernel(self.conv_kernel)
        .with_decoder_layers(self.decoder_layers)
    }

    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            kind:             self.schedule,
            lr:               self.lr,
            d_model:          self.d_model,
            warmup_steps:     self.warmup_steps,
            noam_factor:      self.noam_factor,
            plateau_factor:   self.plateau_factor,
            plateau_patience: self.plateau_patience,
            min_lr:           self.min_lr,
        }
    }

    /// Reject settings the model cannot be built with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.num_heads == 0 || self.d_model % self.num_heads != 0 {
            bail!("d_model ({}) must be divisible by num_heads ({})", self.d_model, self.num_heads);
        }
        if self.conv_kernel > 0 && self.conv_kernel % 2 == 0 {
            bail!("conv_kernel must be odd, got {}", self.conv_kernel);
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must be in [0, 1), got {}", self.dropout);
        }
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            bail!("train_fraction must be in (0, 1), got {}", self.train_fraction);
        }
        Ok(())
    }
}

/// Datasets for one run, already filtered by length.
pub struct TrainingSets {
    pub train:   ProteinDataset,
    pub valid:   ProteinDataset,
    pub test:    Option<ProteinDataset>,
    pub max_len: usize,
}

/// Choose train/valid/test from a loaded corpus.
pub fn prepare_sets(cfg: &TrainConfig, mut corpus: ProteinCorpus, report: &mut LoadReport) -> Result<TrainingSets> {
    let max_len = cfg.max_len.unwrap_or(corpus.settings.max_len);

    let train_records = corpus
        .splits
        .remove(TRAIN_SPLIT)
        .with_context(|| format!("Dataset has no '{TRAIN_SPLIT}' split"))?;
    let train_records = drop_long(TRAIN_SPLIT, train_records, max_len, report);

    let valid_names: Vec<String> = match &cfg.valid_split {
        Some(name) => {
            if !corpus.splits.contains_key(name) {
                bail!("Dataset has no validation split named '{}'", name);
            }
            vec![name.clone()]
        }
        None => corpus.validation_splits().into_iter().map(String::from).collect(),
    };

    let (train_records, valid_records): (Vec<ProteinRecord>, Vec<ProteinRecord>) = if valid_names.is_empty() {
        tracing::info!(
            "No validation split found, holding out {:.0}% of training proteins",
            (1.0 - cfg.train_fraction) * 100.0
        );
        split_train_val(train_records, cfg.train_fraction, cfg.seed)
    } else {
        tracing::info!("Validating on: {}", valid_names.join(", "));
        let valid = valid_names
            .iter()
            .filter_map(|name| corpus.splits.remove(name).map(|records| (name, records)))
            .flat_map(|(name, records)| drop_long(name, records, max_len, report))
            .collect();
        (train_records, valid)
    };

    let train = ProteinDataset::new(train_records);
    let valid = ProteinDataset::new(valid_records);
    let test  = corpus
        .splits
        .remove(TEST_SPLIT)
        .map(|records| ProteinDataset::with_max_len(TEST_SPLIT, records, max_len, report));

    if train.sample_count() == 0 {
        bail!("No training proteins left after validation (max_len = {})", max_len);
    }
    if valid.sample_count() == 0 {
        bail!("No validation proteins left after validation (max_len = {})", max_len);
    }

    Ok(TrainingSets { train, valid, test, max_len })
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
    /// Returns the test report when the dataset has a test split.
    pub fn execute(&self) -> Result<Option<EvalReport>> {
        let mut cfg = self.config.clone();
        cfg.validate()?;

        // ── Step 1: Load and validate every record ────────────────────────────
        tracing::info!("Loading dataset '{}'", cfg.data_path);
        let (corpus, mut report) = ProteinNetLoader::new(&cfg.data_path).load_with_report()?;

        // ── Steps 2-3: Choose splits, filter by length ────────────────────────
        let sets = prepare_sets(&cfg, corpus, &mut report)?;
        tracing::info!(
            "Proteins: {} train, {} validation, {} test (max_len {})",
            sets.train.sample_count(),
            sets.valid.sample_count(),
            sets.test.as_ref().map_or(0, ProteinDataset::sample_count),
            sets.max_len,
        );

        // ── Step 4: Report rejected records ───────────────────────────────────
        report.summarize();
        report.write_summary_files(Path::new(&cfg.checkpoint_dir))?;

        // ── Step 5: Save resolved config for evaluate/predict ─────────────────
        cfg.max_len = Some(sets.max_len);
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir, cfg.save_mode)?;
        ckpt.save_config(&cfg)?;

        // ── Steps 6-7: Train, then test (Layer 5) ─────────────────────────────
        match cfg.backend {
            BackendKind::Wgpu => {
                let device = WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                train_and_test::<Autodiff<WgpuBackend>>(&cfg, sets, &ckpt, device)
            }
            BackendKind::NdArray => {
                tracing::info!("Using NdArray (CPU) backend");
                train_and_test::<Autodiff<NdArrayBackend>>(&cfg, sets, &ckpt, NdArrayDevice::default())
            }
        }
    }
}

fn train_and_test<B: AutodiffBackend>(
    cfg:    &TrainConfig,
    sets:   TrainingSets,
    ckpt:   &CheckpointManager,
    device: B::Device,
) -> Result<Option<EvalReport>> {
    let outcome = run_training::<B>(cfg, sets.train, sets.valid, ckpt, device.clone())?;
    tracing::info!(
        "Ran {} epochs, best epoch {} (val_{}={:.4})",
        outcome.epochs_run, outcome.best_epoch, cfg.loss, outcome.best_val_loss,
    );

    match sets.test.filter(|t| t.sample_count() > 0) {
        Some(test) => evaluate_best_on_test::<B>(cfg, &test, ckpt, &device),
        None => Ok(None),
    }
}

/// Score the best checkpoint on the test split and write test_metrics.json.
/// Returns None when training never produced a checkpoint.
fn evaluate_best_on_test<B: Backend>(
    cfg:    &TrainConfig,
    test:   &ProteinDataset,
    ckpt:   &CheckpointManager,
    device: &B::Device,
) -> Result<Option<EvalReport>> {
    if ckpt.best().is_err() {
        tracing::warn!(
            "No best checkpoint in '{}': no epoch produced a finite validation loss. Skipping the test split.",
            ckpt.dir().display()
        );
        return Ok(None);
    }

    let model: ProteinTransformer<B> = cfg.model_config().init(device);
    let (model, _) = ckpt.load_best(model, device)?;
    let opts = EvalOptions {
        batch_size:      cfg.batch_size,
        loss:            cfg.loss,
        teacher_forcing: false,
        with_rmsd:       true,
    };
    let report = evaluate_dataset(&model, test, opts, device)?;
    report.log("Test");

    let path = ckpt.dir().join("test_metrics.json");
    fs::write(&path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("Cannot write '{}'", path.display()))?;
    Ok(Some(report))
}
