// ============================================================
// Layer 1: CLI Commands and Arguments
// ============================================================
// Three subcommands: `train`, `evaluate`, `predict`.
//
// clap's derive macros generate --help, error messages for
// missing args, and string → value conversion. Enum-valued flags
// (loss, schedule, batch mode, ...) parse through their FromStr.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::{
    evaluate_use_case::EvaluateRequest,
    predict_use_case::PredictRequest,
    train_use_case::TrainConfig,
};
use crate::data::sampler::BatchMode;
use crate::infra::checkpoint::SaveMode;
use crate::ml::{losses::LossKind, schedule::ScheduleKind, BackendKind};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a structure model on a ProteinNet-style dataset file
    Train(TrainArgs),

    /// Score the best checkpoint on a dataset split
    Evaluate(EvaluateArgs),

    /// Predict the structure of a single sequence
    Predict(PredictArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Preprocessed dataset file (JSON)
    #[arg(long, default_value = "data/proteinnet.json")]
    pub data: String,

    /// Directory for checkpoints, metrics and structure snapshots
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Validation split to use (default: every "valid*" split)
    #[arg(long)]
    pub valid_split: Option<String>,

    /// Training fraction when the dataset has no validation split
    #[arg(long, default_value_t = 0.9)]
    pub train_fraction: f64,

    /// Skip proteins longer than this (default: dataset setting)
    #[arg(long)]
    pub max_len: Option<usize>,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// random, binned or sorted
    #[arg(long, default_value = "binned")]
    pub batch_mode: BatchMode,

    /// DataLoader worker threads (random batch mode)
    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Hidden dimension; must be divisible by num_heads
    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    /// Encoder layers
    #[arg(long, default_value_t = 6)]
    pub num_layers: usize,

    /// Feed-forward inner dimension
    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Odd convolution kernel applied before the encoder, 0 = off
    #[arg(long, default_value_t = 0)]
    pub conv_kernel: usize,

    /// Structure decoder layers, 0 = encoder only
    #[arg(long, default_value_t = 0)]
    pub decoder_layers: usize,

    /// drmsd, ln-drmsd, mse or combined
    #[arg(long, default_value = "combined")]
    pub loss: LossKind,

    /// constant, noam or plateau
    #[arg(long, default_value = "noam")]
    pub lr_schedule: ScheduleKind,

    /// Learning rate for the constant and plateau schedules
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    #[arg(long, default_value_t = 4000)]
    pub warmup_steps: usize,

    #[arg(long, default_value_t = 1.0)]
    pub noam_factor: f64,

    #[arg(long, default_value_t = 0.5)]
    pub plateau_factor: f64,

    #[arg(long, default_value_t = 10)]
    pub plateau_patience: usize,

    #[arg(long, default_value_t = 1e-6)]
    pub min_lr: f64,

    /// Clip gradients to this L2 norm
    #[arg(long)]
    pub clip_grad: Option<f64>,

    /// Stop after this many epochs without validation improvement
    #[arg(long, default_value_t = 100)]
    pub early_stopping: usize,

    /// all or best
    #[arg(long, default_value = "best")]
    pub save_mode: SaveMode,

    /// wgpu or ndarray
    #[arg(long, default_value = "wgpu")]
    pub backend: BackendKind,

    /// Write a structure snapshot every N epochs, 0 = never
    #[arg(long, default_value_t = 5)]
    pub viz_every: usize,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_path:        a.data,
            checkpoint_dir:   a.checkpoint_dir,
            valid_split:      a.valid_split,
            train_fraction:   a.train_fraction,
            max_len:          a.max_len,
            batch_size:       a.batch_size,
            batch_mode:       a.batch_mode,
            num_workers:      a.num_workers,
            epochs:           a.epochs,
            seed:             a.seed,
            d_model:          a.d_model,
            num_heads:        a.num_heads,
            num_layers:       a.num_layers,
            d_ff:             a.d_ff,
            dropout:          a.dropout,
            conv_kernel:      a.conv_kernel,
            decoder_layers:   a.decoder_layers,
            loss:             a.loss,
            schedule:         a.lr_schedule,
            lr:               a.lr,
            warmup_steps:     a.warmup_steps,
            noam_factor:      a.noam_factor,
            plateau_factor:   a.plateau_factor,
            plateau_patience: a.plateau_patience,
            min_lr:           a.min_lr,
            clip_grad:        a.clip_grad,
            early_stopping:   a.early_stopping,
            save_mode:        a.save_mode,
            backend:          a.backend,
            viz_every:        a.viz_every,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Dataset file (default: the one used for training)
    #[arg(long)]
    pub data: Option<String>,

    #[arg(long, default_value = "test")]
    pub split: String,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Override the training backend (wgpu or ndarray)
    #[arg(long)]
    pub backend: Option<BackendKind>,
}

impl From<EvaluateArgs> for EvaluateRequest {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateRequest {
            checkpoint_dir: a.checkpoint_dir,
            data_path:      a.data,
            split:          a.split,
            batch_size:     a.batch_size.max(1),
            backend:        a.backend,
        }
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Amino-acid sequence in one-letter codes
    #[arg(long)]
    pub sequence: String,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Output PDB file
    #[arg(long, default_value = "prediction.pdb")]
    pub output: PathBuf,

    /// Override the training backend (wgpu or ndarray)
    #[arg(long)]
    pub backend: Option<BackendKind>,
}

impl From<PredictArgs> for PredictRequest {
    fn from(a: PredictArgs) -> Self {
        PredictRequest {
            checkpoint_dir: a.checkpoint_dir,
            sequence:       a.sequence,
            output:         a.output,
            backend:        a.backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_flags_reach_config() {
        let cli = Cli::try_parse_from([
            "protein-transformer", "train",
            "--loss", "ln-drmsd",
            "--lr-schedule", "plateau",
            "--batch-mode", "sorted",
            "--save-mode", "all",
            "--backend", "ndarray",
            "--decoder-layers", "2",
            "--clip-grad", "1.0",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.loss, LossKind::LnDrmsd);
        assert_eq!(cfg.schedule, ScheduleKind::Plateau);
        assert_eq!(cfg.batch_mode, BatchMode::Sorted);
        assert_eq!(cfg.save_mode, SaveMode::All);
        assert_eq!(cfg.backend, BackendKind::NdArray);
        assert_eq!(cfg.decoder_layers, 2);
        assert_eq!(cfg.clip_grad, Some(1.0));
        assert_eq!(cfg.early_stopping, 100);
    }

    #[test]
    fn test_unknown_loss_is_rejected() {
        assert!(Cli::try_parse_from(["protein-transformer", "train", "--loss", "rmsd"]).is_err());
    }

    #[test]
    fn test_predict_requires_sequence() {
        assert!(Cli::try_parse_from(["protein-transformer", "predict"]).is_err());
        let cli = Cli::try_parse_from(["protein-transformer", "predict", "--sequence", "MKV"]).unwrap();
        assert!(matches!(cli.command, Commands::Predict(_)));
    }
}
