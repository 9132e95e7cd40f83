// ============================================================
// Layer 5: Training Loop
// ============================================================
// Train + validation loop using Burn's Adam and either Burn's
// DataLoader (random batches) or the length sampler (binned).
//
// Key Burn insight:
//   - Training uses B (an AutodiffBackend) for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - Validation batches are built on the inner backend too
//
// Per epoch:
//   train  forward, loss, backward, Adam step, lr schedule per batch
//   valid  teacher-forced evaluation, plateau schedule, early stopping
//   save   checkpoint, metrics.csv row, structure snapshot
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    data::dataloader::{batcher::Batcher, DataLoaderBuilder},
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{ProteinBatch, ProteinBatcher},
    dataset::ProteinDataset,
    sampler::{BatchMode, LengthSampler},
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
    pdb::StructureSnapshots,
};
use crate::ml::early_stopping::EarlyStopping;
use crate::ml::evaluator::{evaluate_dataset, EvalOptions, Predictor};
use crate::ml::losses::structure_loss;
use crate::ml::model::ProteinTransformer;
use crate::ml::schedule::LrScheduler;

#[derive(Debug, Clone, Copy)]
pub struct TrainOutcome {
    pub epochs_run:    usize,
    pub best_epoch:    usize,
    pub best_val_loss: f64,
}

/// Batches one epoch yields. The DataLoader keeps its final partial batch,
/// the sampler decides for itself.
fn batches_per_epoch(mode: BatchMode, samples: usize, batch_size: usize, sampler: &LengthSampler) -> usize {
    match mode {
        BatchMode::Random => samples.div_ceil(batch_size.max(1)),
        _ => sampler.num_batches(),
    }
}

pub fn run_training<B: AutodiffBackend>(
    cfg:    &TrainConfig,
    train:  ProteinDataset,
    valid:  ProteinDataset,
    ckpt:   &CheckpointManager,
    device: B::Device,
) -> Result<TrainOutcome> {

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: ProteinTransformer<B> = cfg.model_config().init(&device);
    tracing::info!(
        "Model ready: {} encoder layers, {} decoder layers, d_model={}, conv_kernel={}, {} parameters",
        cfg.num_layers, cfg.decoder_layers, cfg.d_model, cfg.conv_kernel, model.num_params(),
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let optim_cfg = AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.98)
        .with_epsilon(1e-9)
        .with_grad_clipping(cfg.clip_grad.map(|c| GradientClippingConfig::Norm(c as f32)));
    let mut optim = optim_cfg.init();
    let mut scheduler = LrScheduler::new(cfg.schedule_config());

    // ── Training batches ──────────────────────────────────────────────────────
    let train_batcher = ProteinBatcher::<B>::new(device.clone());
    let loader = (cfg.batch_mode == BatchMode::Random).then(|| {
        DataLoaderBuilder::new(train_batcher.clone())
            .batch_size(cfg.batch_size)
            .shuffle(cfg.seed)
            .num_workers(cfg.num_workers)
            .build(train.clone())
    });
    let sampler = match cfg.batch_mode {
        BatchMode::Sorted => LengthSampler::sorted(train.lengths(), cfg.batch_size),
        _ => LengthSampler::binned(train.lengths(), cfg.batch_size, cfg.seed),
    };

    let metrics   = MetricsLogger::new(ckpt.dir())?;
    tracing::info!("Logging epoch metrics to '{}'", metrics.csv_path().display());
    let snapshots = StructureSnapshots::new(ckpt.dir());
    let mut early = EarlyStopping::new(cfg.early_stopping);
    let started   = Instant::now();
    let mut epochs_run = 0;

    let val_opts = EvalOptions {
        batch_size:      cfg.batch_size,
        loss:            cfg.loss,
        teacher_forcing: true,
        with_rmsd:       false,
    };

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        epochs_run = epoch;

        // ── Training phase ────────────────────────────────────────────────────
        let pb = ProgressBar::new(batches_per_epoch(cfg.batch_mode, train.sample_count(), cfg.batch_size, &sampler) as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} loss: {msg}")?
                .progress_chars("##-"),
        );

        let batches: Box<dyn Iterator<Item = ProteinBatch<B>> + '_> = match &loader {
            Some(loader) => Box::new(loader.iter()),
            None => {
                let order = sampler.batches(epoch - 1);
                let (batcher, train) = (&train_batcher, &train);
                Box::new(order.into_iter().map(move |idx| batcher.batch(train.select(&idx))))
            }
        };

        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;

        for batch in batches {
            let structure = model.has_decoder().then(|| batch.angle_trig.clone());
            let pred = model.forward(batch.residues.clone(), batch.pad_mask.clone(), structure);
            let loss = structure_loss(cfg.loss, pred, &batch, false);

            let loss_val = loss.breakdown.value(cfg.loss);
            pb.inc(1);
            if !loss_val.is_finite() {
                tracing::warn!("Skipping batch with non-finite loss ({:?})", batch.ids);
                continue;
            }
            train_loss_sum += loss_val;
            train_batches  += 1;
            pb.set_message(format!("{loss_val:.4}"));

            // Backward pass + Adam update
            let lr    = scheduler.on_batch();
            let grads = loss.objective.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);
        }
        pb.finish_and_clear();

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else { f64::NAN };

        // ── Validation phase ──────────────────────────────────────────────────
        // model.valid() → ProteinTransformer<B::InnerBackend>, dropout disabled
        let model_valid = model.valid();
        let report = evaluate_dataset(&model_valid, &valid, val_opts, &device)?;
        let val_loss = report.loss;

        let lr_used = scheduler.current();
        scheduler.on_epoch(val_loss);
        let is_best = early.update(epoch, val_loss);

        tracing::info!(
            "Epoch {:>3}/{} | train_{}={:.4} | val_{}={:.4} | val_drmsd={} | lr={:.2e}{}",
            epoch, cfg.epochs, cfg.loss, avg_train_loss, cfg.loss, val_loss,
            report.breakdown.drmsd.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".into()),
            lr_used,
            if is_best { " *" } else { "" },
        );

        ckpt.on_epoch(&model_valid, epoch, val_loss, is_best)?;
        metrics.log(&EpochMetrics {
            epoch,
            train_loss: avg_train_loss,
            val_loss,
            val: report.breakdown,
            lr: lr_used,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })?;

        // ── Structure snapshot ────────────────────────────────────────────────
        if cfg.viz_every > 0 && epoch % cfg.viz_every == 0 {
            if let Some(record) = valid.record(0) {
                let pred = Predictor::new(model_valid, device.clone()).predict(&record.sequence)?;
                snapshots.write(epoch, &record.id, &record.sequence, &pred.coords, &record.coords)?;
            }
        }

        if early.should_stop() {
            tracing::info!(
                "Early stopping: no improvement for {} epochs (best epoch {})",
                cfg.early_stopping, early.best_epoch(),
            );
            break;
        }
    }

    tracing::info!("Training complete! Best val_{}={:.4} at epoch {}", cfg.loss, early.best(), early.best_epoch());
    Ok(TrainOutcome {
        epochs_run,
        best_epoch:    early.best_epoch(),
        best_val_loss: early.best(),
    })
}
