// ============================================================
// Layer 2: EvaluateUseCase
// ============================================================
// Loads the best checkpoint and scores it on one split of a
// dataset file. Decoder models decode autoregressively here,
// exactly as they would for an unseen protein.

use anyhow::{Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice},
    prelude::*,
};
use std::fs;

use crate::data::{dataset::ProteinDataset, errors::LoadReport, loader::ProteinNetLoader};
use crate::infra::checkpoint::{CheckpointManager, SaveMode};
use crate::ml::{
    evaluator::{evaluate_dataset, EvalOptions, EvalReport},
    BackendKind, NdArrayBackend, WgpuBackend,
};

#[derive(Debug, Clone)]
pub struct EvaluateRequest {
    pub checkpoint_dir: String,
    /// Dataset file; None reuses the one the model was trained on.
    pub data_path:      Option<String>,
    pub split:          String,
    pub batch_size:     usize,
    pub backend:        Option<BackendKind>,
}

pub struct EvaluateUseCase {
    request: EvaluateRequest,
}

impl EvaluateUseCase {
    pub fn new(request: EvaluateRequest) -> Self {
        Self { request }
    }

    pub fn execute(&self) -> Result<EvalReport> {
        let req  = &self.request;
        let ckpt = CheckpointManager::new(&req.checkpoint_dir, SaveMode::Best)?;
        let cfg  = ckpt.load_config()?;

        match req.backend.unwrap_or(cfg.backend) {
            BackendKind::Wgpu => self.run::<WgpuBackend>(&ckpt, WgpuDevice::default()),
            BackendKind::NdArray => self.run::<NdArrayBackend>(&ckpt, NdArrayDevice::default()),
        }
    }

    fn run<B: Backend>(&self, ckpt: &CheckpointManager, device: B::Device) -> Result<EvalReport> {
        let req = &self.request;
        let (model, cfg) = ckpt.restore::<B>(&device)?;

        let data_path = req.data_path.clone().unwrap_or_else(|| cfg.data_path.clone());
        let (mut corpus, mut report) = ProteinNetLoader::new(&data_path).load_with_report()?;
        let records = corpus
            .splits
            .remove(&req.split)
            .with_context(|| format!("Dataset '{}' has no split '{}'", data_path, req.split))?;

        let max_len = cfg.max_len.unwrap_or(model.max_len);
        let dataset = ProteinDataset::with_max_len(&req.split, records, max_len, &mut report);
        log_rejections(&report);
        anyhow::ensure!(dataset.sample_count() > 0, "Split '{}' has no usable proteins", req.split);

        let opts = EvalOptions {
            batch_size:      req.batch_size,
            loss:            cfg.loss,
            teacher_forcing: false,
            with_rmsd:       true,
        };
        let result = evaluate_dataset(&model, &dataset, opts, &device)?;
        result.log(&req.split);

        let path = ckpt.dir().join(format!("eval_{}.json", req.split));
        fs::write(&path, serde_json::to_string_pretty(&result)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::info!("Wrote '{}'", path.display());
        Ok(result)
    }
}

fn log_rejections(report: &LoadReport) {
    if report.rejected() > 0 {
        report.summarize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::domain::geometry::{NUM_ANGLES, NUM_COORDS_PER_RESIDUE};
    use crate::ml::model::ProteinTransformer;
    use serde_json::json;
    use std::path::Path;

    fn split(seqs: &[&str]) -> serde_json::Value {
        let ang: Vec<_> = seqs.iter().map(|s| vec![vec![0.3f32; NUM_ANGLES]; s.len()]).collect();
        let crd: Vec<_> = seqs
            .iter()
            .map(|s| {
                (0..s.len() * NUM_COORDS_PER_RESIDUE)
                    .map(|i| [i as f32 * 0.7, (i % 3) as f32, 1.0])
                    .collect::<Vec<_>>()
            })
            .collect();
        json!({ "seq": seqs, "ang": ang, "crd": crd })
    }

    fn setup(dir: &Path) -> String {
        let data_path = dir.join("data.json");
        let data = json!({
            "settings": { "max_len": 8 },
            "train": split(&["MKVA"]),
            "test": split(&["GSWL", "PLK", "MKVAGSWLPLKE"]),
        });
        fs::write(&data_path, data.to_string()).unwrap();

        let cfg = TrainConfig {
            data_path:  data_path.to_string_lossy().into_owned(),
            max_len:    Some(8),
            d_model:    16,
            num_heads:  2,
            num_layers: 1,
            d_ff:       32,
            backend:    BackendKind::NdArray,
            ..Default::default()
        };
        let ckpt = CheckpointManager::new(dir, SaveMode::Best).unwrap();
        ckpt.save_config(&cfg).unwrap();
        let model: ProteinTransformer<NdArrayBackend> = cfg.model_config().init(&Default::default());
        ckpt.on_epoch(&model, 1, 0.3, true).unwrap();
        dir.to_string_lossy().into_owned()
    }

    fn request(checkpoint_dir: String, split: &str) -> EvaluateRequest {
        EvaluateRequest {
            checkpoint_dir,
            data_path:  None,
            split:      split.to_string(),
            batch_size: 2,
            backend:    None,
        }
    }

    #[test]
    fn test_evaluate_scores_split_and_writes_report() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = setup(tmp.path());
        let report = EvaluateUseCase::new(request(dir, "test")).execute().unwrap();

        // the 12-residue protein is over max_len
        assert_eq!(report.proteins, 2);
        assert_eq!(report.per_protein.len(), 2);
        assert!(report.loss.is_finite());
        assert!(report.mean_rmsd.is_some());
        assert!(tmp.path().join("eval_test.json").exists());
    }

    #[test]
    fn test_unknown_split_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = setup(tmp.path());
        let err = EvaluateUseCase::new(request(dir, "valid-90")).execute().unwrap_err();
        assert!(err.to_string().contains("valid-90"));
    }
}
