// ============================================================
// Layer 2: PredictUseCase
// ============================================================
// One-letter sequence in, PDB file out.

use anyhow::{anyhow, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice},
    prelude::*,
};
use std::path::PathBuf;

use crate::domain::amino_acid::parse_sequence;
use crate::infra::{
    checkpoint::{CheckpointManager, SaveMode},
    pdb::write_pdb,
};
use crate::ml::{
    evaluator::{Prediction, Predictor},
    BackendKind, NdArrayBackend, WgpuBackend,
};

#[derive(Debug, Clone)]
pub struct PredictRequest {
    pub checkpoint_dir: String,
    pub sequence:       String,
    pub output:         PathBuf,
    pub backend:        Option<BackendKind>,
}

pub struct PredictUseCase {
    request: PredictRequest,
}

impl PredictUseCase {
    pub fn new(request: PredictRequest) -> Self {
        Self { request }
    }

    pub fn execute(&self) -> Result<Prediction> {
        let ckpt = CheckpointManager::new(&self.request.checkpoint_dir, SaveMode::Best)?;
        let cfg  = ckpt.load_config()?;

        match self.request.backend.unwrap_or(cfg.backend) {
            BackendKind::Wgpu => self.run::<WgpuBackend>(&ckpt, WgpuDevice::default()),
            BackendKind::NdArray => self.run::<NdArrayBackend>(&ckpt, NdArrayDevice::default()),
        }
    }

    fn run<B: Backend>(&self, ckpt: &CheckpointManager, device: B::Device) -> Result<Prediction> {
        let req = &self.request;
        let cleaned: String = req.sequence.chars().filter(|c| !c.is_whitespace()).collect();
        let sequence = parse_sequence(&cleaned.to_ascii_uppercase()).map_err(|(pos, code)| {
            anyhow!("Unsupported residue '{}' at position {} (standard one-letter codes only)", code, pos + 1)
        })?;

        let (model, _) = ckpt.restore::<B>(&device)?;
        let prediction = Predictor::new(model, device).predict(&sequence)?;

        write_pdb(&req.output, "predicted structure", &sequence, &prediction.coords)?;
        tracing::info!("Wrote predicted structure to '{}'", req.output.display());
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::ml::model::ProteinTransformer;

    fn saved_checkpoint(dir: &std::path::Path) {
        let cfg = TrainConfig {
            max_len:    Some(10),
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
    }

    fn request(dir: &std::path::Path, sequence: &str) -> PredictRequest {
        PredictRequest {
            checkpoint_dir: dir.to_string_lossy().into_owned(),
            sequence:       sequence.to_string(),
            output:         dir.join("pred.pdb"),
            backend:        None,
        }
    }

    #[test]
    fn test_predict_writes_pdb() {
        let tmp = tempfile::tempdir().unwrap();
        saved_checkpoint(tmp.path());
        let pred = PredictUseCase::new(request(tmp.path(), "mk tay")).execute().unwrap();
        assert_eq!(pred.angles.len(), 5);
        let pdb = std::fs::read_to_string(tmp.path().join("pred.pdb")).unwrap();
        assert!(pdb.contains("MET A   1"));
        assert!(pdb.contains("TYR A   5"));
    }

    #[test]
    fn test_predict_rejects_unknown_residue() {
        let tmp = tempfile::tempdir().unwrap();
        saved_checkpoint(tmp.path());
        let err = PredictUseCase::new(request(tmp.path(), "MKXA")).execute().unwrap_err();
        assert!(err.to_string().contains("'X'"));
    }
}
