// ============================================================
// Layer 6: Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// Two save modes:
//   best  one weights file, overwritten whenever validation loss
//         reaches a new minimum
//   all   one weights file per epoch; the best pointer still
//         tracks the lowest validation loss
//
// File layout:
//   checkpoints/
//     best_model.mpk                    (save mode best)
//     model_epoch_3_loss_0_4210.mpk     (save mode all)
//     best_checkpoint.json              which file holds the best weights
//     train_config.json                 resolved training configuration
//
// The config is needed to rebuild the exact architecture before
// the weights can be loaded into it.

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, str::FromStr};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::ProteinTransformer;

const BEST_POINTER: &str = "best_checkpoint.json";
const CONFIG_FILE: &str = "train_config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    All,
    Best,
}

impl FromStr for SaveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(SaveMode::All),
            "best" => Ok(SaveMode::Best),
            other => Err(format!("unknown save mode '{other}' (all, best)")),
        }
    }
}

/// Contents of best_checkpoint.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestCheckpoint {
    pub epoch:    usize,
    pub val_loss: f64,
    /// Weights file stem, relative to the checkpoint directory.
    pub file:     String,
}

/// Weights file stem for save mode `all`. The recorder replaces
/// everything after the first '.' with its extension, so the loss is
/// written with '_' as the decimal separator.
fn epoch_stem(epoch: usize, val_loss: f64) -> String {
    format!("model_epoch_{epoch}_loss_{val_loss:.4}").replace('.', "_")
}

pub struct CheckpointManager {
    dir:  PathBuf,
    mode: SaveMode,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>, mode: SaveMode) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir, mode })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Called once per epoch after validation.
    /// Writes weights according to the save mode and updates the best pointer.
    pub fn on_epoch<B: Backend>(
        &self,
        model:    &ProteinTransformer<B>,
        epoch:    usize,
        val_loss: f64,
        is_best:  bool,
    ) -> Result<()> {
        let file = match self.mode {
            SaveMode::All => {
                let file = epoch_stem(epoch, val_loss);
                self.record(model, &file)?;
                file
            }
            SaveMode::Best if is_best => {
                let file = "best_model".to_string();
                self.record(model, &file)?;
                file
            }
            SaveMode::Best => return Ok(()),
        };

        if is_best {
            let pointer = BestCheckpoint { epoch, val_loss, file };
            let path = self.dir.join(BEST_POINTER);
            fs::write(&path, serde_json::to_string_pretty(&pointer)?)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            tracing::info!("New best checkpoint: epoch {} (val_loss={:.4})", epoch, val_loss);
        }
        Ok(())
    }

    fn record<B: Backend>(&self, model: &ProteinTransformer<B>, file: &str) -> Result<()> {
        // recorder appends the extension
        let path = self.dir.join(file);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        tracing::debug!("Saved weights '{}'", path.display());
        Ok(())
    }

    pub fn best(&self) -> Result<BestCheckpoint> {
        let path = self.dir.join(BEST_POINTER);
        let s = fs::read_to_string(&path).with_context(|| {
            format!("Cannot find '{}'. Have you run 'train' first?", path.display())
        })?;
        Ok(serde_json::from_str(&s)?)
    }

    /// Load the best weights into `model`, which must have the saved architecture.
    pub fn load_best<B: Backend>(
        &self,
        model:  ProteinTransformer<B>,
        device: &B::Device,
    ) -> Result<(ProteinTransformer<B>, BestCheckpoint)> {
        let best = self.best()?;
        let path = self.dir.join(&best.file);
        tracing::info!("Loading checkpoint '{}' from epoch {}", best.file, best.epoch);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;
        Ok((model.load_record(record), best))
    }

    /// Rebuild the saved architecture and load the best weights into it.
    pub fn restore<B: Backend>(&self, device: &B::Device) -> Result<(ProteinTransformer<B>, TrainConfig)> {
        let cfg = self.load_config()?;
        let model = cfg.model_config().init(device);
        let (model, _) = self.load_best(model, device)?;
        Ok((model, cfg))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' first.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed training config '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::ProteinTransformerConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn model() -> ProteinTransformer<TestBackend> {
        ProteinTransformerConfig::new(8, 8, 2, 1, 16, 0.0).init(&Default::default())
    }

    #[test]
    fn test_best_mode_only_writes_on_improvement() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path(), SaveMode::Best).unwrap();
        let m = model();

        ckpt.on_epoch(&m, 1, 0.9, true).unwrap();
        ckpt.on_epoch(&m, 2, 1.2, false).unwrap();
        let best = ckpt.best().unwrap();
        assert_eq!(best, BestCheckpoint { epoch: 1, val_loss: 0.9, file: "best_model".into() });
    }

    #[test]
    fn test_all_mode_keeps_every_epoch() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path(), SaveMode::All).unwrap();
        let m = model();

        ckpt.on_epoch(&m, 1, 0.5123, true).unwrap();
        ckpt.on_epoch(&m, 2, 0.7777, false).unwrap();

        let mut files: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(
            files,
            ["best_checkpoint.json", "model_epoch_1_loss_0_5123.mpk", "model_epoch_2_loss_0_7777.mpk"]
        );

        let best = ckpt.best().unwrap();
        assert_eq!(best.file, "model_epoch_1_loss_0_5123");
        assert!(tmp.path().join(&best.file).with_extension("mpk").exists());
    }

    #[test]
    fn test_all_mode_same_loss_band_does_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path(), SaveMode::All).unwrap();
        let m = model();

        ckpt.on_epoch(&m, 3, 1.25, true).unwrap();
        ckpt.on_epoch(&m, 3, 1.75, false).unwrap();
        let weights = fs::read_dir(tmp.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "mpk"))
            .count();
        assert_eq!(weights, 2);
        let (_, best) = ckpt.load_best(model(), &Default::default()).unwrap();
        assert_eq!(best.val_loss, 1.25);
    }

    #[test]
    fn test_weights_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path(), SaveMode::Best).unwrap();
        let saved = model();
        ckpt.on_epoch(&saved, 4, 0.1, true).unwrap();

        let (loaded, best) = ckpt.load_best(model(), &Default::default()).unwrap();
        assert_eq!(best.epoch, 4);
        let a: Vec<f32> = saved.angle_head.weight.val().into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.angle_head.weight.val().into_data().to_vec().unwrap();
        for (x, y) in a.iter().zip(&b) {
            // CompactRecorder stores half precision
            assert!((x - y).abs() < 1e-2);
        }
    }

    #[test]
    fn test_missing_pointer_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path(), SaveMode::Best).unwrap();
        assert!(ckpt.best().is_err());
    }
}
