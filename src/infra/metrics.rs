// ============================================================
// Layer 6: Metrics Logger
// ============================================================
// Appends one CSV row per epoch to <checkpoint_dir>/metrics.csv.
//
//   epoch,train_loss,val_loss,val_drmsd,val_ln_drmsd,val_bb_drmsd,val_mse,val_bb_mse,val_sc_mse,lr,elapsed_secs
//   1,1.843200,1.702100,9.812000,0.014300,7.421000,0.402100,0.311000,0.498000,0.000050,12.4
//
// Losses the run did not compute are written as empty fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::ml::losses::LossBreakdown;

const HEADER: &str =
    "epoch,train_loss,val_loss,val_drmsd,val_ln_drmsd,val_bb_drmsd,val_mse,val_bb_mse,val_sc_mse,lr,elapsed_secs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:        usize,
    pub train_loss:   f64,
    /// Validation value of the optimized loss
    pub val_loss:     f64,
    pub val:          LossBreakdown,
    pub lr:           f64,
    pub elapsed_secs: f64,
}

impl EpochMetrics {
    fn csv_row(&self) -> String {
        let opt = |v: Option<f64>| v.map(|v| format!("{v:.6}")).unwrap_or_default();
        format!(
            "{},{:.6},{:.6},{},{},{},{:.6},{:.6},{:.6},{:.8},{:.1}",
            self.epoch,
            self.train_loss,
            self.val_loss,
            opt(self.val.drmsd),
            opt(self.val.ln_drmsd),
            opt(self.val.bb_drmsd),
            self.val.mse,
            self.val.bb_mse,
            self.val.sc_mse,
            self.lr,
            self.elapsed_secs,
        )
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the header if the file does not exist yet, so
    /// resumed runs append to the same log.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;
        writeln!(f, "{}", m.csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
