// ============================================================
// Layer 5: Learning-Rate Schedules
// ============================================================
//   constant  lr stays at its initial value
//   noam      linear warmup then inverse square-root decay,
//             stepped after every batch (Vaswani et al. 2017):
//             factor * d_model^-0.5 * min(step^-0.5, step * warmup^-1.5)
//   plateau   multiply lr by `factor` once the validation loss has
//             not improved for more than `patience` epochs,
//             stepped after every epoch, never below `min_lr`

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Relative improvement needed to reset the plateau counter.
const PLATEAU_THRESHOLD: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    Constant,
    Noam,
    Plateau,
}

impl FromStr for ScheduleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "constant" | "none" => Ok(ScheduleKind::Constant),
            "noam" => Ok(ScheduleKind::Noam),
            "plateau" => Ok(ScheduleKind::Plateau),
            other => Err(format!("unknown lr schedule '{other}' (constant, noam, plateau)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub kind:             ScheduleKind,
    /// Initial rate for constant and plateau.
    pub lr:               f64,
    pub d_model:          usize,
    pub warmup_steps:     usize,
    pub noam_factor:      f64,
    pub plateau_factor:   f64,
    pub plateau_patience: usize,
    pub min_lr:           f64,
}

#[derive(Debug, Clone)]
pub struct LrScheduler {
    cfg:        ScheduleConfig,
    lr:         f64,
    step:       usize,
    best:       f64,
    bad_epochs: usize,
}

impl LrScheduler {
    pub fn new(cfg: ScheduleConfig) -> Self {
        let lr = match cfg.kind {
            ScheduleKind::Noam => noam_rate(&cfg, 1),
            _ => cfg.lr,
        };
        Self { cfg, lr, step: 0, best: f64::INFINITY, bad_epochs: 0 }
    }

    /// Rate to use for the current optimizer step.
    pub fn current(&self) -> f64 {
        self.lr
    }

    /// Advance after a batch. Returns the rate for the batch just started.
    pub fn on_batch(&mut self) -> f64 {
        self.step += 1;
        if self.cfg.kind == ScheduleKind::Noam {
            self.lr = noam_rate(&self.cfg, self.step);
        }
        self.lr
    }

    /// Feed the epoch's validation loss. Returns true when the rate was reduced.
    pub fn on_epoch(&mut self, val_loss: f64) -> bool {
        if self.cfg.kind != ScheduleKind::Plateau || !val_loss.is_finite() {
            return false;
        }
        if val_loss < self.best * (1.0 - PLATEAU_THRESHOLD) {
            self.best       = val_loss;
            self.bad_epochs = 0;
            return false;
        }
        self.bad_epochs += 1;
        if self.bad_epochs <= self.cfg.plateau_patience {
            return false;
        }
        let reduced = (self.lr * self.cfg.plateau_factor).max(self.cfg.min_lr);
        self.bad_epochs = 0;
        if reduced < self.lr {
            tracing::info!("Reducing learning rate {:.3e} -> {:.3e}", self.lr, reduced);
            self.lr = reduced;
            return true;
        }
        false
    }
}

fn noam_rate(cfg: &ScheduleConfig, step: usize) -> f64 {
    let step   = step.max(1) as f64;
    let warmup = cfg.warmup_steps.max(1) as f64;
    cfg.noam_factor
        * (cfg.d_model as f64).powf(-0.5)
        * step.powf(-0.5).min(step * warmup.powf(-1.5))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(kind: ScheduleKind) -> ScheduleConfig {
        ScheduleConfig {
            kind,
            lr: 1e-3,
            d_model: 256,
            warmup_steps: 100,
            noam_factor: 1.0,
            plateau_factor: 0.5,
            plateau_patience: 2,
            min_lr: 2e-4,
        }
    }

    #[test]
    fn test_noam_peaks_at_warmup() {
        let mut s = LrScheduler::new(cfg(ScheduleKind::Noam));
        let rates: Vec<f64> = (0..300).map(|_| s.on_batch()).collect();
        let peak = rates
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i + 1)
            .unwrap();
        assert_eq!(peak, 100);
        let expected = 256f64.powf(-0.5) * 100f64.powf(-0.5);
        assert!((rates[99] - expected).abs() < 1e-12);
        assert!(rates[299] < rates[99]);
    }

    #[test]
    fn test_plateau_reduces_after_patience() {
        let mut s = LrScheduler::new(cfg(ScheduleKind::Plateau));
        assert!(!s.on_epoch(1.0));
        assert!(!s.on_epoch(1.0));
        assert!(!s.on_epoch(1.0));
        // third epoch without improvement exceeds patience 2
        assert!(s.on_epoch(1.0));
        assert!((s.current() - 5e-4).abs() < 1e-12);
    }

    #[test]
    fn test_plateau_respects_min_lr() {
        let mut s = LrScheduler::new(cfg(ScheduleKind::Plateau));
        s.on_epoch(1.0);
        for _ in 0..20 {
            s.on_epoch(2.0);
        }
        assert_eq!(s.current(), 2e-4);
    }

    #[test]
    fn test_tiny_improvement_counts_as_plateau() {
        let mut s = LrScheduler::new(cfg(ScheduleKind::Plateau));
        s.on_epoch(1.0);
        s.on_epoch(0.99999);
        s.on_epoch(0.99998);
        assert!(s.on_epoch(0.99997));
    }

    #[test]
    fn test_constant_never_changes() {
        let mut s = LrScheduler::new(cfg(ScheduleKind::Constant));
        s.on_batch();
        s.on_epoch(5.0);
        s.on_epoch(6.0);
        assert_eq!(s.current(), 1e-3);
    }
}
