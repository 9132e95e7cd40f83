/// Tracks the best validation loss and how long ago it happened.
/// Training stops once more than `patience` epochs pass without a
/// new best.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience:     usize,
    best:         f64,
    best_epoch:   usize,
    epochs_since: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self { patience, best: f64::INFINITY, best_epoch: 0, epochs_since: 0 }
    }

    /// Record an epoch. Returns true if `val_loss` is a new best.
    pub fn update(&mut self, epoch: usize, val_loss: f64) -> bool {
        if val_loss.is_finite() && val_loss < self.best {
            self.best         = val_loss;
            self.best_epoch   = epoch;
            self.epochs_since = 0;
            true
        } else {
            self.epochs_since += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.epochs_since > self.patience
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stops_after_patience_exceeded() {
        let mut es = EarlyStopping::new(2);
        assert!(es.update(1, 3.0));
        assert!(!es.update(2, 3.5));
        assert!(!es.update(3, 3.1));
        assert!(!es.should_stop());
        assert!(!es.update(4, 3.0));
        assert!(es.should_stop());
        assert_eq!(es.best_epoch(), 1);
    }

    #[test]
    fn test_improvement_resets_counter() {
        let mut es = EarlyStopping::new(1);
        es.update(1, 2.0);
        es.update(2, 2.5);
        assert!(es.update(3, 1.5));
        assert!(!es.should_stop());
        assert_eq!(es.best(), 1.5);
    }

    #[test]
    fn test_nan_is_never_best() {
        let mut es = EarlyStopping::new(0);
        assert!(!es.update(1, f64::NAN));
        assert!(es.should_stop());
    }
}
