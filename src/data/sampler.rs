// ============================================================
// Layer 4: Length-Aware Batch Sampler
// ============================================================
// Groups proteins of similar length into the same minibatch so
// the batcher pads as little as possible.
//
// Two orderings:
//   sorted  ascending length, fixed batch order (evaluation)
//   binned  ties broken randomly, batches cut from the sorted
//           order, then the batch order shuffled every epoch
//
// Randomness comes from a StdRng seeded with (seed + epoch), so
// a run is reproducible and every epoch still sees a new order.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How training minibatches are formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// Uniformly shuffled batches through Burn's DataLoader
    Random,
    /// Length-binned batches, shuffled batch order
    Binned,
    /// Ascending length, no shuffling
    Sorted,
}

impl FromStr for BatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(BatchMode::Random),
            "binned" => Ok(BatchMode::Binned),
            "sorted" => Ok(BatchMode::Sorted),
            other => Err(format!("unknown batch mode '{other}' (random, binned, sorted)")),
        }
    }
}

pub struct LengthSampler {
    lengths:    Vec<usize>,
    batch_size: usize,
    shuffle:    bool,
    seed:       u64,
}

impl LengthSampler {
    /// Deterministic ascending-length batches.
    pub fn sorted(lengths: Vec<usize>, batch_size: usize) -> Self {
        Self { lengths, batch_size: batch_size.max(1), shuffle: false, seed: 0 }
    }

    /// Length-binned batches in a per-epoch random order.
    pub fn binned(lengths: Vec<usize>, batch_size: usize, seed: u64) -> Self {
        Self { lengths, batch_size: batch_size.max(1), shuffle: true, seed }
    }

    pub fn num_batches(&self) -> usize {
        self.lengths.len().div_ceil(self.batch_size)
    }

    /// Index batches for one epoch.
    pub fn batches(&self, epoch: usize) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.lengths.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));

        if self.shuffle {
            // Shuffle first so the stable sort breaks length ties randomly
            indices.shuffle(&mut rng);
        }
        indices.sort_by_key(|&i| self.lengths[i]);

        let mut batches: Vec<Vec<usize>> = indices
            .chunks(self.batch_size)
            .map(<[usize]>::to_vec)
            .collect();

        if self.shuffle {
            batches.shuffle(&mut rng);
        }
        batches
    }
}
