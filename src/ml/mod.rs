// ============================================================
// Layer 5: ML / Model Layer (Burn)
// ============================================================
// Everything that touches Burn tensors lives here (the batcher in
// Layer 4 only builds input tensors).
//
//   model.rs          residue + position embeddings, optional
//                     convolution block, post-norm encoder stack,
//                     optional autoregressive structure decoder,
//                     angle head producing unit (cos, sin) pairs
//
//   structure.rs      differentiable NeRF: angles → all-atom coords
//
//   losses.rs         DRMSD, length-normalised DRMSD, angle MSE,
//                     combined loss and the per-batch breakdown
//
//   schedule.rs       constant / noam / plateau learning rates
//
//   early_stopping.rs patience on the validation loss
//
//   trainer.rs        the training loop
//
//   evaluator.rs      dataset evaluation and single-sequence prediction
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need
//            AlQuraishi (2019) End-to-end differentiable learning of protein structure

use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub mod early_stopping;
pub mod evaluator;
pub mod losses;
pub mod model;
pub mod schedule;
pub mod structure;
pub mod trainer;

pub type WgpuBackend = burn::backend::Wgpu;
pub type NdArrayBackend = burn::backend::NdArray;

/// Which Burn backend to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPU through wgpu
    Wgpu,
    /// CPU
    NdArray,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wgpu" | "gpu" => Ok(BackendKind::Wgpu),
            "ndarray" | "cpu" => Ok(BackendKind::NdArray),
            other => Err(format!("unknown backend '{other}' (wgpu, ndarray)")),
        }
    }
}
