// ============================================================
// Layer 5: Structure Losses
// ============================================================
// Two families of loss:
//
//   DRMSD   compares every pairwise atom distance of the predicted
//           structure with the true one. Distances do not change
//           under rotation or translation, so no superposition is
//           needed and the loss stays differentiable.
//
//   MSE     compares predicted and true angles directly, as
//           (cos, sin) pairs so that -179 and 179 degrees are close.
//
// The combined loss puts both on a similar scale:
//   w * ln_drmsd / 0.02 + (1 - w) * mse / 0.01

use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::data::batcher::ProteinBatch;
use crate::domain::geometry::{AngleSet, NUM_BACKBONE_ATOMS, NUM_COORDS_PER_RESIDUE};
use crate::ml::structure::build_coords;

const DIST_EPS: f64 = 1e-8;
const DRMSD_EPS: f64 = 1e-10;

pub const COMBINE_WEIGHT: f64 = 0.5;
pub const LN_DRMSD_NORM: f64 = 0.02;
pub const MSE_NORM: f64 = 0.01;

/// Which loss drives the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LossKind {
    Drmsd,
    LnDrmsd,
    Mse,
    Combined,
}

impl LossKind {
    /// Whether this loss needs 3D coordinates built from the angles.
    pub fn needs_structure(self) -> bool {
        !matches!(self, LossKind::Mse)
    }
}

impl FromStr for LossKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drmsd" => Ok(LossKind::Drmsd),
            "ln-drmsd" | "lndrmsd" => Ok(LossKind::LnDrmsd),
            "mse" => Ok(LossKind::Mse),
            "combined" => Ok(LossKind::Combined),
            other => Err(format!("unknown loss '{other}' (drmsd, ln-drmsd, mse, combined)")),
        }
    }
}

impl std::fmt::Display for LossKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LossKind::Drmsd => "drmsd",
            LossKind::LnDrmsd => "ln-drmsd",
            LossKind::Mse => "mse",
            LossKind::Combined => "combined",
        };
        f.write_str(name)
    }
}

// ─── Coordinate losses ────────────────────────────────────────────────────────

/// Pairwise distances `[B, N, N]` for coordinates `[B, N, 3]`.
/// Diagonal entries are not exact zeros; callers mask them out.
pub fn pairwise_distances<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    let sq   = x.clone().powf_scalar(2.0).sum_dim(2); // [B, N, 1]
    let gram = x.clone().matmul(x.swap_dims(1, 2));   // [B, N, N]
    (sq.clone() + sq.swap_dims(1, 2) - gram.mul_scalar(2.0))
        .clamp_min(DIST_EPS)
        .sqrt()
}

/// Move each protein's masked centroid to the origin. The Gram expansion
/// loses f32 precision far from the origin.
fn center<B: Backend>(x: Tensor<B, 3>, atom_mask: Tensor<B, 2>) -> Tensor<B, 3> {
    let w        = atom_mask.unsqueeze_dim::<3>(2);              // [B, N, 1]
    let count    = w.clone().sum_dim(1).clamp_min(1.0);          // [B, 1, 1]
    let centroid = (x.clone() * w).sum_dim(1) / count;           // [B, 1, 3]
    x - centroid
}

/// Per-protein DRMSD over distinct atom pairs, with resolved atom counts.
pub struct ProteinDrmsd<B: Backend> {
    /// `[B]`
    pub drmsd: Tensor<B, 1>,
    /// `[B]`
    pub atoms: Tensor<B, 1>,
}

impl<B: Backend> ProteinDrmsd<B> {
    /// Batch-mean DRMSD.
    pub fn drmsd(&self) -> Tensor<B, 1> {
        self.drmsd.clone().mean()
    }

    /// Batch-mean of DRMSD divided by each protein's resolved atom count.
    pub fn ln_drmsd(&self) -> Tensor<B, 1> {
        (self.drmsd.clone() / self.atoms.clone().clamp_min(1.0)).mean()
    }
}

pub fn drmsd_per_protein<B: Backend>(
    pred:      Tensor<B, 3>,
    truth:     Tensor<B, 3>,
    atom_mask: Tensor<B, 2>,
) -> ProteinDrmsd<B> {
    let [b, n, _] = pred.dims();
    let device = pred.device();

    let pred  = center(pred, atom_mask.clone());
    let truth = center(truth, atom_mask.clone());

    // each unordered pair once, i < j
    let upper: Tensor<B, 3> = Tensor::<B, 2>::ones([n, n], &device).triu(1).unsqueeze();
    let pair_mask = atom_mask.clone().unsqueeze_dim::<3>(2) * atom_mask.clone().unsqueeze_dim::<3>(1) * upper;
    let diff = (pairwise_distances(pred) - pairwise_distances(truth)).powf_scalar(2.0) * pair_mask;
    let sum  = diff.sum_dim(2).sum_dim(1).reshape([b]);

    let atoms = atom_mask.sum_dim(1).reshape([b]);
    let pairs = (atoms.clone() * atoms.clone().sub_scalar(1.0)).div_scalar(2.0).clamp_min(1.0);
    let drmsd = (sum / pairs).add_scalar(DRMSD_EPS).sqrt();
    ProteinDrmsd { drmsd, atoms }
}

/// Restrict `[B, L*13, 3]` coordinates and `[B, L*13]` mask to N, CA, C.
pub fn backbone_only<B: Backend>(coords: Tensor<B, 3>, atom_mask: Tensor<B, 2>) -> (Tensor<B, 3>, Tensor<B, 2>) {
    let [b, n_atoms, _] = coords.dims();
    let l = n_atoms / NUM_COORDS_PER_RESIDUE;
    let coords = coords
        .reshape([b, l, NUM_COORDS_PER_RESIDUE, 3])
        .slice([0..b, 0..l, 0..NUM_BACKBONE_ATOMS, 0..3])
        .reshape([b, l * NUM_BACKBONE_ATOMS, 3]);
    let mask = atom_mask
        .reshape([b, l, NUM_COORDS_PER_RESIDUE])
        .slice([0..b, 0..l, 0..NUM_BACKBONE_ATOMS])
        .reshape([b, l * NUM_BACKBONE_ATOMS]);
    (coords, mask)
}

// ─── Angle loss ───────────────────────────────────────────────────────────────

/// Mean squared error over the known (cos, sin) components of `set`.
pub fn mse_over_angles<B: Backend>(
    pred:       Tensor<B, 4>,
    truth:      Tensor<B, 4>,
    angle_mask: Tensor<B, 3>,
    set:        AngleSet,
) -> Tensor<B, 1> {
    let [b, l, _, _] = pred.dims();
    let range = set.range();
    let k = range.len();

    let pred  = pred.slice([0..b, 0..l, range.clone(), 0..2]);
    let truth = truth.slice([0..b, 0..l, range.clone(), 0..2]);
    let mask  = angle_mask.slice([0..b, 0..l, range]).reshape([b, l, k, 1]);

    let sq = (pred - truth).powf_scalar(2.0) * mask.clone();
    let count = mask.sum().mul_scalar(2.0).clamp_min(1.0);
    sq.sum() / count
}

pub fn combine_drmsd_mse<B: Backend>(ln_drmsd: Tensor<B, 1>, mse: Tensor<B, 1>, w: f64) -> Tensor<B, 1> {
    ln_drmsd.mul_scalar(w / LN_DRMSD_NORM) + mse.mul_scalar((1.0 - w) / MSE_NORM)
}

// ─── Full breakdown ───────────────────────────────────────────────────────────

/// Host-side values of every loss computed for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LossBreakdown {
    pub drmsd:    Option<f64>,
    pub ln_drmsd: Option<f64>,
    pub bb_drmsd: Option<f64>,
    pub mse:      f64,
    /// MSE over phi, psi, omega and the three bond angles
    pub bb_mse:   f64,
    /// MSE over chi1..chi5
    pub sc_mse:   f64,
    pub combined: Option<f64>,
}

impl LossBreakdown {
    /// Value of the loss that drives optimization and model selection.
    pub fn value(&self, kind: LossKind) -> f64 {
        let v = match kind {
            LossKind::Drmsd => self.drmsd,
            LossKind::LnDrmsd => self.ln_drmsd,
            LossKind::Mse => Some(self.mse),
            LossKind::Combined => self.combined,
        };
        v.unwrap_or(f64::NAN)
    }
}

/// Running mean of breakdowns, weighted by batch size.
#[derive(Debug, Default, Clone)]
pub struct BreakdownMean {
    sums:     [f64; 7],
    counts:   [f64; 7],
}

impl BreakdownMean {
    pub fn add(&mut self, b: &LossBreakdown, weight: usize) {
        let w = weight as f64;
        let values = [b.drmsd, b.ln_drmsd, b.bb_drmsd, Some(b.mse), Some(b.bb_mse), Some(b.sc_mse), b.combined];
        for (i, v) in values.iter().enumerate() {
            if let Some(v) = v {
                self.sums[i]   += v * w;
                self.counts[i] += w;
            }
        }
    }

    pub fn mean(&self) -> LossBreakdown {
        let at = |i: usize| (self.counts[i] > 0.0).then(|| self.sums[i] / self.counts[i]);
        LossBreakdown {
            drmsd:    at(0),
            ln_drmsd: at(1),
            bb_drmsd: at(2),
            mse:      at(3).unwrap_or(f64::NAN),
            bb_mse:   at(4).unwrap_or(f64::NAN),
            sc_mse:   at(5).unwrap_or(f64::NAN),
            combined: at(6),
        }
    }
}

pub struct StructureLoss<B: Backend> {
    /// Scalar `[1]` tensor to backpropagate.
    pub objective: Tensor<B, 1>,
    pub breakdown: LossBreakdown,
    /// Predicted coordinates when a structure was built.
    pub coords:    Option<Tensor<B, 3>>,
}

fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f64 {
    t.clone().into_scalar().elem::<f64>()
}

/// Compute `kind` for predicted angle pairs against a batch.
/// With `with_structure` the coordinate losses are reported even
/// when `kind` does not need them.
pub fn structure_loss<B: Backend>(
    kind:           LossKind,
    pred_trig:      Tensor<B, 4>,
    batch:          &ProteinBatch<B>,
    with_structure: bool,
) -> StructureLoss<B> {
    let angle_mse = |set| {
        mse_over_angles(pred_trig.clone(), batch.angle_trig.clone(), batch.angle_mask.clone(), set)
    };
    let mse = angle_mse(AngleSet::All);
    let mut breakdown = LossBreakdown {
        mse:    scalar(&mse),
        bb_mse: scalar(&angle_mse(AngleSet::Backbone)),
        sc_mse: scalar(&angle_mse(AngleSet::Sidechain)),
        ..Default::default()
    };

    if !(with_structure || kind.needs_structure()) {
        return StructureLoss { objective: mse, breakdown, coords: None };
    }

    let coords = build_coords(pred_trig, &batch.residue_rows());
    let full   = drmsd_per_protein(coords.clone(), batch.coords.clone(), batch.atom_mask.clone());
    let drmsd  = full.drmsd();
    let ln     = full.ln_drmsd();

    let (bb_pred, bb_mask) = backbone_only(coords.clone(), batch.atom_mask.clone());
    let (bb_true, _)       = backbone_only(batch.coords.clone(), batch.atom_mask.clone());
    let bb = drmsd_per_protein(bb_pred, bb_true, bb_mask).drmsd();

    let combined = combine_drmsd_mse(ln.clone(), mse.clone(), COMBINE_WEIGHT);

    breakdown.drmsd    = Some(scalar(&drmsd));
    breakdown.ln_drmsd = Some(scalar(&ln));
    breakdown.bb_drmsd = Some(scalar(&bb));
    breakdown.combined = Some(scalar(&combined));

    let objective = match kind {
        LossKind::Drmsd => drmsd,
        LossKind::LnDrmsd => ln,
        LossKind::Mse => mse,
        LossKind::Combined => combined,
    };
    StructureLoss { objective, breakdown, coords: Some(coords) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn coords(points: &[[f32; 3]]) -> Tensor<TestBackend, 3> {
        let flat: Vec<f32> = points.iter().flatten().copied().collect();
        Tensor::<TestBackend, 1>::from_floats(flat.as_slice(), &Default::default())
            .reshape([1, points.len(), 3])
    }

    fn mask(values: &[f32]) -> Tensor<TestBackend, 2> {
        Tensor::<TestBackend, 1>::from_floats(values, &Default::default()).reshape([1, values.len()])
    }

    fn value(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [0.0, 4.0, 0.0]];

    fn drmsd(pred: Tensor<TestBackend, 3>, truth: Tensor<TestBackend, 3>, m: Tensor<TestBackend, 2>) -> f64 {
        value(drmsd_per_protein(pred, truth, m).drmsd())
    }

    #[test]
    fn test_drmsd_is_rigid_motion_invariant() {
        // rotate 90 degrees about z and translate
        let moved: Vec<[f32; 3]> = TRIANGLE.iter().map(|p| [-p[1] + 5.0, p[0] - 2.0, p[2] + 1.0]).collect();
        let d = drmsd(coords(&TRIANGLE), coords(&moved), mask(&[1.0, 1.0, 1.0]));
        assert!(d < 1e-3, "drmsd = {d}");
    }

    #[test]
    fn test_drmsd_ignores_large_translations() {
        // 40-atom helix, 1.5 A rise and 100 degrees per atom
        let helix: Vec<[f32; 3]> = (0..40)
            .map(|i| {
                let t = (i as f32) * 100f32.to_radians();
                [2.3 * t.cos(), 2.3 * t.sin(), 1.5 * i as f32]
            })
            .collect();
        let m = mask(&[1.0; 40]);
        for offset in [30.0f32, 100.0, 1000.0] {
            let shifted: Vec<[f32; 3]> = helix.iter().map(|p| [p[0] + offset, p[1] - offset, p[2] + offset]).collect();
            let d = drmsd(coords(&helix), coords(&shifted), m.clone());
            assert!(d < 1e-3, "offset {offset}: drmsd = {d}");
        }
    }

    #[test]
    fn test_drmsd_known_value() {
        // stretch the 3-4-5 triangle to 6-8-10: every distance doubles
        let scaled: Vec<[f32; 3]> = TRIANGLE.iter().map(|p| [p[0] * 2.0, p[1] * 2.0, p[2]]).collect();
        let d = drmsd(coords(&scaled), coords(&TRIANGLE), mask(&[1.0, 1.0, 1.0]));
        // squared differences 9, 16, 25 over 3 distinct pairs
        let expected = ((9.0 + 16.0 + 25.0) / 3.0f64).sqrt();
        assert!((d - expected).abs() < 1e-3, "{d} vs {expected}");
    }

    #[test]
    fn test_masked_atoms_are_ignored() {
        let mut moved = TRIANGLE;
        moved[2] = [100.0, 100.0, 100.0];
        let d = drmsd(coords(&moved), coords(&TRIANGLE), mask(&[1.0, 1.0, 0.0]));
        assert!(d < 1e-3, "drmsd = {d}");
    }

    #[test]
    fn test_ln_drmsd_divides_by_atom_count() {
        let scaled: Vec<[f32; 3]> = TRIANGLE.iter().map(|p| [p[0] * 2.0, p[1] * 2.0, p[2]]).collect();
        let per = drmsd_per_protein(coords(&scaled), coords(&TRIANGLE), mask(&[1.0, 1.0, 1.0]));
        let d  = value(per.drmsd());
        let ln = value(per.ln_drmsd());
        assert!((ln - d / 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_breakdown_splits_backbone_and_sidechain_mse() {
        use crate::data::batcher::ProteinBatcher;
        use crate::domain::amino_acid::AminoAcid;
        use crate::domain::geometry::{NUM_ANGLES, SC_ANGLES_START};
        use crate::domain::protein::ProteinRecord;
        use burn::data::dataloader::batcher::Batcher;

        let device = Default::default();
        // backbone angles known and zero, chi angles missing
        let mut row = [f32::NAN; NUM_ANGLES];
        row[..SC_ANGLES_START].fill(0.0);
        let coords = vec![[1.0f32, 2.0, 3.0]; 2 * NUM_COORDS_PER_RESIDUE];
        let record = ProteinRecord::new("p", vec![AminoAcid::Gly, AminoAcid::Ala], vec![row; 2], coords);
        let batch = ProteinBatcher::<TestBackend>::new(device).batch(vec![record]);

        // (1, 1) against (cos 0, sin 0) = (1, 0): only the sin term differs
        let pred = Tensor::<TestBackend, 4>::ones([1, 2, NUM_ANGLES, 2], &device);
        let loss = structure_loss(LossKind::Mse, pred, &batch, false);
        assert!((loss.breakdown.bb_mse - 0.5).abs() < 1e-6);
        assert_eq!(loss.breakdown.sc_mse, 0.0);
        assert!((loss.breakdown.mse - 0.5).abs() < 1e-6);
        assert!(loss.coords.is_none());
    }

    #[test]
    fn test_mse_respects_mask_and_set() {
        let device = Default::default();
        let pred  = Tensor::<TestBackend, 4>::ones([1, 1, 11, 2], &device);
        let truth = Tensor::<TestBackend, 4>::zeros([1, 1, 11, 2], &device);
        let mut m = vec![1.0f32; 11];
        m[0] = 0.0;
        let m = Tensor::<TestBackend, 1>::from_floats(m.as_slice(), &device).reshape([1, 1, 11]);

        let all = value(mse_over_angles(pred.clone(), truth.clone(), m.clone(), AngleSet::All));
        assert!((all - 1.0).abs() < 1e-6);

        let zero_mask = Tensor::<TestBackend, 3>::zeros([1, 1, 11], &device);
        let none = value(mse_over_angles(pred, truth, zero_mask, AngleSet::Sidechain));
        assert_eq!(none, 0.0);
    }

    #[test]
    fn test_combine_weights() {
        let device = Default::default();
        let ln  = Tensor::<TestBackend, 1>::from_floats([0.02], &device);
        let mse = Tensor::<TestBackend, 1>::from_floats([0.01], &device);
        let c = value(combine_drmsd_mse(ln, mse, 0.5));
        assert!((c - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_breakdown_mean_skips_missing_values() {
        let mut acc = BreakdownMean::default();
        acc.add(&LossBreakdown { mse: 1.0, drmsd: Some(4.0), ..Default::default() }, 1);
        acc.add(&LossBreakdown { mse: 3.0, ..Default::default() }, 1);
        let m = acc.mean();
        assert_eq!(m.mse, 2.0);
        assert_eq!(m.drmsd, Some(4.0));
        assert_eq!(m.combined, None);
        assert!(m.value(LossKind::Combined).is_nan());
    }

    #[test]
    fn test_loss_kind_round_trip() {
        for kind in [LossKind::Drmsd, LossKind::LnDrmsd, LossKind::Mse, LossKind::Combined] {
            assert_eq!(kind.to_string().parse::<LossKind>(), Ok(kind));
        }
    }
}
