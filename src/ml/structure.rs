// ============================================================
// Layer 5: Differentiable Structure Builder
// ============================================================
// Turns predicted (cos, sin) angle pairs into all-atom Cartesian
// coordinates with NeRF (natural extension reference frame).
//
// Everything stays on Burn tensors so the coordinate losses can
// backpropagate into the angle predictions. Angles are never
// converted back to radians here: every rotation is written in
// terms of its (cos, sin) pair.
//
// Backbone is built residue by residue (each residue depends on
// the previous one). Sidechains only depend on their own
// backbone, so they are built for every residue of every protein
// at once, one build level at a time.
//
// Shapes:
//   input   trig   [B, L, 11, 2]
//   output  coords [B, L*13, 3]

use burn::prelude::*;

use crate::domain::amino_acid::AminoAcid;
use crate::domain::geometry::{
    BOND_CA_C, BOND_C_N, BOND_N_CA, MAX_SIDECHAIN_ATOMS, NUM_ANGLES, NUM_BACKBONE_ATOMS,
    NUM_CHI, NUM_COORDS_PER_RESIDUE, OMEGA, PHI, PSI, SC_ANGLES_START, THETA_CA_C_N,
    THETA_C_N_CA, THETA_N_CA_C,
};
use crate::domain::sidechain::{sidechain_atoms, SidechainAtom, Torsion};

const NORM_EPS: f64 = 1e-8;

// Rows without an atom at a build level still go through NeRF.
// Their output is never read, it only has to stay finite.
const PLACEHOLDER_REFS: [usize; 3] = [2, 0, 1];
const PLACEHOLDER_BOND: f64 = 1.5;
const PLACEHOLDER_ANGLE_DEG: f64 = 110.0;
const PLACEHOLDER_TORSION_DEG: f64 = 180.0;

/// A batch of angles as (cos, sin), each `[N, 1]`.
#[derive(Debug, Clone)]
pub struct Trig<B: Backend> {
    pub cos: Tensor<B, 2>,
    pub sin: Tensor<B, 2>,
}

impl<B: Backend> Trig<B> {
    /// Split a `[N, 2]` (cos, sin) tensor.
    pub fn from_pairs(pairs: Tensor<B, 2>) -> Self {
        let n = pairs.dims()[0];
        Self {
            cos: pairs.clone().slice([0..n, 0..1]),
            sin: pairs.slice([0..n, 1..2]),
        }
    }

    fn from_host(degrees: &[f64], device: &B::Device) -> Self {
        let n   = degrees.len();
        let cos: Vec<f32> = degrees.iter().map(|d| d.to_radians().cos() as f32).collect();
        let sin: Vec<f32> = degrees.iter().map(|d| d.to_radians().sin() as f32).collect();
        Self {
            cos: Tensor::<B, 1>::from_floats(cos.as_slice(), device).reshape([n, 1]),
            sin: Tensor::<B, 1>::from_floats(sin.as_slice(), device).reshape([n, 1]),
        }
    }

    /// Angle addition: (self + other).
    fn rotate(self, other: Trig<B>) -> Self {
        Self {
            cos: self.cos.clone() * other.cos.clone() - self.sin.clone() * other.sin.clone(),
            sin: self.sin * other.cos + self.cos * other.sin,
        }
    }
}

fn component<B: Backend>(v: &Tensor<B, 2>, k: usize) -> Tensor<B, 2> {
    let n = v.dims()[0];
    v.clone().slice([0..n, k..k + 1])
}

/// Row-wise cross product of two `[N, 3]` tensors.
pub fn cross<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Tensor<B, 2> {
    let (a0, a1, a2) = (component(&a, 0), component(&a, 1), component(&a, 2));
    let (b0, b1, b2) = (component(&b, 0), component(&b, 1), component(&b, 2));
    Tensor::cat(
        vec![
            a1.clone() * b2.clone() - a2.clone() * b1.clone(),
            a2 * b0.clone() - a0.clone() * b2,
            a0 * b1 - a1 * b0,
        ],
        1,
    )
}

/// Row-wise unit vectors. Zero rows stay (close to) zero.
pub fn normalize<B: Backend>(v: Tensor<B, 2>) -> Tensor<B, 2> {
    let norm = v.clone().powf_scalar(2.0).sum_dim(1).add_scalar(NORM_EPS).sqrt();
    v / norm
}

/// Place atom d from a, b, c so that |cd| = bond, angle(b, c, d) = theta
/// and dihedral(a, b, c, d) = tau. All inputs are `[N, 3]` or `[N, 1]`.
pub fn nerf<B: Backend>(
    a:     Tensor<B, 2>,
    b:     Tensor<B, 2>,
    c:     Tensor<B, 2>,
    bond:  Tensor<B, 2>,
    theta: Trig<B>,
    tau:   Trig<B>,
) -> Tensor<B, 2> {
    let bc = normalize(c.clone() - b.clone());
    let n  = normalize(cross(b - a, bc.clone()));
    let m  = cross(n.clone(), bc.clone());

    let along  = bond.clone() * theta.cos.neg();
    let radial = bond * theta.sin;
    let d_m    = radial.clone() * tau.cos;
    let d_n    = radial * tau.sin;

    c + bc * along + m * d_m + n * d_n
}

/// Angle `k` of residue `i` for every protein, as `[B, 1]` pairs.
fn angle_at<B: Backend>(trig: &Tensor<B, 4>, i: usize, k: usize) -> Trig<B> {
    let b = trig.dims()[0];
    Trig::from_pairs(
        trig.clone()
            .slice([0..b, i..i + 1, k..k + 1, 0..2])
            .reshape([b, 2]),
    )
}

/// Build all-atom coordinates `[B, L*13, 3]` from angle pairs `[B, L, 11, 2]`.
///
/// `rows` holds the residue type for each (protein, position) in
/// row-major order; `None` marks padding.
pub fn build_coords<B: Backend>(trig: Tensor<B, 4>, rows: &[Option<AminoAcid>]) -> Tensor<B, 3> {
    let [b, l, _, _] = trig.dims();
    let device = trig.device();
    debug_assert_eq!(rows.len(), b * l);

    let (n, ca, c) = build_backbone(&trig, &device);
    let r = b * l;
    let chi = trig
        .slice([0..b, 0..l, SC_ANGLES_START..NUM_ANGLES, 0..2])
        .reshape([r, NUM_CHI, 2]);

    let atoms = build_sidechains(
        n.reshape([r, 3]),
        ca.reshape([r, 3]),
        c.reshape([r, 3]),
        chi,
        rows,
        &device,
    );

    Tensor::stack::<3>(atoms, 1).reshape([b, l * NUM_COORDS_PER_RESIDUE, 3])
}

/// Backbone atoms N, CA, C, each `[B, L, 3]`.
fn build_backbone<B: Backend>(
    trig:   &Tensor<B, 4>,
    device: &B::Device,
) -> (Tensor<B, 3>, Tensor<B, 3>, Tensor<B, 3>) {
    let [b, l, _, _] = trig.dims();
    let bond = |len: f64| Tensor::<B, 2>::full([b, 1], len, device);

    // ── First residue: N at origin, CA on x, C in the xy-plane ──────────────
    let theta = angle_at(trig, 0, THETA_N_CA_C);
    let n0  = Tensor::<B, 2>::zeros([b, 3], device);
    let ca0 = Tensor::cat(
        vec![bond(BOND_N_CA), Tensor::zeros([b, 2], device)],
        1,
    );
    let c0 = Tensor::cat(
        vec![
            theta.cos.neg().mul_scalar(BOND_CA_C).add_scalar(BOND_N_CA),
            theta.sin.mul_scalar(BOND_CA_C),
            Tensor::zeros([b, 1], device),
        ],
        1,
    );

    let mut ns  = vec![n0];
    let mut cas = vec![ca0];
    let mut cs  = vec![c0];

    // ── Remaining residues ──────────────────────────────────────────────────
    for i in 1..l {
        let (n_prev, ca_prev, c_prev) = (ns[i - 1].clone(), cas[i - 1].clone(), cs[i - 1].clone());

        let n_i = nerf(
            n_prev,
            ca_prev.clone(),
            c_prev.clone(),
            bond(BOND_C_N),
            angle_at(trig, i - 1, THETA_CA_C_N),
            angle_at(trig, i - 1, PSI),
        );
        let ca_i = nerf(
            ca_prev,
            c_prev.clone(),
            n_i.clone(),
            bond(BOND_N_CA),
            angle_at(trig, i - 1, THETA_C_N_CA),
            angle_at(trig, i - 1, OMEGA),
        );
        let c_i = nerf(
            c_prev,
            n_i.clone(),
            ca_i.clone(),
            bond(BOND_CA_C),
            angle_at(trig, i, THETA_N_CA_C),
            angle_at(trig, i, PHI),
        );

        ns.push(n_i);
        cas.push(ca_i);
        cs.push(c_i);
    }

    (
        Tensor::stack(ns, 1),
        Tensor::stack(cas, 1),
        Tensor::stack(cs, 1),
    )
}

/// Per-row build instructions for one sidechain level.
struct LevelPlan {
    refs:        [Vec<f32>; 3],
    bonds:       Vec<f32>,
    angles_deg:  Vec<f64>,
    chi_slot:    Vec<f32>,
    offsets_deg: Vec<f64>,
    any_real:    bool,
}

impl LevelPlan {
    fn new(level: usize, rows: &[Option<AminoAcid>]) -> Self {
        let known = NUM_BACKBONE_ATOMS + level;
        // chi table has NUM_CHI predicted slots plus one constant (1, 0)
        let slots = NUM_CHI + 1;
        let mut plan = Self {
            refs:        std::array::from_fn(|_| vec![0.0; rows.len() * known]),
            bonds:       Vec::with_capacity(rows.len()),
            angles_deg:  Vec::with_capacity(rows.len()),
            chi_slot:    vec![0.0; rows.len() * slots],
            offsets_deg: Vec::with_capacity(rows.len()),
            any_real:    false,
        };

        for (r, aa) in rows.iter().enumerate() {
            let recipe: Option<&SidechainAtom> =
                aa.and_then(|aa| sidechain_atoms(aa).get(level));

            let (refs, bond, angle, slot, offset) = match recipe {
                Some(atom) => {
                    plan.any_real = true;
                    let (slot, offset) = match atom.torsion {
                        Torsion::Chi(k) => (k, 0.0),
                        Torsion::ChiOffset(k, off) => (k, off),
                        Torsion::Fixed(deg) => (NUM_CHI, deg),
                    };
                    (atom.refs, atom.bond, atom.angle_deg, slot, offset)
                }
                None => (
                    PLACEHOLDER_REFS,
                    PLACEHOLDER_BOND,
                    PLACEHOLDER_ANGLE_DEG,
                    NUM_CHI,
                    PLACEHOLDER_TORSION_DEG,
                ),
            };

            for (q, &atom_ref) in refs.iter().enumerate() {
                plan.refs[q][r * known + atom_ref] = 1.0;
            }
            plan.bonds.push(bond as f32);
            plan.angles_deg.push(angle);
            plan.chi_slot[r * slots + slot] = 1.0;
            plan.offsets_deg.push(offset);
        }
        plan
    }
}

/// Select one atom per row: onehot `[R, K]` against atoms `[R, K, 3]`.
fn gather_atom<B: Backend>(stacked: &Tensor<B, 3>, onehot: &[f32], device: &B::Device) -> Tensor<B, 2> {
    let [r, k, _] = stacked.dims();
    let onehot = Tensor::<B, 1>::from_floats(onehot, device).reshape([r, k, 1]);
    (stacked.clone() * onehot).sum_dim(1).reshape([r, 3])
}

/// Sidechain atoms for all `R` rows. Returns the 13 atom slots, each `[R, 3]`.
fn build_sidechains<B: Backend>(
    n:      Tensor<B, 2>,
    ca:     Tensor<B, 2>,
    c:      Tensor<B, 2>,
    chi:    Tensor<B, 3>,
    rows:   &[Option<AminoAcid>],
    device: &B::Device,
) -> Vec<Tensor<B, 2>> {
    let r = rows.len();

    // Constant slot for torsions that do not come from a chi angle
    let fixed = Tensor::cat(
        vec![Tensor::<B, 3>::ones([r, 1, 1], device), Tensor::zeros([r, 1, 1], device)],
        2,
    );
    let chi_table = Tensor::cat(vec![chi, fixed], 1);

    let mut atoms = vec![n, ca, c];
    for level in 0..MAX_SIDECHAIN_ATOMS {
        let plan = LevelPlan::new(level, rows);
        if !plan.any_real {
            atoms.push(Tensor::zeros([r, 3], device));
            continue;
        }

        let stacked = Tensor::stack::<3>(atoms.clone(), 1);
        let a = gather_atom(&stacked, &plan.refs[0], device);
        let b = gather_atom(&stacked, &plan.refs[1], device);
        let c = gather_atom(&stacked, &plan.refs[2], device);

        let slot = Tensor::<B, 1>::from_floats(plan.chi_slot.as_slice(), device)
            .reshape([r, NUM_CHI + 1, 1]);
        let torsion = Trig::from_pairs((chi_table.clone() * slot).sum_dim(1).reshape([r, 2]))
            .rotate(Trig::from_host(&plan.offsets_deg, device));

        let bond = Tensor::<B, 1>::from_floats(plan.bonds.as_slice(), device).reshape([r, 1]);
        let theta = Trig::from_host(&plan.angles_deg, device);

        atoms.push(nerf(a, b, c, bond, theta, torsion));
    }
    atoms
}
