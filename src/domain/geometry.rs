// ============================================================
// Layer 3: Angle and Coordinate Layout
// ============================================================
// Every residue is described by NUM_ANGLES internal angles and
// owns NUM_COORDS_PER_RESIDUE coordinate slots.
//
// Angle order:
//   0 phi   1 psi   2 omega
//   3 theta N-CA-C   4 theta CA-C-N   5 theta C-N-CA
//   6..11 chi1..chi5
//
// Coordinate slots:
//   0 N   1 CA   2 C   3..13 sidechain atoms in build order

pub const NUM_ANGLES: usize = 11;

/// First sidechain (chi) angle position.
pub const SC_ANGLES_START: usize = 6;

pub const NUM_CHI: usize = NUM_ANGLES - SC_ANGLES_START;

pub const NUM_BACKBONE_ATOMS: usize = 3;

/// Tryptophan has the longest sidechain.
pub const MAX_SIDECHAIN_ATOMS: usize = 10;

pub const NUM_COORDS_PER_RESIDUE: usize = NUM_BACKBONE_ATOMS + MAX_SIDECHAIN_ATOMS;

pub const PHI: usize = 0;
pub const PSI: usize = 1;
pub const OMEGA: usize = 2;
pub const THETA_N_CA_C: usize = 3;
pub const THETA_CA_C_N: usize = 4;
pub const THETA_C_N_CA: usize = 5;

// Backbone bond lengths in angstrom (Engh & Huber).
pub const BOND_N_CA: f64 = 1.458;
pub const BOND_CA_C: f64 = 1.525;
pub const BOND_C_N: f64 = 1.329;

pub const BACKBONE_ATOM_NAMES: [&str; NUM_BACKBONE_ATOMS] = ["N", "CA", "C"];

/// Which subset of angles a comparison looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleSet {
    All,
    Backbone,
    Sidechain,
}

impl AngleSet {
    pub fn range(self) -> std::ops::Range<usize> {
        match self {
            AngleSet::All => 0..NUM_ANGLES,
            AngleSet::Backbone => 0..SC_ANGLES_START,
            AngleSet::Sidechain => SC_ANGLES_START..NUM_ANGLES,
        }
    }
}
