// ============================================================
// Layer 3: Sidechain Build Table
// ============================================================
// How each residue's sidechain is grown from its backbone.
//
// Every atom is placed by NeRF from three reference atoms
// (a, b, c) already built for the same residue:
//   |c - d|         = bond length
//   angle(b, c, d)  = bond angle
//   dihedral(a,b,c,d) = torsion
//
// Reference atoms are indices into the residue's local atom list:
//   0 N   1 CA   2 C   3 CB   4.. further sidechain atoms
//
// Geometry values are ideal bond lengths/angles (angstrom/degrees).

use crate::domain::amino_acid::AminoAcid;
use crate::domain::geometry::NUM_BACKBONE_ATOMS;

/// Where an atom's torsion comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Torsion {
    /// Predicted chi angle (0-based: 0 = chi1).
    Chi(usize),
    /// Predicted chi angle plus a fixed offset in degrees.
    /// Used for branch atoms that share a torsion axis (CG2, OD2, ...).
    ChiOffset(usize, f64),
    /// Fixed torsion in degrees (planar ring atoms, CB).
    Fixed(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SidechainAtom {
    pub name:      &'static str,
    pub refs:      [usize; 3],
    pub bond:      f64,
    pub angle_deg: f64,
    pub torsion:   Torsion,
}

const fn atom(
    name: &'static str,
    refs: [usize; 3],
    bond: f64,
    angle_deg: f64,
    torsion: Torsion,
) -> SidechainAtom {
    SidechainAtom { name, refs, bond, angle_deg, torsion }
}

use Torsion::{Chi, ChiOffset, Fixed};

// Local indices
const N: usize = 0;
const CA: usize = 1;
const C: usize = 2;
const CB: usize = 3;

const CB_ATOM: SidechainAtom = atom("CB", [C, N, CA], 1.530, 110.5, Fixed(122.6));

const ALA: [SidechainAtom; 1] = [CB_ATOM];

const ARG: [SidechainAtom; 7] = [
    CB_ATOM,
    atom("CG", [N, CA, CB], 1.520, 114.1, Chi(0)),
    atom("CD", [CA, CB, 4], 1.520, 111.3, Chi(1)),
    atom("NE", [CB, 4, 5], 1.460, 112.0, Chi(2)),
    atom("CZ", [4, 5, 6], 1.330, 124.2, Chi(3)),
    atom("NH1", [5, 6, 7], 1.326, 120.0, Chi(4)),
    atom("NH2", [5, 6, 7], 1.326, 120.0, ChiOffset(4, 180.0)),
];

const ASN: [SidechainAtom; 4] = [
    CB_ATOM,
    atom("CG", [N, CA, CB], 1.516, 112.6, Chi(0)),
    atom("OD1", [CA, CB, 4], 1.231, 120.8, Chi(1)),
    atom("ND2", [CA, CB, 4], 1.328, 116.4, ChiOffset(1, 180.0)),
];

const ASP: [SidechainAtom; 4] = [
    CB_ATOM,
    atom("CG", [N, CA, CB], 1.516, 112.6, Chi(0)),
    atom("OD1", [CA, CB, 4], 1.249, 118.4, Chi(1)),
    atom("OD2", [CA, CB, 4], 1.249, 118.4, ChiOffset(1, 180.0)),
];

const CYS: [SidechainAtom; 2] = [
    CB_ATOM,
    atom("SG", [N, CA, CB], 1.808, 114.0, Chi(0)),
];

const GLN: [SidechainAtom; 5] = [
    CB_ATOM,
    atom("CG", [N, CA, CB], 1.520, 114.1, Chi(0)),
    atom("CD", [CA, CB, 4], 1.516, 112.6, Chi(1)),
    atom("OE1", [CB, 4, 5], 1.231, 120.8, Chi(2)),
    atom("NE2", [CB, 4, 5], 1.328, 116.4, ChiOffset(2, 180.0)),
];

const GLU: [SidechainAtom; 5] = [
    CB_ATOM,
    atom("CG", [N, CA, CB], 1.520, 114.1, Chi(0)),
    atom("CD", [CA, CB, 4], 1.516, 112.6, Chi(1)),
    atom("OE1", [CB, 4, 5], 1.249, 118.4, Chi(2)),
    atom("OE2", [CB, 4, 5], 1.249, 118.4, ChiOffset(2, 180.0)),
];

const HIS: [SidechainAtom; 6] = [
    CB_ATOM,
    atom("CG", [N, CA, CB], 1.497, 113.7, Chi(0)),
    atom("ND1", [CA, CB, 4], 1.378, 122.7, Chi(1)),
    atom("CD2", [CA, CB, 4], 1.356, 131.0, ChiOffset(1, 180.0)),
    atom("CE1", [CB, 4, 5], 1.321, 109.0, Fixed(180.0)),
    atom("NE2", [CB, 4, 6], 1.374, 107.0, Fixed(180.0)),
];

const ILE: [SidechainAtom; 4] = [
    CB_ATOM,
    atom("CG1", [N, CA, CB], 1.530, 110.4, Chi(0)),
    atom("CG2", [N, CA, CB], 1.521, 110.5, ChiOffset(0, -122.4)),
    atom("CD1", [CA, CB, 4], 1.513, 113.8, Chi(1)),
];

const LEU: [SidechainAtom; 4] = [
    CB_ATOM,
    atom("CG", [N, CA, CB], 1.530, 116.3, Chi(0)),
    atom("CD1", [CA, CB, 4], 1.521, 110.7, Chi(1)),
    atom("CD2", [CA, CB, 4], 1.521, 110.7, ChiOffset(1, 122.9)),
];

const LYS: [SidechainAtom; 5] = [
    CB_ATOM,
    atom("CG", [N, CA, CB], 1.520, 114.1, Chi(0)),
    atom("CD", [CA, CB, 4], 1.520, 111.3, Chi(1)),
    atom("CE", [CB, 4, 5], 1.520, 111.3, Chi(2)),
    atom("NZ", [4, 5, 6], 1.489, 111.9, Chi(3)),
];

const MET: [SidechainAtom; 4] = [
    CB_ATOM,
    atom("CG", [N, CA, CB], 1.520, 114.1, Chi(0)),
    atom("SD", [CA, CB, 4], 1.803, 112.7, Chi(1)),
    atom("CE", [CB, 4, 5], 1.791, 100.9, Chi(2)),
];

const PHE: [SidechainAtom; 7] = [
    CB_ATOM,
    atom("CG", [N, CA, CB], 1.502, 113.8, Chi(0)),
    atom("CD1", [CA, CB, 4], 1.389, 120.7, Chi(1)),
    atom("CD2", [CA, CB, 4], 1.389, 120.7, ChiOffset(1, 180.0)),
    atom("CE1", [CB, 4, 5], 1.389, 120.7, Fixed(180.0)),
    atom("CE2", [CB, 4, 6], 1.389, 120.7, Fixed(180.0)),
    atom("CZ", [4, 5, 7], 1.389, 120.0, Fixed(0.0)),
];

const PRO: [SidechainAtom; 3] = [
    CB_ATOM,
    atom("CG", [N, CA, CB], 1.495, 104.5, Chi(0)),
    atom("CD", [CA, CB, 4], 1.507, 105.5, Chi(1)),
];

const SER: [SidechainAtom; 2] = [
    CB_ATOM,
    atom("OG", [N, CA, CB], 1.417, 111.1, Chi(0)),
];

const THR: [SidechainAtom; 3] = [
    CB_ATOM,
    atom("OG1", [N, CA, CB], 1.433, 109.2, Chi(0)),
    atom("CG2", [N, CA, CB], 1.521, 111.1, ChiOffset(0, -120.0)),
];

const TRP: [SidechainAtom; 10] = [
    CB_ATOM,
    atom("CG", [N, CA, CB], 1.498, 114.1, Chi(0)),
    atom("CD1", [CA, CB, 4], 1.365, 127.1, Chi(1)),
    atom("CD2", [CA, CB, 4], 1.433, 126.6, ChiOffset(1, 180.0)),
    atom("NE1", [CB, 4, 5], 1.374, 110.2, Fixed(180.0)),
    atom("CE2", [CB, 4, 6], 1.409, 107.2, Fixed(180.0)),
    atom("CE3", [CB, 4, 6], 1.398, 133.9, Fixed(0.0)),
    atom("CZ2", [4, 6, 8], 1.394, 122.4, Fixed(180.0)),
    atom("CZ3", [4, 6, 9], 1.382, 118.7, Fixed(180.0)),
    atom("CH2", [6, 8, 10], 1.368, 117.5, Fixed(0.0)),
];

const TYR: [SidechainAtom; 8] = [
    CB_ATOM,
    atom("CG", [N, CA, CB], 1.512, 113.8, Chi(0)),
    atom("CD1", [CA, CB, 4], 1.389, 120.8, Chi(1)),
    atom("CD2", [CA, CB, 4], 1.389, 120.8, ChiOffset(1, 180.0)),
    atom("CE1", [CB, 4, 5], 1.389, 121.2, Fixed(180.0)),
    atom("CE2", [CB, 4, 6], 1.389, 121.2, Fixed(180.0)),
    atom("CZ", [4, 5, 7], 1.378, 119.6, Fixed(0.0)),
    atom("OH", [5, 7, 9], 1.376, 119.9, Fixed(180.0)),
];

const VAL: [SidechainAtom; 3] = [
    CB_ATOM,
    atom("CG1", [N, CA, CB], 1.521, 110.7, Chi(0)),
    atom("CG2", [N, CA, CB], 1.521, 110.4, ChiOffset(0, 122.9)),
];

/// Sidechain atoms of `aa` in build order. Empty for glycine.
pub fn sidechain_atoms(aa: AminoAcid) -> &'static [SidechainAtom] {
    match aa {
        AminoAcid::Ala => &ALA,
        AminoAcid::Arg => &ARG,
        AminoAcid::Asn => &ASN,
        AminoAcid::Asp => &ASP,
        AminoAcid::Cys => &CYS,
        AminoAcid::Gln => &GLN,
        AminoAcid::Glu => &GLU,
        AminoAcid::Gly => &[],
        AminoAcid::His => &HIS,
        AminoAcid::Ile => &ILE,
        AminoAcid::Leu => &LEU,
        AminoAcid::Lys => &LYS,
        AminoAcid::Met => &MET,
        AminoAcid::Phe => &PHE,
        AminoAcid::Pro => &PRO,
        AminoAcid::Ser => &SER,
        AminoAcid::Thr => &THR,
        AminoAcid::Trp => &TRP,
        AminoAcid::Tyr => &TYR,
        AminoAcid::Val => &VAL,
    }
}

/// Number of real atoms (backbone + sidechain) for a residue.
pub fn atom_count(aa: AminoAcid) -> usize {
    NUM_BACKBONE_ATOMS + sidechain_atoms(aa).len()
}

/// Atom name for coordinate slot `slot` of residue `aa`,
/// or None if the residue has no atom there.
pub fn atom_name(aa: AminoAcid, slot: usize) -> Option<&'static str> {
    if slot < NUM_BACKBONE_ATOMS {
        return Some(crate::domain::geometry::BACKBONE_ATOM_NAMES[slot]);
    }
    sidechain_atoms(aa)
        .get(slot - NUM_BACKBONE_ATOMS)
        .map(|a| a.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::{MAX_SIDECHAIN_ATOMS, NUM_CHI};

    #[test]
    fn test_references_point_to_earlier_atoms() {
        for aa in AminoAcid::ALL {
            for (k, a) in sidechain_atoms(aa).iter().enumerate() {
                let own_index = NUM_BACKBONE_ATOMS + k;
                for r in a.refs {
                    assert!(r < own_index, "{:?} {} refs {}", aa, a.name, r);
                }
            }
        }
    }

    #[test]
    fn test_chi_indices_are_in_range() {
        for aa in AminoAcid::ALL {
            for a in sidechain_atoms(aa) {
                match a.torsion {
                    Torsion::Chi(i) | Torsion::ChiOffset(i, _) => assert!(i < NUM_CHI),
                    Torsion::Fixed(_) => {}
                }
            }
        }
    }

    #[test]
    fn test_sidechain_sizes() {
        assert_eq!(atom_count(AminoAcid::Gly), 3);
        assert_eq!(atom_count(AminoAcid::Ala), 4);
        let longest = AminoAcid::ALL
            .iter()
            .map(|a| sidechain_atoms(*a).len())
            .max()
            .unwrap();
        assert_eq!(longest, MAX_SIDECHAIN_ATOMS);
        assert_eq!(sidechain_atoms(AminoAcid::Trp).len(), MAX_SIDECHAIN_ATOMS);
    }

    #[test]
    fn test_atom_names() {
        assert_eq!(atom_name(AminoAcid::Ser, 1), Some("CA"));
        assert_eq!(atom_name(AminoAcid::Ser, 4), Some("OG"));
        assert_eq!(atom_name(AminoAcid::Ser, 5), None);
        assert_eq!(atom_name(AminoAcid::Gly, 3), None);
    }
}
