// ============================================================
// Layer 3: Protein Record
// ============================================================
// One protein as it comes out of the dataset file.
//
// Missing values (unresolved atoms, undefined angles) are NaN.
// The batcher turns NaNs into masks before anything reaches a
// tensor, so NaN never enters the autodiff graph.

use serde::{Deserialize, Serialize};

use crate::domain::amino_acid::AminoAcid;
use crate::domain::geometry::{NUM_ANGLES, NUM_COORDS_PER_RESIDUE};
use crate::domain::sidechain::atom_count;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProteinRecord {
    /// Dataset identifier (ProteinNet id or generated)
    pub id: String,

    pub sequence: Vec<AminoAcid>,

    /// One row per residue
    pub angles: Vec<[f32; NUM_ANGLES]>,

    /// NUM_COORDS_PER_RESIDUE rows per residue
    pub coords: Vec<[f32; 3]>,
}

impl ProteinRecord {
    pub fn new(
        id:       impl Into<String>,
        sequence: Vec<AminoAcid>,
        angles:   Vec<[f32; NUM_ANGLES]>,
        coords:   Vec<[f32; 3]>,
    ) -> Self {
        Self { id: id.into(), sequence, angles, coords }
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// True if coordinate slot `slot` of residue `residue` is a real
    /// atom for that residue type and its position is known.
    pub fn atom_resolved(&self, residue: usize, slot: usize) -> bool {
        let Some(aa) = self.sequence.get(residue) else {
            return false;
        };
        if slot >= atom_count(*aa) {
            return false;
        }
        self.coords
            .get(residue * NUM_COORDS_PER_RESIDUE + slot)
            .map(|p| p.iter().all(|v| v.is_finite()))
            .unwrap_or(false)
    }

    /// Number of atoms that exist for the sequence and have coordinates.
    pub fn resolved_atom_count(&self) -> usize {
        (0..self.len())
            .map(|r| {
                (0..NUM_COORDS_PER_RESIDUE)
                    .filter(|&s| self.atom_resolved(r, s))
                    .count()
            })
            .sum()
    }
}
