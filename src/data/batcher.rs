// ============================================================
// Layer 4: Protein Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<ProteinRecord>
// into padded, masked tensors.
//
// Proteins differ in length, so every batch is padded to its own
// longest member (dynamic padding). Together with length-binned
// sampling this keeps padding waste small.
//
// Missing values never reach a tensor: NaN angles/coordinates are
// written as 0.0 and flagged 0 in the matching mask.
//
// Shapes (B = batch size, L = longest sequence in the batch):
//   residues    [B, L]          Int   token ids, 0 = padding
//   pad_mask    [B, L]          Bool  true = padding position
//   angle_trig  [B, L, 11, 2]   Float (cos, sin) of target angles
//   angle_mask  [B, L, 11]      Float 1 = angle known
//   coords      [B, L*13, 3]    Float target atom positions
//   atom_mask   [B, L*13]       Float 1 = atom exists and is resolved

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::amino_acid::{AminoAcid, PAD_ID};
use crate::domain::geometry::{NUM_ANGLES, NUM_COORDS_PER_RESIDUE};
use crate::domain::protein::ProteinRecord;

#[derive(Debug, Clone)]
pub struct ProteinBatch<B: Backend> {
    pub residues:   Tensor<B, 2, Int>,
    pub pad_mask:   Tensor<B, 2, Bool>,
    pub angle_trig: Tensor<B, 4>,
    pub angle_mask: Tensor<B, 3>,
    pub coords:     Tensor<B, 3>,
    pub atom_mask:  Tensor<B, 2>,

    // Host-side metadata, kept for the structure builder and logging
    pub ids:       Vec<String>,
    pub lengths:   Vec<usize>,
    pub sequences: Vec<Vec<AminoAcid>>,
}

impl<B: Backend> ProteinBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    /// Padded length L.
    pub fn max_len(&self) -> usize {
        self.residues.dims()[1]
    }

    /// Residue type per (protein, position), row-major over [B, L].
    /// None marks padding.
    pub fn residue_rows(&self) -> Vec<Option<AminoAcid>> {
        let l = self.max_len();
        self.sequences
            .iter()
            .flat_map(|seq| (0..l).map(move |i| seq.get(i).copied()))
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct ProteinBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ProteinBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<ProteinRecord, ProteinBatch<B>> for ProteinBatcher<B> {
    fn batch(&self, items: Vec<ProteinRecord>) -> ProteinBatch<B> {
        let batch_size = items.len();
        let max_len    = items.iter().map(ProteinRecord::len).max().unwrap_or(0).max(1);
        let n_atoms    = max_len * NUM_COORDS_PER_RESIDUE;

        let mut residues   = vec![PAD_ID as i32; batch_size * max_len];
        let mut angle_trig = vec![0.0f32; batch_size * max_len * NUM_ANGLES * 2];
        let mut angle_mask = vec![0.0f32; batch_size * max_len * NUM_ANGLES];
        let mut coords     = vec![0.0f32; batch_size * n_atoms * 3];
        let mut atom_mask  = vec![0.0f32; batch_size * n_atoms];

        for (b, item) in items.iter().enumerate() {
            for (i, aa) in item.sequence.iter().enumerate() {
                let res = b * max_len + i;
                residues[res] = aa.token_id() as i32;

                // ── Angles → (cos, sin) + mask ───────────────────────────────
                if let Some(row) = item.angles.get(i) {
                    for (k, &a) in row.iter().enumerate() {
                        if a.is_finite() {
                            let slot = res * NUM_ANGLES + k;
                            angle_trig[slot * 2]     = a.cos();
                            angle_trig[slot * 2 + 1] = a.sin();
                            angle_mask[slot]         = 1.0;
                        }
                    }
                }

                // ── Coordinates + mask ───────────────────────────────────────
                for s in 0..NUM_COORDS_PER_RESIDUE {
                    if !item.atom_resolved(i, s) {
                        continue;
                    }
                    let src  = item.coords[i * NUM_COORDS_PER_RESIDUE + s];
                    let atom = b * n_atoms + i * NUM_COORDS_PER_RESIDUE + s;
                    coords[atom * 3..atom * 3 + 3].copy_from_slice(&src);
                    atom_mask[atom] = 1.0;
                }
            }
        }

        let residues = Tensor::<B, 1, Int>::from_ints(residues.as_slice(), &self.device)
            .reshape([batch_size, max_len]);
        let pad_mask = residues.clone().equal_elem(PAD_ID as i32);

        let angle_trig = Tensor::<B, 1>::from_floats(angle_trig.as_slice(), &self.device)
            .reshape([batch_size, max_len, NUM_ANGLES, 2]);
        let angle_mask = Tensor::<B, 1>::from_floats(angle_mask.as_slice(), &self.device)
            .reshape([batch_size, max_len, NUM_ANGLES]);
        let coords = Tensor::<B, 1>::from_floats(coords.as_slice(), &self.device)
            .reshape([batch_size, n_atoms, 3]);
        let atom_mask = Tensor::<B, 1>::from_floats(atom_mask.as_slice(), &self.device)
            .reshape([batch_size, n_atoms]);

        ProteinBatch {
            residues,
            pad_mask,
            angle_trig,
            angle_mask,
            coords,
            atom_mask,
            ids:       items.iter().map(|r| r.id.clone()).collect(),
            lengths:   items.iter().map(ProteinRecord::len).collect(),
            sequences: items.into_iter().map(|r| r.sequence).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn record(id: &str, seq: Vec<AminoAcid>) -> ProteinRecord {
        let len = seq.len();
        let mut angles = vec![[0.25f32; NUM_ANGLES]; len];
        angles[0][0] = f32::NAN;
        let coords = vec![[1.0f32, 2.0, 3.0]; len * NUM_COORDS_PER_RESIDUE];
        ProteinRecord::new(id, seq, angles, coords)
    }

    fn batch() -> ProteinBatch<TestBackend> {
        let batcher = ProteinBatcher::<TestBackend>::new(Default::default());
        batcher.batch(vec![
            record("short", vec![AminoAcid::Gly, AminoAcid::Ala]),
            record("long", vec![AminoAcid::Ser, AminoAcid::Gly, AminoAcid::Trp]),
        ])
    }

    #[test]
    fn test_pads_to_longest_member() {
        let b = batch();
        assert_eq!(b.residues.dims(), [2, 3]);
        assert_eq!(b.angle_trig.dims(), [2, 3, NUM_ANGLES, 2]);
        assert_eq!(b.coords.dims(), [2, 3 * NUM_COORDS_PER_RESIDUE, 3]);
        assert_eq!(b.lengths, vec![2, 3]);

        let pad: Vec<bool> = b.pad_mask.into_data().to_vec().unwrap();
        assert_eq!(pad, vec![false, false, true, false, false, false]);
    }

    #[test]
    fn test_missing_angles_are_masked() {
        let b = batch();
        let mask: Vec<f32> = b.angle_mask.into_data().to_vec().unwrap();
        // protein 0, residue 0, phi was NaN
        assert_eq!(mask[0], 0.0);
        assert_eq!(mask[1], 1.0);
        // padded residue of protein 0 has no angles
        let padded = 2 * NUM_ANGLES;
        assert!(mask[padded..padded + NUM_ANGLES].iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_atom_mask_follows_residue_type() {
        let b = batch();
        let mask: Vec<f32> = b.atom_mask.into_data().to_vec().unwrap();
        let per_res = NUM_COORDS_PER_RESIDUE;
        let count = |start: usize| mask[start..start + per_res].iter().filter(|&&m| m > 0.0).count();
        // protein 0: GLY (3 atoms), ALA (4 atoms), padding
        assert_eq!(count(0), 3);
        assert_eq!(count(per_res), 4);
        assert_eq!(count(2 * per_res), 0);
        // protein 1, residue 2: TRP uses every slot
        let n_atoms = 3 * per_res;
        assert_eq!(count(n_atoms + 2 * per_res), per_res);
    }

    #[test]
    fn test_residue_rows_mark_padding() {
        let rows = batch().residue_rows();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[1], Some(AminoAcid::Ala));
        assert_eq!(rows[2], None);
        assert_eq!(rows[5], Some(AminoAcid::Trp));
    }
}
