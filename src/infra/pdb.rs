// ============================================================
// Layer 6: PDB Writer
// ============================================================
// Writes all-atom coordinates ([L*13] slots per protein) as a
// minimal PDB file: one ATOM record per real, finite atom, chain A,
// residues numbered from 1, then END.
//
// Used for predictions and for the periodic structure snapshots
// written during training.

use anyhow::{Context, Result};
use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::domain::amino_acid::AminoAcid;
use crate::domain::geometry::NUM_COORDS_PER_RESIDUE;
use crate::domain::sidechain::atom_name;

/// PDB atom names under four characters start in column 14.
fn pdb_atom_name(name: &str) -> String {
    if name.len() < 4 {
        format!(" {name:<3}")
    } else {
        name.to_string()
    }
}

/// Render PDB text. Atoms with non-finite coordinates are skipped.
pub fn to_pdb_string(title: &str, sequence: &[AminoAcid], coords: &[[f32; 3]]) -> String {
    let mut out = format!("REMARK   1 {title}\n");
    let mut serial = 1;

    for (i, &aa) in sequence.iter().enumerate() {
        for slot in 0..NUM_COORDS_PER_RESIDUE {
            let Some(name) = atom_name(aa, slot) else { break };
            let Some(&[x, y, z]) = coords.get(i * NUM_COORDS_PER_RESIDUE + slot) else { break };
            if !(x.is_finite() && y.is_finite() && z.is_finite()) {
                continue;
            }
            let element = name.chars().next().unwrap_or('C');
            out.push_str(&format!(
                "ATOM  {:>5} {:<4} {:>3} A{:>4}    {:>8.3}{:>8.3}{:>8.3}  1.00  0.00          {:>2}\n",
                serial,
                pdb_atom_name(name),
                aa.three_letter(),
                i + 1,
                x,
                y,
                z,
                element,
            ));
            serial += 1;
        }
    }
    out.push_str("END\n");
    out
}

pub fn write_pdb(path: &Path, title: &str, sequence: &[AminoAcid], coords: &[[f32; 3]]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)
        .with_context(|| format!("Cannot create PDB file '{}'", path.display()))?;
    let mut w = BufWriter::new(file);
    w.write_all(to_pdb_string(title, sequence, coords).as_bytes())?;
    w.flush()?;
    Ok(())
}

/// Writes predicted/true structure pairs under `<dir>/structures/`.
pub struct StructureSnapshots {
    dir: PathBuf,
}

impl StructureSnapshots {
    pub fn new(checkpoint_dir: &Path) -> Self {
        Self { dir: checkpoint_dir.join("structures") }
    }

    /// Returns the path of the predicted structure file.
    pub fn write(
        &self,
        epoch:    usize,
        id:       &str,
        sequence: &[AminoAcid],
        pred:     &[[f32; 3]],
        truth:    &[[f32; 3]],
    ) -> Result<PathBuf> {
        // ids may contain '#' or '/', keep file names flat
        let safe: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let pred_path = self.dir.join(format!("epoch_{epoch:04}_{safe}_pred.pdb"));
        let true_path = self.dir.join(format!("{safe}_true.pdb"));

        write_pdb(&pred_path, &format!("{id} predicted, epoch {epoch}"), sequence, pred)?;
        if !true_path.exists() {
            write_pdb(&true_path, &format!("{id} experimental"), sequence, truth)?;
        }
        tracing::debug!("Wrote structure snapshot '{}'", pred_path.display());
        Ok(pred_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(len: usize) -> Vec<[f32; 3]> {
        (0..len * NUM_COORDS_PER_RESIDUE).map(|i| [i as f32, 1.0, -2.5]).collect()
    }

    #[test]
    fn test_atom_records_follow_residue_types() {
        let seq = [AminoAcid::Gly, AminoAcid::Ala];
        let text = to_pdb_string("t", &seq, &coords(2));
        let atoms: Vec<&str> = text.lines().filter(|l| l.starts_with("ATOM")).collect();
        // GLY: N CA C, ALA: N CA C CB
        assert_eq!(atoms.len(), 7);
        assert_eq!(
            atoms[1],
            "ATOM      2  CA  GLY A   1       1.000   1.000  -2.500  1.00  0.00           C"
        );
        assert!(atoms[6].contains(" CB  ALA A   2"));
        assert!(text.ends_with("END\n"));
    }

    #[test]
    fn test_missing_atoms_are_skipped() {
        let mut xyz = coords(1);
        xyz[1] = [f32::NAN, 0.0, 0.0];
        let text = to_pdb_string("t", &[AminoAcid::Gly], &xyz);
        assert_eq!(text.lines().filter(|l| l.starts_with("ATOM")).count(), 2);
    }

    #[test]
    fn test_snapshot_writes_both_files() {
        let tmp = tempfile::tempdir().unwrap();
        let snaps = StructureSnapshots::new(tmp.path());
        let seq = [AminoAcid::Ser, AminoAcid::Gly];
        let path = snaps.write(5, "valid-10#0", &seq, &coords(2), &coords(2)).unwrap();
        assert!(path.ends_with("epoch_0005_valid-10_0_pred.pdb"));
        assert!(tmp.path().join("structures/valid-10_0_true.pdb").exists());
    }
}
