// ============================================================
// Layer 4: Dataset Loader
// ============================================================
// Reads the preprocessed ProteinNet-style dataset file.
//
// File layout (JSON):
//   {
//     "settings": { "max_len": 500 },
//     "train":    { "seq": [...], "ang": [...], "crd": [...], "ids": [...] },
//     "valid-10": { ... },
//     "test":     { ... }
//   }
//
// Per split, the arrays are columnar (index i is protein i):
//   seq  one-letter sequence strings
//   ang  L rows of NUM_ANGLES angles (radians), null = missing
//   crd  L * NUM_COORDS_PER_RESIDUE rows of xyz, null = missing
//   ids  optional identifiers
//
// Every record is validated. Bad records are skipped and counted
// in the LoadReport instead of failing the whole load.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::{fs, path::Path};

use crate::data::errors::{LoadReport, RecordError};
use crate::domain::amino_acid::parse_sequence;
use crate::domain::geometry::{NUM_ANGLES, NUM_COORDS_PER_RESIDUE};
use crate::domain::protein::ProteinRecord;
use crate::domain::corpus::{DatasetSettings, ProteinCorpus};

/// Sequences shorter than this cannot form a pairwise-distance loss.
pub const MIN_RESIDUES: usize = 2;

#[derive(Debug, Deserialize)]
struct RawDataset {
    settings: DatasetSettings,
    #[serde(flatten)]
    splits: BTreeMap<String, RawSplit>,
}

#[derive(Debug, Deserialize)]
struct RawSplit {
    seq: Vec<String>,
    ang: Vec<Vec<Vec<Option<f32>>>>,
    crd: Vec<Vec<Vec<Option<f32>>>>,
    #[serde(default)]
    ids: Vec<String>,
}

/// Loads the JSON dataset file and validates every record.
pub struct ProteinNetLoader {
    path: String,
}

impl ProteinNetLoader {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Parse and validate. Returns the corpus plus the rejection report.
    pub fn load_with_report(&self) -> Result<(ProteinCorpus, LoadReport)> {
        let path = Path::new(&self.path);
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read dataset '{}'", path.display()))?;
        parse_dataset(&text)
            .with_context(|| format!("Malformed dataset file '{}'", path.display()))
    }
}

/// Parse dataset JSON text into a validated corpus.
pub fn parse_dataset(text: &str) -> Result<(ProteinCorpus, LoadReport)> {
    let raw: RawDataset = serde_json::from_str(text)?;
    let mut report = LoadReport::new();
    let mut splits = BTreeMap::new();

    for (name, split) in raw.splits {
        anyhow::ensure!(
            split.ang.len() == split.seq.len() && split.crd.len() == split.seq.len(),
            "split '{}' has {} sequences, {} angle arrays and {} coordinate arrays",
            name,
            split.seq.len(),
            split.ang.len(),
            split.crd.len()
        );

        let ids_usable = split.ids.len() == split.seq.len();
        if !split.ids.is_empty() && !ids_usable {
            tracing::warn!(
                "Split '{}' has {} ids for {} records, generating ids instead",
                name,
                split.ids.len(),
                split.seq.len()
            );
        }

        let mut records = Vec::with_capacity(split.seq.len());
        for (i, ((seq, ang), crd)) in split
            .seq
            .iter()
            .zip(&split.ang)
            .zip(&split.crd)
            .enumerate()
        {
            let id = if ids_usable { split.ids[i].clone() } else { format!("{name}#{i}") };

            match build_record(&id, seq, ang, crd) {
                Ok(record) => {
                    report.record_success(&name);
                    records.push(record);
                }
                Err(e) => {
                    tracing::debug!("Skipping '{}': {}", id, e);
                    report.record_failure(&name, id, &e);
                }
            }
        }

        tracing::info!("Split '{}': {} valid records", name, records.len());
        splits.insert(name, records);
    }

    Ok((ProteinCorpus { settings: raw.settings, splits }, report))
}

/// Validate one raw record and convert nulls to NaN.
pub fn build_record(
    id:  &str,
    seq: &str,
    ang: &[Vec<Option<f32>>],
    crd: &[Vec<Option<f32>>],
) -> Result<ProteinRecord, RecordError> {
    if seq.is_empty() {
        return Err(RecordError::EmptySequence);
    }

    let sequence = parse_sequence(seq)
        .map_err(|(position, code)| RecordError::NonStandardResidue { position, code })?;
    let len = sequence.len();

    if len < MIN_RESIDUES {
        return Err(RecordError::TooShort { len, min: MIN_RESIDUES });
    }

    if ang.len() != len {
        return Err(RecordError::AngleCount { expected: len, found: ang.len() });
    }
    let mut angles = Vec::with_capacity(len);
    for (row, values) in ang.iter().enumerate() {
        if values.len() != NUM_ANGLES {
            return Err(RecordError::AngleWidth { row, expected: NUM_ANGLES, found: values.len() });
        }
        let mut a = [f32::NAN; NUM_ANGLES];
        for (dst, v) in a.iter_mut().zip(values) {
            *dst = v.unwrap_or(f32::NAN);
        }
        angles.push(a);
    }

    let expected = len * NUM_COORDS_PER_RESIDUE;
    if crd.len() != expected {
        return Err(RecordError::CoordCount { expected, found: crd.len() });
    }
    let mut coords = Vec::with_capacity(expected);
    for (row, xyz) in crd.iter().enumerate() {
        if xyz.len() != 3 {
            return Err(RecordError::CoordWidth { row, found: xyz.len() });
        }
        coords.push([
            xyz[0].unwrap_or(f32::NAN),
            xyz[1].unwrap_or(f32::NAN),
            xyz[2].unwrap_or(f32::NAN),
        ]);
    }

    let record = ProteinRecord::new(id, sequence, angles, coords);
    if record.resolved_atom_count() == 0 {
        return Err(RecordError::NoResolvedAtoms);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coords_json(len: usize) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = (0..len * NUM_COORDS_PER_RESIDUE)
            .map(|i| json!([i as f32, 0.5, 1.0]))
            .collect();
        json!(rows)
    }

    fn angles_json(len: usize) -> serde_json::Value {
        let row: Vec<serde_json::Value> = (0..NUM_ANGLES).map(|_| json!(0.5)).collect();
        json!(vec![row; len])
    }

    fn dataset_json() -> String {
        json!({
            "settings": { "max_len": 100 },
            "train": {
                "seq": ["MK", "MXK", "A"],
                "ang": [angles_json(2), angles_json(3), angles_json(1)],
                "crd": [coords_json(2), coords_json(3), coords_json(1)],
                "ids": ["good", "nsaa", "short"]
            },
            "valid-10": {
                "seq": ["GAV"],
                "ang": [angles_json(3)],
                "crd": [coords_json(3)]
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_keeps_valid_and_reports_invalid() {
        let (corpus, report) = parse_dataset(&dataset_json()).unwrap();
        assert_eq!(corpus.settings.max_len, 100);
        assert_eq!(corpus.splits["train"].len(), 1);
        assert_eq!(corpus.splits["train"][0].id, "good");
        assert_eq!(report.ids_for("NSAA_ERRORS"), ["nsaa"]);
        assert_eq!(report.ids_for("SHORT_ERRORS"), ["short"]);
    }

    #[test]
    fn test_failures_are_counted_per_split() {
        let text = json!({
            "settings": { "max_len": 100 },
            "train": {
                "seq": ["MK", "MXK"],
                "ang": [angles_json(2), angles_json(3)],
                "crd": [coords_json(2), coords_json(3)]
            },
            "test": {
                "seq": ["GAV", "A"],
                "ang": [angles_json(2), angles_json(1)],
                "crd": [coords_json(3), coords_json(1)]
            }
        })
        .to_string();
        let (corpus, report) = parse_dataset(&text).unwrap();
        assert_eq!(corpus.splits["train"].len(), 1);
        assert!(corpus.splits["test"].is_empty());

        assert_eq!(report.count("train", "NSAA_ERRORS"), 1);
        assert_eq!(report.count("test", "NSAA_ERRORS"), 0);
        assert_eq!(report.count("test", "ANGLE_SHAPE_ERRORS"), 1);
        assert_eq!(report.count("test", "SHORT_ERRORS"), 1);
        assert_eq!(report.count("train", "SHORT_ERRORS"), 0);
        assert_eq!(report.ids_for("NSAA_ERRORS"), ["train#1"]);
    }

    #[test]
    fn test_mismatched_ids_fall_back_to_generated() {
        let text = json!({
            "settings": { "max_len": 100 },
            "train": {
                "seq": ["MK", "GA"],
                "ang": [angles_json(2), angles_json(2)],
                "crd": [coords_json(2), coords_json(2)],
                "ids": ["only_one"]
            }
        })
        .to_string();
        let (corpus, _) = parse_dataset(&text).unwrap();
        let ids: Vec<&str> = corpus.splits["train"].iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["train#0", "train#1"]);
    }

    #[test]
    fn test_missing_ids_are_generated() {
        let (corpus, _) = parse_dataset(&dataset_json()).unwrap();
        assert_eq!(corpus.splits["valid-10"][0].id, "valid-10#0");
    }

    #[test]
    fn test_null_values_become_nan() {
        let ang = vec![vec![None; NUM_ANGLES], vec![Some(1.0); NUM_ANGLES]];
        let crd: Vec<Vec<Option<f32>>> = (0..2 * NUM_COORDS_PER_RESIDUE)
            .map(|i| if i == 0 { vec![None, None, None] } else { vec![Some(1.0); 3] })
            .collect();
        let r = build_record("x", "GG", &ang, &crd).unwrap();
        assert!(r.angles[0][0].is_nan());
        assert_eq!(r.angles[1][0], 1.0);
        assert!(!r.atom_resolved(0, 0));
        assert!(r.atom_resolved(0, 1));
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let ang = vec![vec![Some(0.0); NUM_ANGLES]; 2];
        let crd = vec![vec![Some(0.0); 3]; 5];
        let err = build_record("x", "GG", &ang, &crd).unwrap_err();
        assert_eq!(err, RecordError::CoordCount { expected: 2 * NUM_COORDS_PER_RESIDUE, found: 5 });
    }

    #[test]
    fn test_all_missing_coordinates_rejected() {
        let ang = vec![vec![Some(0.0); NUM_ANGLES]; 2];
        let crd = vec![vec![None; 3]; 2 * NUM_COORDS_PER_RESIDUE];
        assert_eq!(build_record("x", "GG", &ang, &crd).unwrap_err(), RecordError::NoResolvedAtoms);
    }

    #[test]
    fn test_loader_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.json");
        fs::write(&path, dataset_json()).unwrap();
        let (corpus, report) = ProteinNetLoader::new(path.to_string_lossy()).load_with_report().unwrap();
        assert_eq!(corpus.validation_splits(), vec!["valid-10"]);
        assert_eq!(report.accepted(), 2);
    }
}
