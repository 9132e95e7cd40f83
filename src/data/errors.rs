// ============================================================
// Layer 4: Record Validation Errors
// ============================================================
// A dataset file can contain thousands of proteins, some of them
// broken (non-standard residues, truncated arrays, no resolved
// atoms). A bad record must not abort loading, so each failure is
// classified, tallied per split and kind, and reported once at the end.
//
// The report is written two ways:
//   - a summary table in the log
//   - errors/<KIND>.txt files listing affected ids, one per line

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("empty sequence")]
    EmptySequence,

    #[error("non-standard residue '{code}' at position {position}")]
    NonStandardResidue { position: usize, code: char },

    #[error("expected {expected} angle rows, found {found}")]
    AngleCount { expected: usize, found: usize },

    #[error("angle row {row} has {found} values, expected {expected}")]
    AngleWidth { row: usize, expected: usize, found: usize },

    #[error("expected {expected} coordinate rows, found {found}")]
    CoordCount { expected: usize, found: usize },

    #[error("coordinate row {row} has {found} values, expected 3")]
    CoordWidth { row: usize, found: usize },

    #[error("sequence of length {len} is shorter than {min}")]
    TooShort { len: usize, min: usize },

    #[error("sequence of length {len} exceeds maximum {max}")]
    TooLong { len: usize, max: usize },

    #[error("no resolved atoms")]
    NoResolvedAtoms,
}

impl RecordError {
    /// Stable name used for grouping and for error file names.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::EmptySequence => "SEQUENCE_ERRORS",
            RecordError::NonStandardResidue { .. } => "NSAA_ERRORS",
            RecordError::AngleCount { .. } | RecordError::AngleWidth { .. } => "ANGLE_SHAPE_ERRORS",
            RecordError::CoordCount { .. } | RecordError::CoordWidth { .. } => "COORD_SHAPE_ERRORS",
            RecordError::TooShort { .. } => "SHORT_ERRORS",
            RecordError::TooLong { .. } => "LONG_ERRORS",
            RecordError::NoResolvedAtoms => "MISSING_ATOMS_ERRORS",
        }
    }

    pub fn description(kind: &str) -> &'static str {
        match kind {
            "SEQUENCE_ERRORS" => "records had an empty sequence.",
            "NSAA_ERRORS" => "records contained non-standard amino acids.",
            "ANGLE_SHAPE_ERRORS" => "records had angle arrays that did not match the sequence.",
            "COORD_SHAPE_ERRORS" => "records had coordinate arrays that did not match the sequence.",
            "SHORT_ERRORS" => "records were too short.",
            "LONG_ERRORS" => "records exceeded the maximum sequence length.",
            "MISSING_ATOMS_ERRORS" => "records had no resolved atoms.",
            _ => "records failed for an unknown reason.",
        }
    }
}

/// Tally of accepted records and rejected record ids, per split and kind.
#[derive(Debug, Default, Clone)]
pub struct LoadReport {
    failures: BTreeMap<(String, &'static str), Vec<String>>,
    accepted: BTreeMap<String, usize>,
}

impl LoadReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&mut self, split: &str, id: impl Into<String>, err: &RecordError) {
        self.failures
            .entry((split.to_string(), err.kind()))
            .or_default()
            .push(id.into());
    }

    pub fn record_success(&mut self, split: &str) {
        *self.accepted.entry(split.to_string()).or_default() += 1;
    }

    /// Reject a record that had already passed validation
    /// (e.g. longer than the model's maximum length).
    pub fn withdraw(&mut self, split: &str, id: impl Into<String>, err: &RecordError) {
        if let Some(n) = self.accepted.get_mut(split) {
            *n = n.saturating_sub(1);
        }
        self.record_failure(split, id, err);
    }

    pub fn accepted(&self) -> usize {
        self.accepted.values().sum()
    }

    pub fn rejected(&self) -> usize {
        self.failures.values().map(Vec::len).sum()
    }

    /// Number of records of `split` rejected with `kind`.
    pub fn count(&self, split: &str, kind: &str) -> usize {
        self.failures
            .iter()
            .filter(|((s, k), _)| s == split && *k == kind)
            .map(|(_, ids)| ids.len())
            .sum()
    }

    /// Ids rejected with `kind` across all splits, in split order.
    pub fn ids_for(&self, kind: &str) -> Vec<&str> {
        self.failures
            .iter()
            .filter(|((_, k), _)| *k == kind)
            .flat_map(|(_, ids)| ids.iter().map(String::as_str))
            .collect()
    }

    fn kinds(&self) -> BTreeSet<&'static str> {
        self.failures.keys().map(|(_, k)| *k).collect()
    }

    /// Log one line per split and failure kind.
    pub fn summarize(&self) {
        if self.failures.is_empty() {
            tracing::info!("All {} records passed validation", self.accepted());
            return;
        }
        tracing::warn!(
            "{} records accepted, {} rejected:",
            self.accepted(),
            self.rejected()
        );
        for ((split, kind), ids) in &self.failures {
            tracing::warn!(
                "{:<12}{:<25}{:^8}{}",
                split,
                format!("{kind}:"),
                ids.len(),
                RecordError::description(kind)
            );
        }
    }

    /// Write errors/<KIND>.txt under `dir` for every kind seen.
    pub fn write_summary_files(&self, dir: &Path) -> Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        let err_dir = dir.join("errors");
        fs::create_dir_all(&err_dir)
            .with_context(|| format!("Cannot create '{}'", err_dir.display()))?;

        for kind in self.kinds() {
            let path = err_dir.join(format!("{kind}.txt"));
            fs::write(&path, self.ids_for(kind).join("\n") + "\n")
                .with_context(|| format!("Cannot write '{}'", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_grouped_by_kind() {
        let mut report = LoadReport::new();
        report.record_failure("train", "a", &RecordError::NonStandardResidue { position: 1, code: 'X' });
        report.record_failure("train", "b", &RecordError::NonStandardResidue { position: 4, code: 'B' });
        report.record_failure("train", "c", &RecordError::TooShort { len: 1, min: 2 });
        report.record_success("train");

        assert_eq!(report.rejected(), 3);
        assert_eq!(report.accepted(), 1);
        assert_eq!(report.ids_for("NSAA_ERRORS"), ["a", "b"]);
        assert!(report.ids_for("LONG_ERRORS").is_empty());
    }

    #[test]
    fn test_counts_are_kept_per_split() {
        let mut report = LoadReport::new();
        report.record_failure("train", "t1", &RecordError::EmptySequence);
        report.record_failure("test", "x1", &RecordError::EmptySequence);
        report.record_failure("test", "x2", &RecordError::NoResolvedAtoms);

        assert_eq!(report.count("train", "SEQUENCE_ERRORS"), 1);
        assert_eq!(report.count("test", "SEQUENCE_ERRORS"), 1);
        assert_eq!(report.count("test", "MISSING_ATOMS_ERRORS"), 1);
        assert_eq!(report.count("train", "MISSING_ATOMS_ERRORS"), 0);
        // split keys sort "test" before "train"
        assert_eq!(report.ids_for("SEQUENCE_ERRORS"), ["x1", "t1"]);
    }

    #[test]
    fn test_withdraw_moves_record_from_accepted_to_rejected() {
        let mut report = LoadReport::new();
        report.record_success("valid-10");
        report.record_success("valid-10");
        report.withdraw("valid-10", "v1", &RecordError::TooLong { len: 30, max: 20 });
        assert_eq!(report.accepted(), 1);
        assert_eq!(report.count("valid-10", "LONG_ERRORS"), 1);
    }

    #[test]
    fn test_shape_errors_share_a_kind() {
        let a = RecordError::AngleCount { expected: 3, found: 2 };
        let b = RecordError::AngleWidth { row: 0, expected: 11, found: 9 };
        assert_eq!(a.kind(), b.kind());
    }

    #[test]
    fn test_summary_files_list_ids_from_every_split() {
        let tmp = tempfile::tempdir().unwrap();
        let mut report = LoadReport::new();
        report.record_failure("train", "1abc_A", &RecordError::NoResolvedAtoms);
        report.record_failure("valid-30", "2xyz_B", &RecordError::NoResolvedAtoms);
        report.write_summary_files(tmp.path()).unwrap();

        let text = fs::read_to_string(tmp.path().join("errors/MISSING_ATOMS_ERRORS.txt")).unwrap();
        assert_eq!(text, "1abc_A\n2xyz_B\n");
    }
}
