use burn::data::dataset::Dataset;
use std::sync::Arc;

use crate::data::errors::{LoadReport, RecordError};
use crate::domain::protein::ProteinRecord;

/// Burn dataset over validated protein records.
/// Records are shared, so cloning the dataset (e.g. to hand one copy
/// to a DataLoader) does not copy any coordinates.
#[derive(Debug, Clone)]
pub struct ProteinDataset {
    records: Arc<Vec<ProteinRecord>>,
}

impl ProteinDataset {
    pub fn new(records: Vec<ProteinRecord>) -> Self {
        Self { records: Arc::new(records) }
    }

    /// Drop records longer than `max_len`, tallying them in `report` under `split`.
    pub fn with_max_len(split: &str, records: Vec<ProteinRecord>, max_len: usize, report: &mut LoadReport) -> Self {
        Self::new(drop_long(split, records, max_len, report))
    }

    pub fn sample_count(&self) -> usize {
        self.records.len()
    }

    pub fn lengths(&self) -> Vec<usize> {
        self.records.iter().map(ProteinRecord::len).collect()
    }

    pub fn record(&self, index: usize) -> Option<&ProteinRecord> {
        self.records.get(index)
    }

    /// Clone the records at `indices`, in that order. Out-of-range indices are skipped.
    pub fn select(&self, indices: &[usize]) -> Vec<ProteinRecord> {
        indices.iter().filter_map(|&i| self.records.get(i).cloned()).collect()
    }
}

/// Records of `split` no longer than `max_len`; the rest are withdrawn in `report`.
pub fn drop_long(split: &str, records: Vec<ProteinRecord>, max_len: usize, report: &mut LoadReport) -> Vec<ProteinRecord> {
    let mut kept = Vec::with_capacity(records.len());
    for r in records {
        if r.len() > max_len {
            report.withdraw(split, r.id.clone(), &RecordError::TooLong { len: r.len(), max: max_len });
        } else {
            kept.push(r);
        }
    }
    kept
}

impl Dataset<ProteinRecord> for ProteinDataset {
    fn get(&self, index: usize) -> Option<ProteinRecord> {
        self.records.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::amino_acid::AminoAcid;

    fn record(id: &str, len: usize) -> ProteinRecord {
        ProteinRecord::new(id, vec![AminoAcid::Ala; len], Vec::new(), Vec::new())
    }

    #[test]
    fn test_max_len_filter_reports_long_records() {
        let mut report = LoadReport::new();
        let ds = ProteinDataset::with_max_len(
            "train",
            vec![record("a", 3), record("b", 12), record("c", 10)],
            10,
            &mut report,
        );
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.lengths(), vec![3, 10]);
        assert_eq!(report.ids_for("LONG_ERRORS"), ["b"]);
        assert_eq!(report.count("train", "LONG_ERRORS"), 1);
    }

    #[test]
    fn test_clone_shares_records() {
        let ds = ProteinDataset::new(vec![record("a", 3)]);
        let copy = ds.clone();
        assert!(Arc::ptr_eq(&ds.records, &copy.records));
        assert_eq!(copy.get(0).unwrap().id, "a");
        assert!(copy.get(1).is_none());
    }

    #[test]
    fn test_select_keeps_requested_order() {
        let ds = ProteinDataset::new(vec![record("a", 3), record("b", 4), record("c", 5)]);
        let ids: Vec<String> = ds.select(&[2, 0, 9]).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["c", "a"]);
    }
}
