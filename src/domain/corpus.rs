// ============================================================
// Layer 3: Protein Corpus
// ============================================================
// Every validated record of a dataset file, grouped by split,
// plus the settings the file was prepared with.

use std::collections::BTreeMap;

use crate::domain::protein::ProteinRecord;

/// Dataset-wide settings stored next to the splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DatasetSettings {
    /// Longest sequence the dataset was prepared for
    pub max_len: usize,
}

/// All validated records, keyed by split name
/// (`train`, `valid-<n>`, `test`).
#[derive(Debug, Clone)]
pub struct ProteinCorpus {
    pub settings: DatasetSettings,
    pub splits:   BTreeMap<String, Vec<ProteinRecord>>,
}

impl ProteinCorpus {
    /// Validation split names in sorted order.
    pub fn validation_splits(&self) -> Vec<&str> {
        self.splits
            .keys()
            .filter(|k| k.starts_with("valid"))
            .map(|k| k.as_str())
            .collect()
    }
}
