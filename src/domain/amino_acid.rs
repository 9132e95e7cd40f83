// ============================================================
// Layer 3: Amino Acid Vocabulary
// ============================================================
// The model's input alphabet. Token id 0 is reserved for padding,
// the 20 standard residues take ids 1..=20 in the order of
// `ONE_LETTER_CODES`.

use serde::{Deserialize, Serialize};

/// Padding token id. Never produced by a real residue.
pub const PAD_ID: usize = 0;

/// Padding + 20 standard residues.
pub const VOCAB_SIZE: usize = 21;

/// One-letter codes in token-id order (id = position + 1).
pub const ONE_LETTER_CODES: &str = "ARNDCQEGHILKMFPSTWYV";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AminoAcid {
    Ala,
    Arg,
    Asn,
    Asp,
    Cys,
    Gln,
    Glu,
    Gly,
    His,
    Ile,
    Leu,
    Lys,
    Met,
    Phe,
    Pro,
    Ser,
    Thr,
    Trp,
    Tyr,
    Val,
}

impl AminoAcid {
    /// All residues in token-id order.
    pub const ALL: [AminoAcid; 20] = [
        AminoAcid::Ala, AminoAcid::Arg, AminoAcid::Asn, AminoAcid::Asp,
        AminoAcid::Cys, AminoAcid::Gln, AminoAcid::Glu, AminoAcid::Gly,
        AminoAcid::His, AminoAcid::Ile, AminoAcid::Leu, AminoAcid::Lys,
        AminoAcid::Met, AminoAcid::Phe, AminoAcid::Pro, AminoAcid::Ser,
        AminoAcid::Thr, AminoAcid::Trp, AminoAcid::Tyr, AminoAcid::Val,
    ];

    /// Parse a one-letter code (case-insensitive).
    /// Returns None for non-standard residues such as X, B, Z, U or O.
    pub fn from_code(code: char) -> Option<Self> {
        let upper = code.to_ascii_uppercase();
        ONE_LETTER_CODES
            .chars()
            .position(|c| c == upper)
            .map(|i| Self::ALL[i])
    }

    pub fn token_id(self) -> usize {
        self as usize + 1
    }

    /// Three-letter residue name as used in PDB files.
    pub fn three_letter(self) -> &'static str {
        match self {
            AminoAcid::Ala => "ALA",
            AminoAcid::Arg => "ARG",
            AminoAcid::Asn => "ASN",
            AminoAcid::Asp => "ASP",
            AminoAcid::Cys => "CYS",
            AminoAcid::Gln => "GLN",
            AminoAcid::Glu => "GLU",
            AminoAcid::Gly => "GLY",
            AminoAcid::His => "HIS",
            AminoAcid::Ile => "ILE",
            AminoAcid::Leu => "LEU",
            AminoAcid::Lys => "LYS",
            AminoAcid::Met => "MET",
            AminoAcid::Phe => "PHE",
            AminoAcid::Pro => "PRO",
            AminoAcid::Ser => "SER",
            AminoAcid::Thr => "THR",
            AminoAcid::Trp => "TRP",
            AminoAcid::Tyr => "TYR",
            AminoAcid::Val => "VAL",
        }
    }
}

/// Parse a whole one-letter sequence.
/// On failure returns the position and character of the first
/// non-standard residue.
pub fn parse_sequence(seq: &str) -> Result<Vec<AminoAcid>, (usize, char)> {
    seq.chars()
        .enumerate()
        .map(|(i, c)| AminoAcid::from_code(c).ok_or((i, c)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_ids_skip_padding() {
        for (i, aa) in AminoAcid::ALL.iter().enumerate() {
            assert_eq!(aa.token_id(), i + 1);
            assert_ne!(aa.token_id(), PAD_ID);
            assert!(aa.token_id() < VOCAB_SIZE);
        }
    }

    #[test]
    fn test_codes_match_vocabulary_order() {
        let parsed: Vec<_> = ONE_LETTER_CODES.chars().filter_map(AminoAcid::from_code).collect();
        assert_eq!(parsed, AminoAcid::ALL);
    }

    #[test]
    fn test_lowercase_codes_are_accepted() {
        assert_eq!(AminoAcid::from_code('w'), Some(AminoAcid::Trp));
    }

    #[test]
    fn test_parse_sequence_reports_first_nonstandard_residue() {
        assert_eq!(parse_sequence("MKV").unwrap().len(), 3);
        assert_eq!(parse_sequence("MKXVB"), Err((2, 'X')));
    }
}
