// ============================================================
// Layer 3: Domain Layer
// ============================================================
// Plain Rust types that describe proteins, independent of the
// ML framework and of any file format.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, traits and math
//
// Everything here can be unit tested without a GPU.

// The 20 standard amino acids and their token ids
pub mod amino_acid;

// Angle/coordinate layout and backbone bond geometry
pub mod geometry;

// Per-residue sidechain construction recipes
pub mod sidechain;

// One protein: sequence, internal angles, atom coordinates
pub mod protein;

// Kabsch superposition RMSD (evaluation metric)
pub mod superpose;

// Validated records grouped by split
pub mod corpus;
