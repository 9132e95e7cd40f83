// ============================================================
// Layer 4: Data Pipeline
// ============================================================
// Everything from the dataset file to GPU-ready tensor batches.
//
//   dataset.json
//       │
//       ▼
//   ProteinNetLoader  → parses splits, validates every record
//       │               (rejects are tallied in a LoadReport)
//       ▼
//   ProteinDataset    → implements Burn's Dataset trait
//       │
//       ▼
//   LengthSampler     → orders / bins indices by sequence length
//       │               (or Burn's DataLoader for random batches)
//       ▼
//   ProteinBatcher    → pads, masks and stacks into tensors
//
// Each module is responsible for exactly one step.

/// Record validation failures and their summary report
pub mod errors;

/// Reads the JSON dataset file into validated records
pub mod loader;

/// Implements Burn's Dataset trait for protein records
pub mod dataset;

/// Implements Burn's Batcher trait to create padded tensor batches
pub mod batcher;

/// Length-aware batch ordering
pub mod sampler;

/// Shuffles and splits records into train/validation sets
pub mod splitter;
