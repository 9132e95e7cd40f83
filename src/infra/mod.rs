// ============================================================
// Layer 6: Infrastructure Layer
// ============================================================
// Cross-cutting concerns that write to or read from disk:
//
//   checkpoint.rs  Saving and loading model weights with Burn's
//                  CompactRecorder, plus the best-epoch pointer
//                  and the TrainConfig JSON that lets evaluation
//                  and prediction rebuild the architecture.
//
//   metrics.rs     Epoch-level metrics (train/val loss, loss
//                  components, learning rate) appended to a CSV.
//
//   pdb.rs         Atom coordinates rendered as PDB files, for
//                  predictions and for periodic training snapshots.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// PDB structure writer
pub mod pdb;
