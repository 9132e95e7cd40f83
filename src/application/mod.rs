// ============================================================
// Layer 2: Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training, evaluating, predicting).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing to stdout (that's Layer 1)
//   - Only workflow coordination and backend selection

/// Load data, train, test
pub mod train_use_case;

/// Score the best checkpoint on a dataset split
pub mod evaluate_use_case;

/// Predict one structure from a sequence
pub mod predict_use_case;
