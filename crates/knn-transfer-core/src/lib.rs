//! # knn-transfer Core
//!
//! Transfers categorical labels from a labeled reference set to unlabeled
//! query entities that share an embedding space. An exact Euclidean
//! k-nearest-neighbor index is fitted once over the reference embedding; each
//! query row then votes over its neighbors' labels with distance-adaptive
//! kernel weights, yielding a predicted label and an uncertainty score per
//! label column.
//!
//! ## Quick Start
//!
//! ```rust
//! use knn_transfer_core::{
//!     fit, transfer, Dataset, EmbeddingMatrix, EmbeddingSelector, LabelTable, TransferConfig,
//! };
//!
//! let ids = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
//! let points = |v: &[f64]| {
//!     EmbeddingMatrix::from_rows(v.iter().map(|&p| vec![p]).collect()).unwrap()
//! };
//!
//! let reference = Dataset::new(ids(&["r0", "r1", "r2", "r3"]), points(&[0.0, 1.0, 10.0, 11.0])).unwrap();
//! let labels = LabelTable::from_columns(
//!     ids(&["r0", "r1", "r2", "r3"]),
//!     vec![("cell_type".into(), ids(&["A", "A", "B", "B"]))],
//! )
//! .unwrap();
//! let query = Dataset::new(ids(&["q0"]), points(&[0.5])).unwrap();
//!
//! let index = fit(&reference, "X", 2).unwrap();
//! let config = TransferConfig::new().with_label_key("cell_type");
//! let out = transfer(&index, &query, &EmbeddingSelector::Primary, &labels, config).unwrap();
//!
//! assert_eq!(out.predictions.get(0, 0).as_str(), "A");
//! assert_eq!(*out.uncertainties.get(0, 0), 0.0);
//! ```
pub mod error;
pub mod index;
pub mod transfer;
pub mod types;

// Re-export primary API
pub use error::{Result, TransferError};
pub use index::{fit, ExactIndex, IndexBuilder, IndexConfig, NeighborSearch, Neighbors};
pub use transfer::{transfer, TransferConfig, WeightMatrix, WeightedKnnTransfer};
pub use types::{
    Dataset, EmbeddingMatrix, EmbeddingSelector, LabelSelector, LabelTable, PredictedLabel,
    PredictionTable, ResultTable, TransferOutput, UncertaintyMode, UncertaintyTable,
    MISSING_LABEL, UNKNOWN_LABEL,
};
