//! # knn-transfer
//!
//! Transfers categorical annotations from a labeled reference dataset to a
//! query dataset embedded in the same space, using weighted k-nearest-neighbor
//! voting with a per-query adaptive kernel and per-prediction uncertainty.
//!
//! This crate bundles the algorithmic core ([`knn_transfer_core`]) and the
//! delimited-text loaders and writers ([`knn_transfer_io`]).
pub use knn_transfer_core;
pub use knn_transfer_io;

pub use knn_transfer_core::{
    fit, transfer, Dataset, EmbeddingMatrix, EmbeddingSelector, ExactIndex, IndexBuilder,
    IndexConfig, LabelSelector, LabelTable, NeighborSearch, PredictedLabel, Result,
    TransferConfig, TransferError, TransferOutput, WeightedKnnTransfer,
};
