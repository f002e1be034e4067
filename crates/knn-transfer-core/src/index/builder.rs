use tracing::{debug, info};

use super::exact::ExactIndex;
use crate::error::{Result, TransferError};
use crate::types::{Dataset, EmbeddingSelector};

/// Default number of neighbors consulted per query row.
pub const DEFAULT_N_NEIGHBORS: usize = 50;

/// Configuration for fitting a neighbor index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Number of neighbors returned per query row.
    pub n_neighbors: usize,
    /// Which embedding of the reference dataset to index.
    pub embedding: EmbeddingSelector,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            n_neighbors: DEFAULT_N_NEIGHBORS,
            embedding: EmbeddingSelector::Primary,
        }
    }
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_neighbors(mut self, k: usize) -> Self {
        self.n_neighbors = k;
        self
    }

    pub fn with_embedding(mut self, embedding: impl Into<EmbeddingSelector>) -> Self {
        self.embedding = embedding.into();
        self
    }
}

/// Fits exact Euclidean neighbor indices over reference datasets.
#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    config: IndexConfig,
}

impl IndexBuilder {
    pub fn new(config: IndexConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Fits an index over the configured embedding of `reference`.
    ///
    /// The embedding rows are copied into the index, so the dataset can be
    /// dropped afterwards.
    ///
    /// # Errors
    ///
    /// - `TransferError::InvalidEmbeddingSelector` if the named embedding does not exist.
    /// - `TransferError::EmptyInput` if the reference has no rows.
    /// - `TransferError::InvalidNeighborCount` unless `1 <= k <= reference rows`.
    ///
    /// # Examples
    ///
    /// ```
    /// use knn_transfer_core::{Dataset, EmbeddingMatrix, IndexBuilder, IndexConfig, NeighborSearch};
    ///
    /// let x = EmbeddingMatrix::from_rows(vec![vec![0.0], vec![1.0], vec![10.0]]).unwrap();
    /// let reference = Dataset::new(vec!["a".into(), "b".into(), "c".into()], x).unwrap();
    ///
    /// let index = IndexBuilder::new(IndexConfig::new().with_n_neighbors(2))
    ///     .fit(&reference)
    ///     .unwrap();
    /// assert_eq!(index.n_neighbors(), 2);
    /// ```
    pub fn fit(&self, reference: &Dataset) -> Result<ExactIndex> {
        let k = self.config.n_neighbors;
        info!("Weighted KNN with n_neighbors = {k}");

        let embedding = reference.embedding(&self.config.embedding)?;
        if embedding.is_empty() {
            return Err(TransferError::EmptyInput("reference embedding"));
        }
        if k == 0 || k > embedding.n_rows() {
            return Err(TransferError::InvalidNeighborCount {
                k,
                n_reference: embedding.n_rows(),
            });
        }

        debug!(
            "Indexing embedding {} ({} rows x {} features)",
            self.config.embedding,
            embedding.n_rows(),
            embedding.n_features()
        );

        Ok(ExactIndex::new(
            embedding.clone(),
            reference.ids().to_vec(),
            k,
            self.config.embedding.clone(),
        ))
    }
}

/// Fits an index with `k` neighbors over the selected embedding of `reference`.
pub fn fit(reference: &Dataset, embedding: impl Into<EmbeddingSelector>, k: usize) -> Result<ExactIndex> {
    let config = IndexConfig::new().with_n_neighbors(k).with_embedding(embedding);
    IndexBuilder::new(config).fit(reference)
}
