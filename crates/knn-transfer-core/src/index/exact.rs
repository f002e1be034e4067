//! # Exact Neighbor Search
//!
//! Brute-force Euclidean k-nearest-neighbor search over a reference embedding.
//! Every query row is compared against every reference row; rows are
//! processed in parallel on the rayon pool.

use std::any::Any;
use std::cmp::Ordering;

use rayon::prelude::*;
use tracing::debug;

use crate::error::{Result, TransferError};
use crate::types::{EmbeddingMatrix, EmbeddingSelector};

/// The k nearest reference rows of every query row.
///
/// Row `i` holds `k` `(distance, reference index)` pairs sorted by ascending
/// distance; equal distances are ordered by reference index.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    k: usize,
    distances: Vec<f64>,
    indices: Vec<usize>,
}

impl Neighbors {
    pub(crate) fn from_rows(k: usize, rows: Vec<Vec<(f64, usize)>>) -> Self {
        let mut distances = Vec::with_capacity(rows.len() * k);
        let mut indices = Vec::with_capacity(rows.len() * k);
        for row in rows {
            debug_assert_eq!(row.len(), k);
            for (d, j) in row {
                distances.push(d);
                indices.push(j);
            }
        }
        Self {
            k,
            distances,
            indices,
        }
    }

    /// Number of neighbors per query row.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of query rows.
    pub fn len(&self) -> usize {
        if self.k == 0 { 0 } else { self.indices.len() / self.k }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distances from query row `i` to its neighbors, ascending.
    pub fn distances(&self, i: usize) -> &[f64] {
        &self.distances[i * self.k..(i + 1) * self.k]
    }

    /// Reference row indices of the neighbors of query row `i`.
    pub fn indices(&self, i: usize) -> &[usize] {
        &self.indices[i * self.k..(i + 1) * self.k]
    }
}

/// A fitted nearest-neighbor search structure over reference embeddings.
///
/// The transfer engine accepts any implementation but only computes with
/// indices produced by [`crate::IndexBuilder`]; others are rejected with
/// `TransferError::TypeMismatch`.
pub trait NeighborSearch: Send + Sync {
    /// Human-readable name of the search algorithm.
    fn kind(&self) -> &str;

    /// Number of neighbors returned per query row.
    fn n_neighbors(&self) -> usize;

    /// Feature width of the indexed embedding.
    fn n_features(&self) -> usize;

    /// Identifiers of the indexed reference rows, in row order.
    fn reference_ids(&self) -> &[String];

    /// Finds the nearest reference rows of every query row.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::DimensionMismatch` if the query width differs
    /// from the indexed width.
    fn kneighbors(&self, query: &EmbeddingMatrix) -> Result<Neighbors>;

    fn as_any(&self) -> &dyn Any;
}

/// Exhaustive Euclidean index. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExactIndex {
    reference: EmbeddingMatrix,
    ids: Vec<String>,
    n_neighbors: usize,
    embedding: EmbeddingSelector,
}

impl ExactIndex {
    pub const KIND: &'static str = "exact-euclidean";

    pub(crate) fn new(
        reference: EmbeddingMatrix,
        ids: Vec<String>,
        n_neighbors: usize,
        embedding: EmbeddingSelector,
    ) -> Self {
        Self {
            reference,
            ids,
            n_neighbors,
            embedding,
        }
    }

    /// The embedding the index was fitted on.
    pub fn embedding(&self) -> &EmbeddingSelector {
        &self.embedding
    }

    /// Number of indexed reference rows.
    pub fn len(&self) -> usize {
        self.reference.n_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    /// Nearest reference rows of a single query vector.
    fn query_row(&self, query: &[f64]) -> Vec<(f64, usize)> {
        let mut candidates: Vec<(f64, usize)> = self
            .reference
            .rows()
            .enumerate()
            .map(|(j, r)| (euclidean(query, r), j))
            .collect();

        let k = self.n_neighbors;
        if k < candidates.len() {
            candidates.select_nth_unstable_by(k - 1, by_distance_then_index);
            candidates.truncate(k);
        }
        candidates.sort_unstable_by(by_distance_then_index);
        candidates
    }
}

impl NeighborSearch for ExactIndex {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    fn n_features(&self) -> usize {
        self.reference.n_features()
    }

    fn reference_ids(&self) -> &[String] {
        &self.ids
    }

    fn kneighbors(&self, query: &EmbeddingMatrix) -> Result<Neighbors> {
        if query.n_features() != self.n_features() {
            return Err(TransferError::DimensionMismatch {
                expected: self.n_features(),
                found: query.n_features(),
            });
        }

        debug!(
            "Searching {} nearest of {} reference rows for {} query rows",
            self.n_neighbors,
            self.len(),
            query.n_rows()
        );

        let rows: Vec<Vec<(f64, usize)>> = (0..query.n_rows())
            .into_par_iter()
            .map(|i| self.query_row(query.row(i)))
            .collect();

        if let Some(row) = rows
            .iter()
            .position(|r| r.iter().any(|(d, _)| !d.is_finite()))
        {
            return Err(TransferError::NonFiniteDistance { row });
        }

        Ok(Neighbors::from_rows(self.n_neighbors, rows))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn by_distance_then_index(a: &(f64, usize), b: &(f64, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

/// Euclidean distance. Falls back to a rescaled sum when the squared sum
/// overflows or underflows, so any representable distance is returned.
#[inline]
fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    if sum.is_finite() && sum >= f64::MIN_POSITIVE {
        return sum.sqrt();
    }
    scaled_euclidean(a, b)
}

#[cold]
fn scaled_euclidean(a: &[f64], b: &[f64]) -> f64 {
    let scale = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0_f64, f64::max);
    if scale == 0.0 || !scale.is_finite() {
        return scale;
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let t = (x - y) / scale;
            t * t
        })
        .sum();
    scale * sum.sqrt()
}
