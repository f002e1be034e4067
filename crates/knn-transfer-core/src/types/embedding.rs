use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};

/// Name that selects the primary feature matrix of a [`Dataset`].
pub const PRIMARY_EMBEDDING: &str = "X";

/// Dense, row-major matrix of embedding vectors (one row per entity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMatrix {
    data: Vec<f64>,
    n_rows: usize,
    n_features: usize,
}

impl EmbeddingMatrix {
    /// Builds a matrix from owned rows.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::RaggedMatrix` if the rows differ in width and
    /// `TransferError::NonFiniteValue` if any entry is NaN or infinite.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_rows = rows.len();
        let n_features = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_rows * n_features);

        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != n_features {
                return Err(TransferError::RaggedMatrix {
                    row,
                    expected: n_features,
                    found: values.len(),
                });
            }
            data.extend(values);
        }

        Self::from_flat(data, n_rows, n_features)
    }

    /// Builds a matrix from a row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::BufferSizeMismatch` if `data.len() != n_rows * n_features`
    /// and `TransferError::NonFiniteValue` if any entry is NaN or infinite.
    pub fn from_flat(data: Vec<f64>, n_rows: usize, n_features: usize) -> Result<Self> {
        if data.len() != n_rows * n_features {
            return Err(TransferError::BufferSizeMismatch {
                expected: n_rows * n_features,
                found: data.len(),
            });
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            return Err(TransferError::NonFiniteValue {
                row: pos / n_features,
                col: pos % n_features,
            });
        }
        Ok(Self {
            data,
            n_rows,
            n_features,
        })
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Zero-copy view of row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= n_rows()`.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        let start = i * self.n_features;
        &self.data[start..start + self.n_features]
    }

    /// Iterates over rows in order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        (0..self.n_rows).map(move |i| self.row(i))
    }

    /// Copies the given rows, in the given order, into a new matrix.
    ///
    /// # Panics
    ///
    /// Panics if any index is out of bounds.
    #[must_use]
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.n_features);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Self {
            data,
            n_rows: indices.len(),
            n_features: self.n_features,
        }
    }
}

/// Which embedding of a [`Dataset`] to search in.
///
/// `"X"` parses to [`EmbeddingSelector::Primary`]; every other string names an
/// auxiliary embedding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum EmbeddingSelector {
    /// The dataset's primary feature matrix.
    #[default]
    Primary,
    /// A named auxiliary embedding (e.g. a latent space such as `"X_scvi"`).
    Named(String),
}

impl EmbeddingSelector {
    /// Selector for a named auxiliary embedding.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl FromStr for EmbeddingSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<&str> for EmbeddingSelector {
    fn from(s: &str) -> Self {
        if s == PRIMARY_EMBEDDING {
            Self::Primary
        } else {
            Self::Named(s.to_string())
        }
    }
}

impl fmt::Display for EmbeddingSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "{PRIMARY_EMBEDDING}"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

/// A set of entities with a primary feature matrix and optional auxiliary embeddings.
#[derive(Debug, Clone)]
pub struct Dataset {
    ids: Vec<String>,
    positions: HashMap<String, usize>,
    x: EmbeddingMatrix,
    embeddings: BTreeMap<String, EmbeddingMatrix>,
}

impl Dataset {
    /// Creates a dataset from entity identifiers and the primary matrix.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::LengthMismatch` if the identifier count differs
    /// from the row count and `TransferError::DuplicateEntity` on repeated ids.
    pub fn new(ids: Vec<String>, x: EmbeddingMatrix) -> Result<Self> {
        if ids.len() != x.n_rows() {
            return Err(TransferError::LengthMismatch {
                what: "dataset",
                ids: ids.len(),
                rows: x.n_rows(),
            });
        }
        let positions = index_ids(&ids)?;
        Ok(Self {
            ids,
            positions,
            x,
            embeddings: BTreeMap::new(),
        })
    }

    /// Attaches a named auxiliary embedding with one row per entity.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::LengthMismatch` if the row count differs from
    /// the number of entities.
    pub fn with_embedding(mut self, name: impl Into<String>, matrix: EmbeddingMatrix) -> Result<Self> {
        if matrix.n_rows() != self.len() {
            return Err(TransferError::LengthMismatch {
                what: "auxiliary embedding",
                ids: self.len(),
                rows: matrix.n_rows(),
            });
        }
        self.embeddings.insert(name.into(), matrix);
        Ok(self)
    }

    /// Resolves a selector against this dataset.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidEmbeddingSelector` if a named embedding
    /// does not exist.
    pub fn embedding(&self, selector: &EmbeddingSelector) -> Result<&EmbeddingMatrix> {
        match selector {
            EmbeddingSelector::Primary => Ok(&self.x),
            EmbeddingSelector::Named(name) => {
                self.embeddings
                    .get(name)
                    .ok_or_else(|| TransferError::InvalidEmbeddingSelector { name: name.clone() })
            }
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn x(&self) -> &EmbeddingMatrix {
        &self.x
    }

    /// Names of the auxiliary embeddings, sorted.
    pub fn embedding_names(&self) -> impl Iterator<Item = &str> {
        self.embeddings.keys().map(String::as_str)
    }

    /// Row position of an entity.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Restricts the dataset to the given entities, in the given order.
    ///
    /// All embeddings are subset consistently.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::UnknownEntity` for an identifier that is not
    /// part of the dataset and `TransferError::DuplicateEntity` if an
    /// identifier is requested twice.
    pub fn subset<S: AsRef<str>>(&self, ids: &[S]) -> Result<Self> {
        let rows = ids
            .iter()
            .map(|id| {
                self.position(id.as_ref())
                    .ok_or_else(|| TransferError::UnknownEntity(id.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let ids: Vec<String> = rows.iter().map(|&r| self.ids[r].clone()).collect();
        let positions = index_ids(&ids)?;
        let embeddings = self
            .embeddings
            .iter()
            .map(|(name, m)| (name.clone(), m.select_rows(&rows)))
            .collect();

        Ok(Self {
            ids,
            positions,
            x: self.x.select_rows(&rows),
            embeddings,
        })
    }
}

pub(crate) fn index_ids(ids: &[String]) -> Result<HashMap<String, usize>> {
    let mut positions = HashMap::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        if positions.insert(id.clone(), i).is_some() {
            return Err(TransferError::DuplicateEntity(id.clone()));
        }
    }
    Ok(positions)
}
