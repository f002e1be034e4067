use thiserror::Error;

/// Errors that can occur while fitting a neighbor index or transferring labels.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The requested embedding is neither the primary matrix nor a named
    /// auxiliary embedding of the dataset.
    #[error(
        "embedding {name:?} not found: use \"X\" for the primary matrix or the name of an auxiliary embedding"
    )]
    InvalidEmbeddingSelector {
        /// The embedding name that could not be resolved.
        name: String,
    },

    /// The supplied neighbor index was not produced by [`crate::IndexBuilder`].
    #[error("neighbor index type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The index kind the transfer engine accepts.
        expected: String,
        /// The index kind that was supplied.
        found: String,
    },

    /// The uncertainty mode is not implemented.
    #[error("unsupported uncertainty mode: {0:?} (only \"package\" is implemented)")]
    UnsupportedMode(String),

    /// `k` is zero or larger than the reference set.
    #[error("invalid neighbor count k={k} for a reference set of {n_reference} rows")]
    InvalidNeighborCount {
        /// Requested number of neighbors.
        k: usize,
        /// Number of reference rows available.
        n_reference: usize,
    },

    /// Query and reference feature widths differ.
    #[error("feature width mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Feature width of the reference embedding.
        expected: usize,
        /// Feature width of the offending matrix.
        found: usize,
    },

    /// A row of an embedding matrix has the wrong number of features.
    #[error("ragged matrix: row {row} has {found} features, expected {expected}")]
    RaggedMatrix {
        /// Offending row index.
        row: usize,
        /// Width established by the first row.
        expected: usize,
        /// Width of the offending row.
        found: usize,
    },

    /// An embedding entry is NaN or infinite.
    #[error("non-finite value at row {row}, column {col}")]
    NonFiniteValue {
        /// Row of the offending entry.
        row: usize,
        /// Column of the offending entry.
        col: usize,
    },

    /// A flat embedding buffer does not hold `n_rows * n_features` values.
    #[error("embedding buffer holds {found} values, expected {expected}")]
    BufferSizeMismatch {
        /// `n_rows * n_features`.
        expected: usize,
        /// Length of the supplied buffer.
        found: usize,
    },

    /// A query-to-reference distance is not representable as a finite `f64`.
    #[error("distance from query row {row} to a reference row overflows")]
    NonFiniteDistance {
        /// Query row whose distances overflowed.
        row: usize,
    },

    /// A required input has no rows.
    #[error("{0} is empty")]
    EmptyInput(&'static str),

    /// The number of identifiers does not match the number of rows.
    #[error("{what}: {ids} identifiers for {rows} rows")]
    LengthMismatch {
        /// What was being assembled.
        what: &'static str,
        /// Number of identifiers supplied.
        ids: usize,
        /// Number of rows supplied.
        rows: usize,
    },

    /// The same entity identifier appears twice.
    #[error("duplicate entity identifier: {0:?}")]
    DuplicateEntity(String),

    /// An identifier does not name any entity of the dataset.
    #[error("unknown entity identifier: {0:?}")]
    UnknownEntity(String),

    /// A reference entity used by the index has no row in the label table.
    #[error("reference entity {id:?} has no row in the label table")]
    MissingReferenceLabels {
        /// Identifier of the unlabeled reference entity.
        id: String,
    },

    /// A column referenced by name does not exist in the label table.
    #[error("label table has no column {column:?}")]
    MissingColumn {
        /// The column that was requested.
        column: String,
    },

    /// Two label tables being joined share a column name.
    #[error("duplicate label column: {0:?}")]
    DuplicateColumn(String),

    /// A label-selection pattern failed to compile.
    #[error("invalid label pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A configuration document could not be decoded.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type alias for label transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;
