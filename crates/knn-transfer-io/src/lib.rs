//! # knn-transfer I/O
//!
//! Loads reference and query data from delimited text files (optionally
//! gzip-compressed) and persists transfer results as CSV tables or JSON.
//!
//! ```no_run
//! use knn_transfer_io::{read_label_table, write_outputs, DatasetLoader, OutputFormat};
//! use knn_transfer_core::{fit, transfer, EmbeddingSelector, TransferConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let reference = DatasetLoader::new("ref_X.csv.gz")
//!     .with_embedding("X_scvi", "ref_scvi.csv")
//!     .load()?;
//! let labels = read_label_table("ref_obs.csv")?;
//! let query = DatasetLoader::new("query_X.csv").load()?;
//!
//! let index = fit(&reference, "X", 50)?;
//! let config = TransferConfig::new().with_label_key("ann_level");
//! let out = transfer(&index, &query, &EmbeddingSelector::Primary, &labels, config)?;
//! write_outputs("results", "query", &out, OutputFormat::Csv)?;
//! # Ok(())
//! # }
//! ```
pub mod delimited;
pub mod error;
pub mod read;
pub mod write;

pub use delimited::Delimiter;
pub use error::{IoError, Result};
pub use read::{
    read_embedding, read_embedding_from, read_label_table, read_label_table_from, DatasetLoader,
    IdentifiedMatrix,
};
pub use write::{write_json, write_outputs, write_table, write_table_to, OutputFormat};
