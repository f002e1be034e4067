//! Loading embeddings, datasets and label tables from delimited text.
//!
//! Every file starts with a header line. The first column holds entity
//! identifiers; for embeddings the remaining columns are numeric features,
//! for label tables they are categorical labels.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use knn_transfer_core::{Dataset, EmbeddingMatrix, LabelTable};
use tracing::{debug, info};

use crate::delimited::{self, Delimiter};
use crate::error::{IoError, Result};

/// An embedding matrix together with the identifiers of its rows.
#[derive(Debug, Clone)]
pub struct IdentifiedMatrix {
    pub ids: Vec<String>,
    pub matrix: EmbeddingMatrix,
}

/// Reads an embedding file (`.gz` is decompressed, `.tsv` is tab separated).
pub fn read_embedding(path: impl AsRef<Path>) -> Result<IdentifiedMatrix> {
    let path = path.as_ref();
    let reader = delimited::open(path)?;
    read_embedding_from(reader, Delimiter::from_path(path), path)
}

/// Reads an embedding from any buffered reader; `source` names it in errors.
pub fn read_embedding_from<R: BufRead>(
    reader: R,
    delimiter: Delimiter,
    source: &Path,
) -> Result<IdentifiedMatrix> {
    let records = delimited::read_records(reader, delimiter, source)?;
    let n_features = records.header.len().saturating_sub(1);

    let mut ids = Vec::with_capacity(records.rows.len());
    let mut data = Vec::with_capacity(records.rows.len() * n_features);

    for (line, fields) in records.rows {
        let mut fields = fields.into_iter();
        ids.push(fields.next().unwrap_or_default());
        for (col, field) in fields.enumerate() {
            let value: f64 = field.trim().parse().map_err(|_| {
                IoError::malformed(
                    source,
                    line,
                    format!("column {}: {field:?} is not a number", col + 2),
                )
            })?;
            data.push(value);
        }
    }

    let n_rows = ids.len();
    let matrix = EmbeddingMatrix::from_flat(data, n_rows, n_features)?;
    debug!(
        "Read {} rows x {} features from {}",
        n_rows,
        n_features,
        source.display()
    );
    Ok(IdentifiedMatrix { ids, matrix })
}

/// Reads a label table file.
pub fn read_label_table(path: impl AsRef<Path>) -> Result<LabelTable> {
    let path = path.as_ref();
    let reader = delimited::open(path)?;
    read_label_table_from(reader, Delimiter::from_path(path), path)
}

/// Reads a label table from any buffered reader; `source` names it in errors.
pub fn read_label_table_from<R: BufRead>(
    reader: R,
    delimiter: Delimiter,
    source: &Path,
) -> Result<LabelTable> {
    let records = delimited::read_records(reader, delimiter, source)?;
    let columns: Vec<String> = records.header.into_iter().skip(1).collect();

    let rows = records
        .rows
        .into_iter()
        .map(|(_, fields)| {
            let mut fields = fields.into_iter();
            let id = fields.next().unwrap_or_default();
            (id, fields.collect())
        })
        .collect();

    let table = LabelTable::from_rows(columns, rows)?;
    debug!(
        "Read label table with {} rows and columns {:?} from {}",
        table.len(),
        table.columns(),
        source.display()
    );
    Ok(table)
}

/// Assembles a [`Dataset`] from a primary matrix file and auxiliary embedding files.
///
/// Auxiliary files may list entities in any order; rows are matched to the
/// primary matrix by identifier.
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    x: PathBuf,
    embeddings: Vec<(String, PathBuf)>,
}

impl DatasetLoader {
    pub fn new(x: impl Into<PathBuf>) -> Self {
        Self {
            x: x.into(),
            embeddings: Vec::new(),
        }
    }

    /// Adds a named auxiliary embedding.
    pub fn with_embedding(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.embeddings.push((name.into(), path.into()));
        self
    }

    pub fn load(&self) -> Result<Dataset> {
        let primary = read_embedding(&self.x)?;
        let mut dataset = Dataset::new(primary.ids, primary.matrix)?;

        for (name, path) in &self.embeddings {
            let aux = read_embedding(path)?;
            let matrix = align_rows(&dataset, aux, path)?;
            dataset = dataset.with_embedding(name.clone(), matrix)?;
        }

        info!(
            "Loaded dataset {} with {} entities and embeddings {:?}",
            self.x.display(),
            dataset.len(),
            dataset.embedding_names().collect::<Vec<_>>()
        );
        Ok(dataset)
    }
}

/// Reorders the rows of `aux` to follow the entity order of `dataset`.
fn align_rows(dataset: &Dataset, aux: IdentifiedMatrix, path: &Path) -> Result<EmbeddingMatrix> {
    if aux.ids.as_slice() == dataset.ids() {
        return Ok(aux.matrix);
    }

    let positions: HashMap<&str, usize> = aux
        .ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let rows = dataset
        .ids()
        .iter()
        .map(|id| {
            positions
                .get(id.as_str())
                .copied()
                .ok_or_else(|| IoError::MissingEntity {
                    path: path.to_path_buf(),
                    id: id.clone(),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(aux.matrix.select_rows(&rows))
}
