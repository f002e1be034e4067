use serde::{Deserialize, Serialize};

use super::labels::PredictedLabel;

/// A dense table indexed by query entity (rows) and label column (columns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable<T> {
    index: Vec<String>,
    columns: Vec<String>,
    values: Vec<T>,
}

/// Predicted label per query entity and label column.
pub type PredictionTable = ResultTable<PredictedLabel>;

/// Uncertainty in `[0.0, 1.0]` per query entity and label column.
pub type UncertaintyTable = ResultTable<f64>;

impl<T> ResultTable<T> {
    /// Assembles a table from row-major values.
    ///
    /// # Panics
    ///
    /// Panics if `values.len() != index.len() * columns.len()`.
    pub(crate) fn from_row_major(index: Vec<String>, columns: Vec<String>, values: Vec<T>) -> Self {
        assert_eq!(values.len(), index.len() * columns.len(), "table shape mismatch");
        Self {
            index,
            columns,
            values,
        }
    }

    /// Row identifiers (query entity ids).
    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// # Panics
    ///
    /// Panics if `row` or `col` is out of bounds.
    pub fn get(&self, row: usize, col: usize) -> &T {
        assert!(col < self.columns.len(), "column {col} out of bounds");
        &self.values[row * self.columns.len() + col]
    }

    /// Values of row `row`, one per column.
    pub fn row(&self, row: usize) -> &[T] {
        let width = self.columns.len();
        &self.values[row * width..(row + 1) * width]
    }

    pub fn rows(&self) -> impl Iterator<Item = (&str, &[T])> + '_ {
        self.index
            .iter()
            .enumerate()
            .map(move |(i, id)| (id.as_str(), self.row(i)))
    }

    /// Cell lookup by entity id and column name.
    pub fn value(&self, id: &str, column: &str) -> Option<&T> {
        let row = self.index.iter().position(|i| i == id)?;
        let col = self.columns.iter().position(|c| c == column)?;
        Some(self.get(row, col))
    }

    /// All values of one column, in row order.
    pub fn column(&self, column: &str) -> Option<Vec<&T>> {
        let col = self.columns.iter().position(|c| c == column)?;
        Some((0..self.n_rows()).map(|row| self.get(row, col)).collect())
    }
}

/// The two tables produced by a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOutput {
    pub predictions: PredictionTable,
    pub uncertainties: UncertaintyTable,
}
