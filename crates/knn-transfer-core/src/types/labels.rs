use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::embedding::index_ids;
use crate::error::{Result, TransferError};

/// Sentinel emitted when a prediction is withheld.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Cell value of a joined column for rows without a match (an empty cell,
/// as a missing value is written in delimited text).
pub const MISSING_LABEL: &str = "";

/// Categorical label columns for a set of reference entities.
///
/// Values are stored column-major so that a whole column can be gathered for
/// the neighbors of a query row without touching the others.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    ids: Vec<String>,
    positions: HashMap<String, usize>,
    columns: Vec<String>,
    values: Vec<Vec<String>>,
}

impl LabelTable {
    /// Builds a table from entity identifiers and named columns.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::LengthMismatch` if a column has a different
    /// length than `ids`, `TransferError::DuplicateEntity` on repeated ids and
    /// `TransferError::DuplicateColumn` on repeated column names.
    pub fn from_columns(ids: Vec<String>, columns: Vec<(String, Vec<String>)>) -> Result<Self> {
        let positions = index_ids(&ids)?;
        let mut names = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());

        for (name, column) in columns {
            if column.len() != ids.len() {
                return Err(TransferError::LengthMismatch {
                    what: "label column",
                    ids: ids.len(),
                    rows: column.len(),
                });
            }
            if names.contains(&name) {
                return Err(TransferError::DuplicateColumn(name));
            }
            names.push(name);
            values.push(column);
        }

        Ok(Self {
            ids,
            positions,
            columns: names,
            values,
        })
    }

    /// Builds a table from a header and `(id, values)` rows.
    ///
    /// # Errors
    ///
    /// Same as [`LabelTable::from_columns`]; a row with the wrong number of
    /// values is reported as `TransferError::LengthMismatch`.
    pub fn from_rows(columns: Vec<String>, rows: Vec<(String, Vec<String>)>) -> Result<Self> {
        let mut ids = Vec::with_capacity(rows.len());
        let mut values: Vec<Vec<String>> = vec![Vec::with_capacity(rows.len()); columns.len()];

        for (id, row) in rows {
            if row.len() != columns.len() {
                return Err(TransferError::LengthMismatch {
                    what: "label row",
                    ids: columns.len(),
                    rows: row.len(),
                });
            }
            for (column, value) in values.iter_mut().zip(row) {
                column.push(value);
            }
            ids.push(id);
        }

        Self::from_columns(ids, columns.into_iter().zip(values).collect())
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Row position of an entity.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// All values of a column, in row order.
    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.column_index(name).map(|c| self.values[c].as_slice())
    }

    /// Label of `id` in column `name`.
    pub fn get(&self, id: &str, name: &str) -> Option<&str> {
        let row = self.position(id)?;
        let col = self.column_index(name)?;
        Some(self.values[col][row].as_str())
    }

    /// Names of the columns matched by `selector`, in table order.
    pub fn select_columns(&self, selector: &LabelSelector) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| selector.matches(c))
            .map(String::as_str)
            .collect()
    }

    /// Identifiers of the rows whose `column` equals `value`, in row order.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::MissingColumn` if the column does not exist.
    pub fn filter_eq(&self, column: &str, value: &str) -> Result<Vec<String>> {
        let values = self.column(column).ok_or_else(|| TransferError::MissingColumn {
            column: column.to_string(),
        })?;
        Ok(self
            .ids
            .iter()
            .zip(values)
            .filter(|(_, v)| v.as_str() == value)
            .map(|(id, _)| id.clone())
            .collect())
    }

    /// Left-joins `other` onto this table, matching the values of column `on`
    /// against the identifiers of `other`.
    ///
    /// Every column of `other` is appended. Rows whose key has no match in
    /// `other` receive [`MISSING_LABEL`] in the appended columns.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::MissingColumn` if `on` is not a column of this
    /// table and `TransferError::DuplicateColumn` if both tables share a
    /// column name.
    pub fn join_on(&self, other: &LabelTable, on: &str) -> Result<Self> {
        let keys = self.column(on).ok_or_else(|| TransferError::MissingColumn {
            column: on.to_string(),
        })?;
        let matches: Vec<Option<usize>> = keys.iter().map(|k| other.position(k)).collect();

        let unmatched = matches.iter().filter(|m| m.is_none()).count();
        if unmatched > 0 {
            tracing::warn!(
                "{unmatched} of {} rows have no match for join key {on:?}",
                self.len()
            );
        }

        let mut columns: Vec<(String, Vec<String>)> = self
            .columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect();

        for (name, values) in other.columns.iter().zip(&other.values) {
            let joined = matches
                .iter()
                .map(|m| match m {
                    Some(row) => values[*row].clone(),
                    None => MISSING_LABEL.to_string(),
                })
                .collect();
            columns.push((name.clone(), joined));
        }

        Self::from_columns(self.ids.clone(), columns)
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Selects the label columns a transfer predicts.
#[derive(Debug, Clone)]
pub enum LabelSelector {
    /// Every column whose name starts with the prefix (hierarchical levels
    /// such as `ann_level_1`..`ann_level_5` share a prefix).
    Prefix(String),
    /// Every column whose name matches the regular expression.
    Pattern(Regex),
}

impl LabelSelector {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    /// # Errors
    ///
    /// Returns `TransferError::InvalidPattern` if the expression does not compile.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(Self::Pattern(Regex::new(pattern)?))
    }

    pub fn matches(&self, column: &str) -> bool {
        match self {
            Self::Prefix(prefix) => column.starts_with(prefix.as_str()),
            Self::Pattern(re) => re.is_match(column),
        }
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix(prefix) => write!(f, "prefix {prefix:?}"),
            Self::Pattern(re) => write!(f, "pattern /{}/", re.as_str()),
        }
    }
}

/// A transferred label, or the abstention sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PredictedLabel {
    Label(String),
    Unknown,
}

impl PredictedLabel {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Label(label) => label,
            Self::Unknown => UNKNOWN_LABEL,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<String> for PredictedLabel {
    fn from(s: String) -> Self {
        if s == UNKNOWN_LABEL {
            Self::Unknown
        } else {
            Self::Label(s)
        }
    }
}

impl From<PredictedLabel> for String {
    fn from(label: PredictedLabel) -> Self {
        match label {
            PredictedLabel::Label(label) => label,
            PredictedLabel::Unknown => UNKNOWN_LABEL.to_string(),
        }
    }
}

impl fmt::Display for PredictedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
