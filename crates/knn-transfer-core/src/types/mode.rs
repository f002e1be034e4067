use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TransferError;

/// How the uncertainty of a prediction is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UncertaintyMode {
    /// `1 - P(predicted label)`.
    #[default]
    Package,
    /// `1 - P(true label)`; needs ground truth for the query and is not implemented.
    Paper,
}

impl UncertaintyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Paper => "paper",
        }
    }

    /// Resolves a mode selector to a mode the engine can compute.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::UnsupportedMode` for `"paper"` and for any
    /// unrecognised selector.
    pub fn resolve(selector: &str) -> Result<Self, TransferError> {
        match selector.parse::<Self>()? {
            Self::Package => Ok(Self::Package),
            other => Err(TransferError::UnsupportedMode(other.as_str().to_string())),
        }
    }
}

impl FromStr for UncertaintyMode {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "package" => Ok(Self::Package),
            "paper" => Ok(Self::Paper),
            other => Err(TransferError::UnsupportedMode(other.to_string())),
        }
    }
}

impl fmt::Display for UncertaintyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
