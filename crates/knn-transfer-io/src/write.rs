//! Persisting transfer results.

use std::fmt::Display;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use knn_transfer_core::{ResultTable, TransferOutput};
use tracing::info;

use crate::delimited::{escape_field, Delimiter};
use crate::error::{IoError, Result};

/// On-disk layout of transfer results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// `<name>_labels.csv` and `<name>_uncert.csv`.
    #[default]
    Csv,
    /// A single `<name>_transfer.json` holding both tables.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format {other:?} (expected csv or json)")),
        }
    }
}

/// Writes a table as delimited text.
///
/// The layout matches what pandas writes for a DataFrame: the header starts
/// with an empty cell above the row identifiers.
pub fn write_table_to<W: Write, T: Display>(
    mut writer: W,
    table: &ResultTable<T>,
    delimiter: Delimiter,
) -> std::io::Result<()> {
    let sep = delimiter.as_char().to_string();

    let header: Vec<String> = std::iter::once(String::new())
        .chain(table.columns().iter().map(|c| escape_field(c, delimiter)))
        .collect();
    writeln!(writer, "{}", header.join(&sep))?;

    for (id, row) in table.rows() {
        let fields: Vec<String> = std::iter::once(escape_field(id, delimiter))
            .chain(row.iter().map(|v| escape_field(&v.to_string(), delimiter)))
            .collect();
        writeln!(writer, "{}", fields.join(&sep))?;
    }
    writer.flush()
}

/// Writes a table to `path`; the delimiter follows the file extension.
pub fn write_table<T: Display>(path: impl AsRef<Path>, table: &ResultTable<T>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| IoError::io(path, e))?;
    write_table_to(BufWriter::new(file), table, Delimiter::from_path(path))
        .map_err(|e| IoError::io(path, e))
}

/// Writes both tables as one pretty-printed JSON document.
pub fn write_json(path: impl AsRef<Path>, output: &TransferOutput) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| IoError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, output)?;
    writer.flush().map_err(|e| IoError::io(path, e))
}

/// Writes the result of transferring labels to the query set `name` into
/// `out_dir`, creating the directory if needed. Returns the written paths.
pub fn write_outputs(
    out_dir: impl AsRef<Path>,
    name: &str,
    output: &TransferOutput,
    format: OutputFormat,
) -> Result<Vec<PathBuf>> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir).map_err(|e| IoError::io(out_dir, e))?;

    let paths = match format {
        OutputFormat::Csv => {
            let labels = out_dir.join(format!("{name}_labels.csv"));
            let uncert = out_dir.join(format!("{name}_uncert.csv"));
            write_table(&labels, &output.predictions)?;
            write_table(&uncert, &output.uncertainties)?;
            vec![labels, uncert]
        }
        OutputFormat::Json => {
            let path = out_dir.join(format!("{name}_transfer.json"));
            write_json(&path, output)?;
            vec![path]
        }
    };

    for path in &paths {
        info!("Wrote {}", path.display());
    }
    Ok(paths)
}
