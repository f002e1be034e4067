//! Label Transfer Tool
//!
//! Fits a weighted KNN classifier on a labeled reference dataset and
//! annotates a query dataset embedded in the same space. Writes predicted
//! labels and uncertainties as CSV (or JSON) tables.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use knn_transfer_core::{
    Dataset, EmbeddingSelector, IndexBuilder, IndexConfig, LabelTable, TransferConfig,
    WeightedKnnTransfer,
};
use knn_transfer_io::{read_label_table, write_outputs, DatasetLoader, OutputFormat};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI arguments
#[derive(Parser)]
#[command(name = "label-transfer")]
#[command(about = "Transfer labels from a reference to a query dataset by weighted KNN")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit on the reference and annotate the query
    Run(RunArgs),
    /// Show which label columns a key or pattern selects
    Inspect {
        /// Reference label table
        #[arg(short, long, env = "KNN_TRANSFER_LABELS")]
        labels: PathBuf,

        /// Label column prefix
        #[arg(long, default_value = "")]
        label_key: String,

        /// Label column regular expression (overrides --label-key)
        #[arg(long)]
        label_pattern: Option<String>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Reference primary matrix (first column: entity id)
    #[arg(short, long, env = "KNN_TRANSFER_REFERENCE")]
    reference: PathBuf,

    /// Reference auxiliary embedding as NAME=PATH (repeatable)
    #[arg(long = "reference-embedding", value_parser = parse_key_value)]
    reference_embeddings: Vec<(String, String)>,

    /// Reference label table
    #[arg(short, long, env = "KNN_TRANSFER_LABELS")]
    labels: PathBuf,

    /// Annotation table joined onto the reference labels
    #[arg(long, requires = "join_on")]
    annotations: Option<PathBuf>,

    /// Reference label column matched against the annotation table ids
    #[arg(long)]
    join_on: Option<String>,

    /// Keep only reference entities whose label column equals a value (COLUMN=VALUE)
    #[arg(long, value_parser = parse_key_value)]
    reference_filter: Option<(String, String)>,

    /// Query primary matrix
    #[arg(short, long, env = "KNN_TRANSFER_QUERY")]
    query: PathBuf,

    /// Query auxiliary embedding as NAME=PATH (repeatable)
    #[arg(long = "query-embedding", value_parser = parse_key_value)]
    query_embeddings: Vec<(String, String)>,

    /// Query metadata table used by --query-filter
    #[arg(long, requires = "query_filter")]
    query_metadata: Option<PathBuf>,

    /// Keep only query entities whose metadata column equals a value (COLUMN=VALUE)
    #[arg(long, value_parser = parse_key_value, requires = "query_metadata")]
    query_filter: Option<(String, String)>,

    /// Embedding used for neighbor search ("X" for the primary matrix)
    #[arg(short, long, default_value = "X")]
    embedding: String,

    /// Number of nearest neighbors
    #[arg(short = 'k', long, default_value_t = 50)]
    n_neighbors: usize,

    /// JSON file with transfer settings; flags override it
    #[arg(short, long, env = "KNN_TRANSFER_CONFIG")]
    config: Option<PathBuf>,

    /// Label column prefix
    #[arg(long)]
    label_key: Option<String>,

    /// Label column regular expression (overrides --label-key)
    #[arg(long)]
    label_pattern: Option<String>,

    /// Minimum winning weight share to keep a prediction
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Annotate low-confidence predictions as "Unknown" (`--pred-unknown false` overrides the config)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pred_unknown: Option<bool>,

    /// Uncertainty mode
    #[arg(long)]
    mode: Option<String>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Output file name prefix (defaults to the query file stem)
    #[arg(short, long)]
    name: Option<String>,

    /// Output format: csv or json
    #[arg(short, long, default_value = "csv")]
    format: OutputFormat,
}

impl RunArgs {
    /// Transfer settings from the optional config file, overridden by flags.
    fn transfer_config(&self) -> Result<TransferConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                TransferConfig::from_json(&json)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => TransferConfig::default(),
        };

        if let Some(key) = &self.label_key {
            config.label_key = key.clone();
        }
        if let Some(pattern) = &self.label_pattern {
            config.label_pattern = Some(pattern.clone());
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(pred_unknown) = self.pred_unknown {
            config.pred_unknown = pred_unknown;
        }
        if let Some(mode) = &self.mode {
            config.mode = mode.clone();
        }
        Ok(config)
    }

    fn output_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| file_stem(&self.query))
    }
}

/// Parses `KEY=VALUE`.
fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

/// File name without directory and without `.gz`/`.csv`/`.tsv` extensions.
fn file_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "query".to_string());
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    let name = [".csv", ".tsv", ".tab"]
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(name);
    name.to_string()
}

fn load_dataset(x: &Path, embeddings: &[(String, String)]) -> Result<Dataset> {
    let loader = embeddings
        .iter()
        .fold(DatasetLoader::new(x), |loader, (name, path)| {
            loader.with_embedding(name.clone(), path)
        });
    loader
        .load()
        .with_context(|| format!("Failed to load dataset {}", x.display()))
}

/// Restricts `dataset` to the entities whose `column` in `table` equals `value`.
fn filter_dataset(dataset: &Dataset, table: &LabelTable, (column, value): &(String, String)) -> Result<Dataset> {
    let mut ids = table.filter_eq(column, value)?;
    ids.retain(|id| dataset.position(id).is_some());
    if ids.is_empty() {
        anyhow::bail!("No entities with {column} = {value:?}");
    }
    info!("Keeping {} of {} entities with {column} = {value:?}", ids.len(), dataset.len());
    Ok(dataset.subset(&ids)?)
}

fn run(args: RunArgs) -> Result<()> {
    let config = args.transfer_config()?;

    let mut reference = load_dataset(&args.reference, &args.reference_embeddings)?;
    let mut labels = read_label_table(&args.labels)
        .with_context(|| format!("Failed to read labels {}", args.labels.display()))?;

    if let (Some(path), Some(on)) = (&args.annotations, &args.join_on) {
        let annotations = read_label_table(path)
            .with_context(|| format!("Failed to read annotations {}", path.display()))?;
        labels = labels
            .join_on(&annotations, on)
            .with_context(|| format!("Failed to join annotations on {on:?}"))?;
    }

    if let Some(filter) = &args.reference_filter {
        reference = filter_dataset(&reference, &labels, filter)?;
    }

    let mut query = load_dataset(&args.query, &args.query_embeddings)?;
    if let (Some(path), Some(filter)) = (&args.query_metadata, &args.query_filter) {
        let metadata = read_label_table(path)
            .with_context(|| format!("Failed to read query metadata {}", path.display()))?;
        query = filter_dataset(&query, &metadata, filter)?;
    }

    let selector = EmbeddingSelector::from(args.embedding.as_str());
    let index = IndexBuilder::new(
        IndexConfig::new()
            .with_n_neighbors(args.n_neighbors)
            .with_embedding(selector.clone()),
    )
    .fit(&reference)
    .context("Failed to fit neighbor index")?;

    let output = WeightedKnnTransfer::new(config)
        .transfer(&index, &query, &selector, &labels)
        .context("Label transfer failed")?;

    write_outputs(&args.out_dir, &args.output_name(), &output, args.format)
        .context("Failed to write results")?;
    Ok(())
}

fn inspect(labels: &Path, label_key: String, label_pattern: Option<String>) -> Result<()> {
    let table = read_label_table(labels)
        .with_context(|| format!("Failed to read labels {}", labels.display()))?;

    let mut config = TransferConfig::new().with_label_key(label_key);
    config.label_pattern = label_pattern;
    let selector = config.label_selector()?;

    let columns: BTreeMap<&str, usize> = table
        .select_columns(&selector)
        .into_iter()
        .map(|name| {
            let mut distinct: Vec<&String> = table.column(name).unwrap_or_default().iter().collect();
            distinct.sort_unstable();
            distinct.dedup();
            (name, distinct.len())
        })
        .collect();

    let summary = serde_json::json!({
        "entities": table.len(),
        "selector": selector.to_string(),
        "columns": columns,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Inspect {
            labels,
            label_key,
            label_pattern,
        } => inspect(&labels, label_key, label_pattern),
    }
}
