//! # Weighted Transfer Engine
//!
//! Annotates query entities with labels borrowed from their nearest reference
//! neighbors. For each query row the neighbor distances are turned into
//! weights by the adaptive kernel, weights are summed per label, and the
//! heaviest label becomes the prediction. The uncertainty of a prediction is
//! the weight share that did *not* go to the winning label.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::kernel::WeightMatrix;
use super::vote::{uncertainty, weighted_vote};
use crate::error::{Result, TransferError};
use crate::index::{ExactIndex, NeighborSearch, Neighbors};
use crate::types::{
    Dataset, EmbeddingSelector, LabelSelector, LabelTable, PredictedLabel, ResultTable,
    TransferOutput, UncertaintyMode,
};

/// Configuration for a label transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Every reference label column whose name starts with this key is transferred.
    pub label_key: String,
    /// Regular expression selecting label columns; takes precedence over `label_key`.
    pub label_pattern: Option<String>,
    /// Minimum winning weight share to keep a prediction when `pred_unknown` is set.
    /// A threshold of 1 or more never abstains.
    pub threshold: f64,
    /// Replace low-confidence predictions by `"Unknown"`.
    pub pred_unknown: bool,
    /// Uncertainty mode selector; only `"package"` is implemented.
    pub mode: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            label_key: String::new(),
            label_pattern: None,
            threshold: 1.0,
            pred_unknown: false,
            mode: UncertaintyMode::Package.to_string(),
        }
    }
}

impl TransferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a configuration from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Config` if the document is not valid.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_label_key(mut self, key: impl Into<String>) -> Self {
        self.label_key = key.into();
        self
    }

    pub fn with_label_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.label_pattern = Some(pattern.into());
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_pred_unknown(mut self, enabled: bool) -> Self {
        self.pred_unknown = enabled;
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    /// The column selector described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidPattern` if `label_pattern` does not compile.
    pub fn label_selector(&self) -> Result<LabelSelector> {
        match &self.label_pattern {
            Some(pattern) => LabelSelector::pattern(pattern),
            None => Ok(LabelSelector::prefix(self.label_key.as_str())),
        }
    }

    /// Whether a prediction with weight share `prob` is withheld.
    pub fn abstains(&self, prob: f64) -> bool {
        self.pred_unknown && self.threshold < 1.0 && prob < self.threshold
    }
}

/// Weighted k-nearest-neighbor label transfer.
#[derive(Debug, Clone, Default)]
pub struct WeightedKnnTransfer {
    config: TransferConfig,
}

impl WeightedKnnTransfer {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Annotates every query entity for every selected reference label column.
    ///
    /// The index must have been fitted on the same embedding space the
    /// `embedding` selector picks from `query`.
    ///
    /// # Errors
    ///
    /// - `TransferError::TypeMismatch` if `index` was not built by [`crate::IndexBuilder`].
    /// - `TransferError::UnsupportedMode` if the mode is not `"package"`.
    /// - `TransferError::InvalidEmbeddingSelector` if the query lacks the embedding.
    /// - `TransferError::DimensionMismatch` if query and reference widths differ.
    /// - `TransferError::MissingReferenceLabels` if an indexed reference entity
    ///   has no row in `labels`.
    ///
    /// All validation happens before any row is processed; on error no output
    /// is produced.
    pub fn transfer(
        &self,
        index: &dyn NeighborSearch,
        query: &Dataset,
        embedding: &EmbeddingSelector,
        labels: &LabelTable,
    ) -> Result<TransferOutput> {
        let index = exact_index(index)?;
        UncertaintyMode::resolve(&self.config.mode)?;
        let query_emb = query.embedding(embedding)?;
        let selector = self.config.label_selector()?;

        let columns: Vec<String> = labels
            .select_columns(&selector)
            .into_iter()
            .map(str::to_string)
            .collect();
        if columns.is_empty() {
            warn!("No label columns match {selector}; output tables will have no columns");
        }

        let reference_labels = align_labels(index, labels, &columns)?;

        info!(
            "Transferring {} label column(s) to {} query rows from {} reference rows (k={})",
            columns.len(),
            query.len(),
            index.len(),
            index.n_neighbors()
        );

        let neighbors = index.kneighbors(query_emb)?;
        let weights = WeightMatrix::from_neighbors(&neighbors);

        let cells: Vec<(PredictedLabel, f64)> = (0..neighbors.len())
            .into_par_iter()
            .map(|i| self.annotate_row(&neighbors, &weights, &reference_labels, i))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        let (predictions, uncertainties): (Vec<_>, Vec<_>) = cells.into_iter().unzip();
        let n_unknown = predictions.iter().filter(|p| p.is_unknown()).count();
        debug!("{n_unknown} predictions withheld as Unknown");

        let ids = query.ids().to_vec();
        let output = TransferOutput {
            predictions: ResultTable::from_row_major(ids.clone(), columns.clone(), predictions),
            uncertainties: ResultTable::from_row_major(ids, columns, uncertainties),
        };

        info!("Label transfer finished");
        Ok(output)
    }

    /// Neighbors and normalised kernel weights of every query row.
    ///
    /// # Errors
    ///
    /// Same validation as [`WeightedKnnTransfer::transfer`] for the index and
    /// the query embedding.
    pub fn weights(
        &self,
        index: &dyn NeighborSearch,
        query: &Dataset,
        embedding: &EmbeddingSelector,
    ) -> Result<(Neighbors, WeightMatrix)> {
        let index = exact_index(index)?;
        let neighbors = index.kneighbors(query.embedding(embedding)?)?;
        let weights = WeightMatrix::from_neighbors(&neighbors);
        Ok((neighbors, weights))
    }

    /// Predictions and uncertainties of query row `i`, one per label column.
    fn annotate_row(
        &self,
        neighbors: &Neighbors,
        weights: &WeightMatrix,
        reference_labels: &[Vec<&str>],
        i: usize,
    ) -> Result<Vec<(PredictedLabel, f64)>> {
        let indices = neighbors.indices(i);
        let row_weights = weights.row(i);

        reference_labels
            .iter()
            .map(|column| {
                let vote = weighted_vote(indices.iter().map(|&j| column[j]), row_weights)
                    .ok_or(TransferError::EmptyInput("neighbor row"))?;

                let label = if self.config.abstains(vote.prob) {
                    PredictedLabel::Unknown
                } else {
                    PredictedLabel::Label(vote.label.to_string())
                };
                Ok((label, uncertainty(vote.prob)))
            })
            .collect()
    }
}

/// Annotates `query` with the labels of `labels` selected by `config`.
pub fn transfer(
    index: &dyn NeighborSearch,
    query: &Dataset,
    embedding: &EmbeddingSelector,
    labels: &LabelTable,
    config: TransferConfig,
) -> Result<TransferOutput> {
    WeightedKnnTransfer::new(config).transfer(index, query, embedding, labels)
}

fn exact_index(index: &dyn NeighborSearch) -> Result<&ExactIndex> {
    index
        .as_any()
        .downcast_ref::<ExactIndex>()
        .ok_or_else(|| TransferError::TypeMismatch {
            expected: ExactIndex::KIND.to_string(),
            found: index.kind().to_string(),
        })
}

/// Label columns re-ordered to follow the index's reference rows.
fn align_labels<'a>(
    index: &ExactIndex,
    labels: &'a LabelTable,
    columns: &[String],
) -> Result<Vec<Vec<&'a str>>> {
    let rows = index
        .reference_ids()
        .iter()
        .map(|id| {
            labels
                .position(id)
                .ok_or_else(|| TransferError::MissingReferenceLabels { id: id.clone() })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(columns
        .iter()
        .filter_map(|name| labels.column(name))
        .map(|values| rows.iter().map(|&r| values[r].as_str()).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use super::*;
    use crate::index::fit;
    use crate::types::{EmbeddingMatrix, UNKNOWN_LABEL};

    fn line(ids: &[&str], points: &[f64]) -> Dataset {
        let x = EmbeddingMatrix::from_rows(points.iter().map(|&p| vec![p]).collect()).unwrap();
        Dataset::new(ids.iter().map(|s| s.to_string()).collect(), x).unwrap()
    }

    fn reference() -> (Dataset, LabelTable) {
        let ds = line(&["r0", "r1", "r2", "r3"], &[0.0, 1.0, 10.0, 11.0]);
        let labels = LabelTable::from_columns(
            ds.ids().to_vec(),
            vec![
                ("Level_1".into(), vec!["A".into(), "A".into(), "B".into(), "B".into()]),
                ("Level_2".into(), vec!["A1".into(), "A2".into(), "B1".into(), "B1".into()]),
                ("batch".into(), vec!["x".into(), "y".into(), "x".into(), "y".into()]),
            ],
        )
        .unwrap();
        (ds, labels)
    }

    fn run(k: usize, query: &Dataset, config: TransferConfig) -> Result<TransferOutput> {
        let (reference, labels) = reference();
        let index = fit(&reference, "X", k)?;
        transfer(&index, query, &EmbeddingSelector::Primary, &labels, config)
    }

    fn level_config() -> TransferConfig {
        TransferConfig::new().with_label_key("Level")
    }

    struct ForeignIndex;

    impl NeighborSearch for ForeignIndex {
        fn kind(&self) -> &str {
            "hnsw"
        }
        fn n_neighbors(&self) -> usize {
            1
        }
        fn n_features(&self) -> usize {
            1
        }
        fn reference_ids(&self) -> &[String] {
            &[]
        }
        fn kneighbors(&self, _query: &EmbeddingMatrix) -> Result<Neighbors> {
            Ok(Neighbors::from_rows(1, Vec::new()))
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn default_config() {
        let config = TransferConfig::default();
        assert_eq!(config.threshold, 1.0);
        assert!(!config.pred_unknown);
        assert_eq!(config.mode, "package");
        assert!(config.label_pattern.is_none());
    }

    #[test]
    fn config_from_json_fills_defaults() {
        let config = TransferConfig::from_json(r#"{"label_key": "ann_level", "pred_unknown": true}"#)
            .unwrap();
        assert_eq!(config.label_key, "ann_level");
        assert!(config.pred_unknown);
        assert_eq!(config.threshold, 1.0);
        assert_eq!(config.mode, "package");

        assert!(matches!(
            TransferConfig::from_json("{"),
            Err(TransferError::Config(_))
        ));
    }

    #[test]
    fn unanimous_neighbors() {
        let query = line(&["q0"], &[0.5]);
        let out = run(2, &query, level_config()).unwrap();

        assert_eq!(out.predictions.columns(), &["Level_1".to_string(), "Level_2".to_string()]);
        assert_eq!(
            out.predictions.value("q0", "Level_1"),
            Some(&PredictedLabel::Label("A".into()))
        );
        assert_eq!(out.uncertainties.value("q0", "Level_1"), Some(&0.0));

        // Level_2 splits A1/A2 at equal distance: tie resolved to A1.
        assert_eq!(
            out.predictions.value("q0", "Level_2"),
            Some(&PredictedLabel::Label("A1".into()))
        );
        assert!((out.uncertainties.value("q0", "Level_2").unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn unanimous_weights_sum_to_one() {
        let (reference, _) = reference();
        let index = fit(&reference, "X", 2).unwrap();
        let query = line(&["q0"], &[0.5]);
        let (nn, w) = WeightedKnnTransfer::default()
            .weights(&index, &query, &EmbeddingSelector::Primary)
            .unwrap();
        assert_eq!(nn.indices(0), &[0, 1]);
        assert!((w.row(0).iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn symmetric_tie_goes_to_first_label_in_order() {
        let query = line(&["q0"], &[5.5]);
        let out = run(4, &query, level_config()).unwrap();

        assert_eq!(
            out.predictions.value("q0", "Level_1"),
            Some(&PredictedLabel::Label("A".into()))
        );
        assert!((out.uncertainties.value("q0", "Level_1").unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn abstains_below_threshold() {
        let query = line(&["q0", "q1"], &[5.5, 0.5]);
        let config = level_config().with_pred_unknown(true).with_threshold(0.8);
        let out = run(4, &query, config).unwrap();

        assert_eq!(
            out.predictions.value("q0", "Level_1"),
            Some(&PredictedLabel::Unknown)
        );
        // Uncertainty is reported even for withheld predictions.
        assert!((out.uncertainties.value("q0", "Level_1").unwrap() - 0.5).abs() < 1e-12);
        assert!(!out.predictions.value("q1", "Level_1").unwrap().is_unknown());
    }

    #[test]
    fn threshold_ignored_without_pred_unknown() {
        let query = line(&["q0", "q1", "q2"], &[5.5, 0.5, 9.0]);
        let base = run(4, &query, level_config()).unwrap();
        for threshold in [0.0, 0.3, 0.9, 1.0] {
            let out = run(4, &query, level_config().with_threshold(threshold)).unwrap();
            assert_eq!(out, base, "threshold {threshold}");
        }
    }

    #[test]
    fn threshold_one_never_abstains() {
        let query = line(&["q0", "q1", "q2"], &[5.5, 0.5, 9.0]);
        let base = run(3, &query, level_config()).unwrap();
        let out = run(3, &query, level_config().with_pred_unknown(true).with_threshold(1.0)).unwrap();
        assert_eq!(out, base);
    }

    #[test]
    fn transfer_is_idempotent() {
        let query = line(&["q0", "q1", "q2", "q3"], &[-2.0, 3.0, 6.0, 12.5]);
        let a = run(3, &query, level_config()).unwrap();
        let b = run(3, &query, level_config()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn uncertainties_in_unit_interval() {
        let query = line(&["q0", "q1", "q2", "q3"], &[-2.0, 3.0, 6.0, 12.5]);
        let out = run(4, &query, level_config()).unwrap();
        for (_, row) in out.uncertainties.rows() {
            assert!(row.iter().all(|u| (0.0..=1.0).contains(u)), "{row:?}");
        }
    }

    #[test]
    fn pattern_selects_columns() {
        let query = line(&["q0"], &[0.5]);
        let out = run(2, &query, TransferConfig::new().with_label_pattern("^batch$")).unwrap();
        assert_eq!(out.predictions.columns(), &["batch".to_string()]);
    }

    #[test]
    fn no_matching_columns_gives_empty_tables() {
        let query = line(&["q0"], &[0.5]);
        let out = run(2, &query, TransferConfig::new().with_label_key("cell_type")).unwrap();
        assert_eq!(out.predictions.n_rows(), 1);
        assert_eq!(out.predictions.n_columns(), 0);
    }

    #[test]
    fn rejects_unsupported_mode() {
        let query = line(&["q0"], &[0.5]);
        for mode in ["paper", "bogus"] {
            let err = run(2, &query, level_config().with_mode(mode)).unwrap_err();
            assert!(matches!(err, TransferError::UnsupportedMode(ref m) if m == mode));
        }
    }

    #[test]
    fn rejects_foreign_index() {
        let (_, labels) = reference();
        let query = line(&["q0"], &[0.5]);
        let err = transfer(
            &ForeignIndex,
            &query,
            &EmbeddingSelector::Primary,
            &labels,
            level_config(),
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::TypeMismatch { ref found, .. } if found == "hnsw"));
    }

    #[test]
    fn rejects_missing_query_embedding() {
        let query = line(&["q0"], &[0.5]);
        let (reference, labels) = reference();
        let index = fit(&reference, "X", 2).unwrap();
        let err = transfer(
            &index,
            &query,
            &EmbeddingSelector::named("X_scvi"),
            &labels,
            level_config(),
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::InvalidEmbeddingSelector { .. }));
    }

    #[test]
    fn rejects_unlabeled_reference() {
        let (reference, _) = reference();
        let partial = LabelTable::from_columns(
            vec!["r0".into(), "r1".into()],
            vec![("Level_1".into(), vec!["A".into(), "A".into()])],
        )
        .unwrap();
        let index = fit(&reference, "X", 2).unwrap();
        let query = line(&["q0"], &[0.5]);
        let err = transfer(&index, &query, &EmbeddingSelector::Primary, &partial, level_config())
            .unwrap_err();
        assert!(matches!(err, TransferError::MissingReferenceLabels { ref id } if id == "r2"));
    }

    #[test]
    fn transfers_through_named_embedding() {
        // In X the query sits with r0/r1 ("A"); in the latent space it sits with r2/r3 ("B").
        let (reference, labels) = reference();
        let latent = EmbeddingMatrix::from_rows(vec![
            vec![5.0, 5.0],
            vec![5.0, 6.0],
            vec![0.0, 0.0],
            vec![0.0, 1.0],
        ])
        .unwrap();
        let reference = reference.with_embedding("X_scvi", latent).unwrap();
        let query = line(&["q0"], &[0.5])
            .with_embedding("X_scvi", EmbeddingMatrix::from_rows(vec![vec![0.0, 0.5]]).unwrap())
            .unwrap();

        let selector = EmbeddingSelector::named("X_scvi");
        let index = fit(&reference, selector.clone(), 2).unwrap();
        let out = transfer(&index, &query, &selector, &labels, level_config()).unwrap();
        assert_eq!(
            out.predictions.value("q0", "Level_1"),
            Some(&PredictedLabel::Label("B".into()))
        );
        assert_eq!(out.uncertainties.value("q0", "Level_1"), Some(&0.0));

        let in_x = run(2, &query, level_config()).unwrap();
        assert_eq!(
            in_x.predictions.value("q0", "Level_1"),
            Some(&PredictedLabel::Label("A".into()))
        );
    }

    #[test]
    fn huge_coordinates_vote_with_finite_weights() {
        let reference = line(&["r0", "r1", "r2"], &[1.0e160, 2.0e160, -3.0e160]);
        let labels = LabelTable::from_columns(
            reference.ids().to_vec(),
            vec![("Level_1".into(), vec!["A".into(), "B".into(), "B".into()])],
        )
        .unwrap();
        let index = fit(&reference, "X", 3).unwrap();
        let query = line(&["q0"], &[0.0]);

        let (_, w) = WeightedKnnTransfer::default()
            .weights(&index, &query, &EmbeddingSelector::Primary)
            .unwrap();
        assert!(w.row(0).iter().all(|x| x.is_finite() && *x >= 0.0), "{:?}", w.row(0));
        assert!((w.row(0).iter().sum::<f64>() - 1.0).abs() < 1e-12);

        let config = level_config().with_pred_unknown(true).with_threshold(0.9);
        let out = transfer(&index, &query, &EmbeddingSelector::Primary, &labels, config).unwrap();
        let u = *out.uncertainties.value("q0", "Level_1").unwrap();
        assert!((0.0..=1.0).contains(&u));
        assert_eq!(
            out.predictions.value("q0", "Level_1"),
            Some(&PredictedLabel::Label("A".into()))
        );
    }

    #[test]
    fn overflowing_distances_fail_before_voting() {
        let reference = line(&["r0", "r1"], &[-1.0e308, 0.0]);
        let labels = LabelTable::from_columns(
            reference.ids().to_vec(),
            vec![("Level_1".into(), vec!["A".into(), "B".into()])],
        )
        .unwrap();
        let index = fit(&reference, "X", 2).unwrap();
        let query = line(&["q0"], &[1.0e308]);
        let err = transfer(&index, &query, &EmbeddingSelector::Primary, &labels, level_config())
            .unwrap_err();
        assert!(matches!(err, TransferError::NonFiniteDistance { row: 0 }));
    }

    #[test]
    fn unmatched_join_rows_never_read_as_unknown() {
        let reference = line(&["r0", "r1", "r2"], &[0.0, 1.0, 10.0]);
        let obs = LabelTable::from_columns(
            reference.ids().to_vec(),
            vec![("manual_ann".into(), vec!["AT1".into(), "Mystery".into(), "Mystery".into()])],
        )
        .unwrap();
        let levels = LabelTable::from_columns(
            vec!["AT1".into()],
            vec![("Level_1".into(), vec!["Epithelial".into()])],
        )
        .unwrap();
        let labels = obs.join_on(&levels, "manual_ann").unwrap();

        let index = fit(&reference, "X", 2).unwrap();
        let query = line(&["q0"], &[9.0]);
        let out = transfer(&index, &query, &EmbeddingSelector::Primary, &labels, level_config())
            .unwrap();

        let pred = out.predictions.value("q0", "Level_1").unwrap();
        assert!(!pred.is_unknown());
        assert_ne!(pred.to_string(), UNKNOWN_LABEL);

        let json = serde_json::to_string(&out).unwrap();
        let back: TransferOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, out);
    }

    #[test]
    fn label_table_order_does_not_matter() {
        let (reference, labels) = reference();
        let shuffled_ids: Vec<String> = ["r3", "r1", "r0", "r2"].iter().map(|s| s.to_string()).collect();
        let shuffled = LabelTable::from_columns(
            shuffled_ids.clone(),
            vec![(
                "Level_1".into(),
                shuffled_ids
                    .iter()
                    .map(|id| labels.get(id, "Level_1").unwrap().to_string())
                    .collect(),
            )],
        )
        .unwrap();

        let index = fit(&reference, "X", 2).unwrap();
        let query = line(&["q0", "q1"], &[0.5, 10.5]);
        let out = transfer(&index, &query, &EmbeddingSelector::Primary, &shuffled, level_config())
            .unwrap();
        assert_eq!(out.predictions.get(0, 0).as_str(), "A");
        assert_eq!(out.predictions.get(1, 0).as_str(), "B");
    }
}
