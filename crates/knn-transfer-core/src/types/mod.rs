pub mod embedding;
pub mod labels;
pub mod mode;
pub mod table;

pub use embedding::{Dataset, EmbeddingMatrix, EmbeddingSelector, PRIMARY_EMBEDDING};
pub use labels::{LabelSelector, LabelTable, PredictedLabel, MISSING_LABEL, UNKNOWN_LABEL};
pub use mode::UncertaintyMode;
pub use table::{PredictionTable, ResultTable, TransferOutput, UncertaintyTable};
