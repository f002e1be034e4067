pub mod builder;
pub mod exact;

pub use builder::{fit, IndexBuilder, IndexConfig, DEFAULT_N_NEIGHBORS};
pub use exact::{ExactIndex, NeighborSearch, Neighbors};
