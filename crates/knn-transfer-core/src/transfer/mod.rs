pub mod engine;
pub mod kernel;
pub mod vote;

pub use engine::{transfer, TransferConfig, WeightedKnnTransfer};
pub use kernel::{adaptive_weights, bandwidth, WeightMatrix};
pub use vote::{uncertainty, weighted_vote, Vote};
