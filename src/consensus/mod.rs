//! Reduction of the clustering sweep into one outlier set.

pub mod reducer;
pub mod tally;

pub use reducer::{ConsensusReducer, Decision};
pub use tally::ConsensusTally;
