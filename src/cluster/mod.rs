//! Density-based clustering sweep.
//!
//! - `features`: the `(1/d², value/σ)` feature array and its axis rescale
//! - `hdbscan`: one brute-force HDBSCAN fit with membership probabilities
//! - `sweep`: `ClusterConsensusEngine`, one validated fit per minimum cluster size

pub mod features;
pub mod hdbscan;
pub mod sweep;

pub use features::FeatureArray;
pub use hdbscan::{ClusterFitError, ClusterRun, Hdbscan, NOISE};
pub use sweep::ClusterConsensusEngine;
