//! Domain types used throughout the detection pipeline.
//!
//! This module defines:
//!
//! - reflection inputs (`MillerIndex`, `Reflection`, `ReflectionSet`)
//! - the prepared working shell (`PreparedShell`, `NormalizedObservations`)
//! - per-stage results (`WilsonCandidates`, `SweepOutcome`, `OutlierResult`)
//! - run configuration (`DetectionConfig`, `ConsensusThresholds`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
