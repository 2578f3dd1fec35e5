//! `nemo-outliers` library crate.
//!
//! Flags anomalously weak low-resolution reflections in X-ray diffraction data:
//!
//! - `prepare`: select the working resolution shell and normalize observations
//! - `wilson`: cumulative Wilson probabilities and the low-probability flag test
//! - `cluster`: parameter-swept HDBSCAN runs validated against Wilson candidates
//! - `consensus`: reduce the sweep into one stable outlier set
//! - `pipeline`: the full detection run, reflection set in, Miller indices out
//! - `data`: in-memory provider, reference normalizer and synthetic datasets

pub mod cluster;
pub mod consensus;
pub mod data;
pub mod domain;
pub mod error;
pub mod math;
pub mod pipeline;
pub mod prepare;
pub mod wilson;

pub use domain::{DetectionConfig, MillerIndex, ObservationKind, OutlierResult, Reflection, ReflectionSet};
pub use error::{NemoError, Result};
pub use pipeline::NemoDetector;
