//! Crate-wide error type.
//!
//! Only structurally invalid input is fatal. Recoverable conditions inside the
//! clustering sweep use `cluster::ClusterFitError` and never surface here.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NemoError {
    /// The observation array is neither amplitudes nor intensities.
    #[error("Unsupported observation type '{observation_type}' for label '{label}'.")]
    UnsupportedObservationType {
        label: String,
        observation_type: String,
    },

    #[error("No observation array labelled '{0}'.")]
    MissingObservation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Loading or parsing a configuration document failed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NemoError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

pub type Result<T> = std::result::Result<T, NemoError>;
