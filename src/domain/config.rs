//! Detection run configuration.
//!
//! Layers, lowest to highest precedence:
//!
//! 1. `Default` values
//! 2. an optional JSON document (`DetectionConfig::from_json_str` / `DetectionConfig::load`)
//! 3. environment overrides (`DetectionConfig::with_env_overrides`, `.env` honoured)

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NemoError, Result};

/// Wilson probability at or below which a candidate survives the conservative fallbacks.
pub const CONSERVATIVE_PROB: f64 = 0.005;
/// Wilson probability ceiling applied when every clustered index was seen exactly once.
pub const SINGLE_SHOT_PROB: f64 = 0.011;
/// Wilson probability ceiling for the low-resolution rescue in the varying-count branch.
pub const LOW_RES_PROB: f64 = 0.02;
/// `1/d²` ceiling (Å⁻²) for the low-resolution rescue in the varying-count branch.
pub const LOW_RES_INV_D2: f64 = 0.002;
/// Fraction of the reference count an index must reach in the varying-count branch.
pub const RECURRENCE_RATIO: f64 = 0.8;

/// Adaptive quadrature subdivision limit. Must stay above 100.
pub const INTEGRATION_LIMIT: usize = 301;
/// Largest subdivision limit `validate` accepts.
pub const MAX_INTEGRATION_LIMIT: usize = 100_000;

const ENV_RESOLUTION_CUTOFF: &str = "NEMO_RESOLUTION_CUTOFF";
const ENV_WILSON_PROB_LEVEL: &str = "NEMO_WILSON_PROB_LEVEL";
const ENV_INTEGRATION_LIMIT: &str = "NEMO_INTEGRATION_LIMIT";

/// Decision-table thresholds for the consensus reducer.
///
/// These were tuned empirically and are kept as tunables pending domain validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusThresholds {
    pub conservative_prob: f64,
    pub single_shot_prob: f64,
    pub low_res_prob: f64,
    pub low_res_inv_d2: f64,
    pub recurrence_ratio: f64,
}

impl Default for ConsensusThresholds {
    fn default() -> Self {
        Self {
            conservative_prob: CONSERVATIVE_PROB,
            single_shot_prob: SINGLE_SHOT_PROB,
            low_res_prob: LOW_RES_PROB,
            low_res_inv_d2: LOW_RES_INV_D2,
            recurrence_ratio: RECURRENCE_RATIO,
        }
    }
}

/// Settings for the owned quadrature engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Maximum number of subintervals per integral.
    pub limit: usize,
    pub epsabs: f64,
    pub epsrel: f64,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            limit: INTEGRATION_LIMIT,
            epsabs: 1.49e-8,
            epsrel: 1.49e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum-resolution cutoff (Å). The working shell is `d > resolution_cutoff`.
    pub resolution_cutoff: f64,
    /// Wilson probability below which a reflection becomes a candidate.
    pub wilson_prob_level: f64,
    /// Optional extra ceiling on candidate probability before the sweep uses them.
    pub sweep_prob_ceiling: Option<f64>,
    /// Minimum membership probability for a point to count towards its label.
    pub membership_threshold: f64,
    /// Minimum fraction of Wilson candidates among a label's members (exclusive).
    pub overlap_threshold: f64,
    /// Percentile of the I/σ axis that the `1/d²` axis is stretched to.
    pub scale_percentile: f64,
    pub integration: IntegrationConfig,
    pub thresholds: ConsensusThresholds,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            resolution_cutoff: 10.0,
            wilson_prob_level: 0.05,
            sweep_prob_ceiling: None,
            membership_threshold: 0.5,
            overlap_threshold: 0.5,
            scale_percentile: 80.0,
            integration: IntegrationConfig::default(),
            thresholds: ConsensusThresholds::default(),
        }
    }
}

impl DetectionConfig {
    /// Parse a (possibly partial) JSON document on top of the defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| NemoError::Config(format!("Failed to parse config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            NemoError::Config(format!("Failed to read config '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Apply `NEMO_*` environment overrides (a `.env` file is loaded first if present).
    pub fn with_env_overrides(mut self) -> Result<Self> {
        dotenvy::dotenv().ok();
        if let Some(v) = env_parse::<f64>(ENV_RESOLUTION_CUTOFF)? {
            self.resolution_cutoff = v;
        }
        if let Some(v) = env_parse::<f64>(ENV_WILSON_PROB_LEVEL)? {
            self.wilson_prob_level = v;
        }
        if let Some(v) = env_parse::<usize>(ENV_INTEGRATION_LIMIT)? {
            self.integration.limit = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.resolution_cutoff.is_finite() && self.resolution_cutoff >= 0.0) {
            return Err(NemoError::invalid_config(format!(
                "resolution_cutoff must be finite and >= 0, got {}.",
                self.resolution_cutoff
            )));
        }
        check_probability("wilson_prob_level", self.wilson_prob_level)?;
        if let Some(ceiling) = self.sweep_prob_ceiling {
            check_probability("sweep_prob_ceiling", ceiling)?;
        }
        check_probability("membership_threshold", self.membership_threshold)?;
        check_probability("overlap_threshold", self.overlap_threshold)?;
        if !(self.scale_percentile.is_finite() && (0.0..=100.0).contains(&self.scale_percentile)) {
            return Err(NemoError::invalid_config(format!(
                "scale_percentile must be within [0, 100], got {}.",
                self.scale_percentile
            )));
        }
        if self.integration.limit <= 100 || self.integration.limit > MAX_INTEGRATION_LIMIT {
            return Err(NemoError::invalid_config(format!(
                "integration.limit must be within (100, {MAX_INTEGRATION_LIMIT}] subintervals, got {}.",
                self.integration.limit
            )));
        }
        if !(self.integration.epsabs >= 0.0 && self.integration.epsrel >= 0.0)
            || (self.integration.epsabs == 0.0 && self.integration.epsrel == 0.0)
        {
            return Err(NemoError::invalid_config(
                "integration tolerances must be >= 0 and not both zero.",
            ));
        }

        let t = &self.thresholds;
        check_probability("thresholds.conservative_prob", t.conservative_prob)?;
        check_probability("thresholds.single_shot_prob", t.single_shot_prob)?;
        check_probability("thresholds.low_res_prob", t.low_res_prob)?;
        check_probability("thresholds.recurrence_ratio", t.recurrence_ratio)?;
        if !(t.low_res_inv_d2.is_finite() && t.low_res_inv_d2 >= 0.0) {
            return Err(NemoError::invalid_config(format!(
                "thresholds.low_res_inv_d2 must be finite and >= 0, got {}.",
                t.low_res_inv_d2
            )));
        }
        Ok(())
    }
}

fn check_probability(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(NemoError::invalid_config(format!(
            "{name} must be within (0, 1), got {value}."
        )))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| NemoError::Config(format!("Cannot parse {key}='{raw}'."))),
        Err(_) => Ok(None),
    }
}
