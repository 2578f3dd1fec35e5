//! Shared domain types.
//!
//! Index conventions:
//!
//! - an *original index* addresses `ReflectionSet::reflections` as supplied
//! - a *position* addresses the working shell, which is sorted by descending
//!   d-spacing; `PreparedShell::sorted_arg` maps positions back to original indices
//!
//! Every stage after data preparation works in positions. Only the final
//! `OutlierResult` is expressed in Miller indices.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NemoError, Result};

/// Integer triple `(h, k, l)` identifying a reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MillerIndex {
    pub h: i32,
    pub k: i32,
    pub l: i32,
}

impl MillerIndex {
    pub const fn new(h: i32, k: i32, l: i32) -> Self {
        Self { h, k, l }
    }
}

impl From<[i32; 3]> for MillerIndex {
    fn from(value: [i32; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

impl fmt::Display for MillerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.h, self.k, self.l)
    }
}

fn default_epsilon() -> f64 {
    1.0
}

/// One measured reflection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub miller: MillerIndex,
    /// Interplanar spacing in Å.
    pub d_spacing: f64,
    /// Measured amplitude or intensity (see `ReflectionSet::observation_type`).
    pub value: f64,
    pub sigma: f64,
    pub centric: bool,
    /// Statistical weight ε of the reflection's symmetry class.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Reflection {
    pub fn new(miller: MillerIndex, d_spacing: f64, value: f64, sigma: f64, centric: bool) -> Self {
        Self {
            miller,
            d_spacing,
            value,
            sigma,
            centric,
            epsilon: 1.0,
        }
    }

    /// `1 / d²`.
    pub fn inv_res_sq(&self) -> f64 {
        1.0 / (self.d_spacing * self.d_spacing)
    }
}

/// A labelled observation array as handed over by a reflection-data provider.
///
/// `observation_type` is the provider's raw discriminator. It is resolved into an
/// `ObservationKind` exactly once, during data preparation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionSet {
    pub label: String,
    pub observation_type: String,
    pub reflections: Vec<Reflection>,
}

impl ReflectionSet {
    pub fn new(
        label: impl Into<String>,
        observation_type: impl Into<String>,
        reflections: Vec<Reflection>,
    ) -> Self {
        Self {
            label: label.into(),
            observation_type: observation_type.into(),
            reflections,
        }
    }

    pub fn len(&self) -> usize {
        self.reflections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reflections.is_empty()
    }

    /// Structural checks: unique Miller indices, positive finite d-spacings,
    /// finite values, positive finite sigmas and positive epsilons.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.reflections.len());
        for (i, r) in self.reflections.iter().enumerate() {
            if !seen.insert(r.miller) {
                return Err(NemoError::invalid_input(format!(
                    "Duplicate Miller index {} in '{}'.",
                    r.miller, self.label
                )));
            }
            if !(r.d_spacing.is_finite() && r.d_spacing > 0.0) {
                return Err(NemoError::invalid_input(format!(
                    "Reflection {i} {} has invalid d-spacing {}.",
                    r.miller, r.d_spacing
                )));
            }
            if !r.value.is_finite() {
                return Err(NemoError::invalid_input(format!(
                    "Reflection {i} {} has a non-finite value.",
                    r.miller
                )));
            }
            if !(r.sigma.is_finite() && r.sigma > 0.0) {
                return Err(NemoError::invalid_input(format!(
                    "Reflection {i} {} has invalid sigma {}.",
                    r.miller, r.sigma
                )));
            }
            if !(r.epsilon.is_finite() && r.epsilon > 0.0) {
                return Err(NemoError::invalid_input(format!(
                    "Reflection {i} {} has invalid epsilon {}.",
                    r.miller, r.epsilon
                )));
            }
        }
        Ok(())
    }
}

/// Concrete observation type after resolving the provider's discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Amplitude,
    Intensity,
}

impl ObservationKind {
    /// Resolve a raw discriminator (`"amplitude"`/`"F"`, `"intensity"`/`"I"`, case-insensitive).
    pub fn resolve(label: &str, observation_type: &str) -> Result<Self> {
        match observation_type.trim().to_ascii_lowercase().as_str() {
            "amplitude" | "f" | "xray.amplitude" => Ok(Self::Amplitude),
            "intensity" | "i" | "xray.intensity" => Ok(Self::Intensity),
            _ => Err(NemoError::UnsupportedObservationType {
                label: label.to_string(),
                observation_type: observation_type.to_string(),
            }),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ObservationKind::Amplitude => "amplitude",
            ObservationKind::Intensity => "intensity",
        }
    }
}

/// Normalized observations for a subset of the working shell.
///
/// Only the intensity variant carries sigmas; the amplitude CDFs do not use them.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedObservations {
    Amplitude { e: Vec<f64> },
    Intensity { e_sq: Vec<f64>, sigma: Vec<f64> },
}

impl NormalizedObservations {
    pub fn kind(&self) -> ObservationKind {
        match self {
            NormalizedObservations::Amplitude { .. } => ObservationKind::Amplitude,
            NormalizedObservations::Intensity { .. } => ObservationKind::Intensity,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NormalizedObservations::Amplitude { e } => e.len(),
            NormalizedObservations::Intensity { e_sq, .. } => e_sq.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gather the entries at `positions` (in that order).
    pub fn select(&self, positions: &[usize]) -> Self {
        match self {
            NormalizedObservations::Amplitude { e } => NormalizedObservations::Amplitude {
                e: positions.iter().map(|&p| e[p]).collect(),
            },
            NormalizedObservations::Intensity { e_sq, sigma } => NormalizedObservations::Intensity {
                e_sq: positions.iter().map(|&p| e_sq[p]).collect(),
                sigma: positions.iter().map(|&p| sigma[p]).collect(),
            },
        }
    }
}

/// The low-resolution working shell, sorted by descending d-spacing.
#[derive(Debug, Clone)]
pub struct PreparedShell {
    pub kind: ObservationKind,
    /// Miller indices of the full reflection set, in original order.
    pub miller: Vec<MillerIndex>,
    /// Descending d-spacing permutation of the full set: `sorted_arg[position] = original index`.
    pub sorted_arg: Vec<usize>,
    /// Per-position d-spacing (Å).
    pub d_spacing: Vec<f64>,
    /// Per-position raw measured value.
    pub value: Vec<f64>,
    /// Per-position raw sigma.
    pub sigma: Vec<f64>,
    /// Positions of centric reflections (ascending).
    pub centric: Vec<usize>,
    /// Positions of acentric reflections (ascending).
    pub acentric: Vec<usize>,
    /// Per-position normalized observations (E for amplitudes, E² and σ for intensities).
    pub normalized: NormalizedObservations,
}

impl PreparedShell {
    /// Number of reflections in the working shell.
    pub fn len(&self) -> usize {
        self.d_spacing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.d_spacing.is_empty()
    }

    pub fn original_index(&self, position: usize) -> usize {
        self.sorted_arg[position]
    }

    pub fn miller_at(&self, position: usize) -> MillerIndex {
        self.miller[self.sorted_arg[position]]
    }

    pub fn inv_res_sq(&self, position: usize) -> f64 {
        let d = self.d_spacing[position];
        1.0 / (d * d)
    }

    pub fn acentric_observations(&self) -> NormalizedObservations {
        self.normalized.select(&self.acentric)
    }

    pub fn centric_observations(&self) -> NormalizedObservations {
        self.normalized.select(&self.centric)
    }

    /// Map shell positions to Miller indices, ordered by original index, without duplicates.
    pub fn to_miller(&self, positions: &[usize]) -> Vec<MillerIndex> {
        let mut original: Vec<usize> = positions.iter().map(|&p| self.sorted_arg[p]).collect();
        original.sort_unstable();
        original.dedup();
        original.into_iter().map(|i| self.miller[i]).collect()
    }
}

/// One reflection flagged by the Wilson test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WilsonCandidate {
    /// Position in the working shell.
    pub position: usize,
    pub probability: f64,
    pub inv_res_sq: f64,
}

/// Wilson-flagged reflections: acentric first, then centric, each in shell order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WilsonCandidates {
    pub items: Vec<WilsonCandidate>,
}

impl WilsonCandidates {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn positions(&self) -> Vec<usize> {
        self.items.iter().map(|c| c.position).collect()
    }

    /// Positions of candidates with `probability <= level`, in candidate order.
    pub fn at_or_below(&self, level: f64) -> Vec<usize> {
        self.items
            .iter()
            .filter(|c| c.probability <= level)
            .map(|c| c.position)
            .collect()
    }

    /// A copy restricted to candidates with `probability <= ceiling`.
    pub fn capped(&self, ceiling: f64) -> Self {
        Self {
            items: self
                .items
                .iter()
                .filter(|c| c.probability <= ceiling)
                .copied()
                .collect(),
        }
    }
}

/// Shell positions retained from one clustering fit after Wilson-overlap validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    pub min_cluster_size: usize,
    /// Sorted, unique positions.
    pub positions: Vec<usize>,
}

/// Result of one sweep iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepOutcome {
    Success(CandidateSet),
    /// The fit produced only noise, or no label passed validation.
    NoCluster { min_cluster_size: usize },
    /// The clustering could not be fitted on this input; the iteration is skipped.
    DegenerateFit { min_cluster_size: usize, reason: String },
}

impl SweepOutcome {
    pub fn min_cluster_size(&self) -> usize {
        match self {
            SweepOutcome::Success(set) => set.min_cluster_size,
            SweepOutcome::NoCluster { min_cluster_size }
            | SweepOutcome::DegenerateFit {
                min_cluster_size, ..
            } => *min_cluster_size,
        }
    }

    pub fn candidate_set(&self) -> Option<&CandidateSet> {
        match self {
            SweepOutcome::Success(set) => Some(set),
            _ => None,
        }
    }
}

/// Which rule produced the final outlier set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBranch {
    /// The Wilson test flagged nothing.
    NoWilsonCandidates,
    /// Exactly one Wilson candidate; clustering skipped.
    SingleCandidate,
    /// No sweep iteration produced a CandidateSet.
    NoCandidateSets,
    /// Zero or one distinct index across all CandidateSets.
    TooFewIndices,
    /// Two distinct indices, each seen once.
    PairSeenOnce,
    /// Two distinct indices, at least one seen more than once.
    PairRecurring,
    /// Every index seen exactly once.
    UniformSingleShot,
    /// Every index seen the same number (> 1) of times.
    UniformRecurring,
    /// Occurrence counts differ between indices.
    VaryingCounts,
}

/// Final detection output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierResult {
    /// Flagged reflections, ordered by original reflection index.
    pub indices: Vec<MillerIndex>,
    pub branch: DecisionBranch,
    /// Occurrence rate of every tallied reflection across productive sweep iterations.
    pub cluster_prob: Vec<(MillerIndex, f64)>,
}

impl OutlierResult {
    pub fn empty(branch: DecisionBranch) -> Self {
        Self {
            indices: Vec::new(),
            branch,
            cluster_prob: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn contains(&self, miller: &MillerIndex) -> bool {
        self.indices.contains(miller)
    }
}
