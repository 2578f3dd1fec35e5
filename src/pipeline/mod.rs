//! Full detection run.
//!
//! reflection set -> working shell -> Wilson candidates -> clustering sweep -> consensus -> Miller indices
//!
//! Short cuts:
//!
//! - an empty working shell or no Wilson candidate yields an empty result
//! - a single Wilson candidate skips clustering; it is reported only if its
//!   probability is at or below the conservative threshold

use tracing::debug;

use crate::cluster::{ClusterConsensusEngine, FeatureArray};
use crate::consensus::{ConsensusReducer, ConsensusTally};
use crate::domain::{DecisionBranch, DetectionConfig, OutlierResult, PreparedShell, ReflectionSet};
use crate::error::Result;
use crate::prepare::{ReflectionProvider, ShellNormalizer, prepare_shell};
use crate::wilson::WilsonOutlierTest;

/// Weak-reflection detector. Owns its integration engine; holds no per-run state.
#[derive(Debug, Clone)]
pub struct NemoDetector {
    config: DetectionConfig,
    wilson: WilsonOutlierTest,
    engine: ClusterConsensusEngine,
    reducer: ConsensusReducer,
}

impl Default for NemoDetector {
    fn default() -> Self {
        Self::build(DetectionConfig::default())
    }
}

impl NemoDetector {
    pub fn new(config: DetectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: DetectionConfig) -> Self {
        Self {
            wilson: WilsonOutlierTest::from_config(config.integration),
            engine: ClusterConsensusEngine::from_config(&config),
            reducer: ConsensusReducer::new(config.thresholds),
            config,
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Fetch `label` from `provider` and run the detection on it.
    pub fn detect(
        &self,
        provider: &dyn ReflectionProvider,
        label: &str,
        normalizer: &dyn ShellNormalizer,
    ) -> Result<OutlierResult> {
        let set = provider.reflection_set(label)?;
        self.detect_set(&set, normalizer)
    }

    pub fn detect_set(&self, set: &ReflectionSet, normalizer: &dyn ShellNormalizer) -> Result<OutlierResult> {
        let shell = prepare_shell(set, self.config.resolution_cutoff, normalizer)?;
        Ok(self.detect_shell(&shell))
    }

    /// Detection on an already prepared working shell.
    pub fn detect_shell(&self, shell: &PreparedShell) -> OutlierResult {
        if shell.is_empty() {
            debug!("working shell is empty");
            return OutlierResult::empty(DecisionBranch::NoWilsonCandidates);
        }

        let flags = self.wilson.evaluate(shell, self.config.wilson_prob_level);
        let candidates = flags.candidates(shell);
        match candidates.items.as_slice() {
            [] => return OutlierResult::empty(DecisionBranch::NoWilsonCandidates),
            [only] => {
                let keep = only.probability <= self.config.thresholds.conservative_prob;
                debug!(probability = only.probability, keep, "single wilson candidate");
                let positions = if keep { vec![only.position] } else { Vec::new() };
                return OutlierResult {
                    indices: shell.to_miller(&positions),
                    branch: DecisionBranch::SingleCandidate,
                    cluster_prob: Vec::new(),
                };
            }
            _ => {}
        }

        let validation = match self.config.sweep_prob_ceiling {
            Some(ceiling) => candidates.capped(ceiling),
            None => candidates,
        };
        let features = FeatureArray::from_shell(shell).rescaled(self.config.scale_percentile);
        let outcomes = self.engine.sweep(&features, &validation);
        let tally = ConsensusTally::from_outcomes(&outcomes);
        let decision = self.reducer.reduce(&tally, &validation);

        let mut cluster_prob: Vec<_> = tally
            .positions()
            .into_iter()
            .map(|p| (shell.original_index(p), shell.miller_at(p), tally.cluster_prob(p)))
            .collect();
        cluster_prob.sort_by_key(|(original, _, _)| *original);

        let result = OutlierResult {
            indices: shell.to_miller(&decision.positions),
            branch: decision.branch,
            cluster_prob: cluster_prob.into_iter().map(|(_, m, p)| (m, p)).collect(),
        };
        debug!(
            shell = shell.len(),
            candidates = validation.len(),
            sweeps = outcomes.len(),
            outliers = result.len(),
            branch = ?result.branch,
            "detection finished"
        );
        result
    }
}
