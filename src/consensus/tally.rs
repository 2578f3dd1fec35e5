//! Occurrence counts across sweep outcomes.

use std::collections::BTreeMap;

use crate::domain::SweepOutcome;

/// Shell position → number of sweep iterations whose candidate set contained it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsensusTally {
    pub counts: BTreeMap<usize, usize>,
    /// Iterations that produced a candidate set.
    pub productive_iterations: usize,
}

impl ConsensusTally {
    /// Fold an ordered sequence of sweep outcomes into a tally.
    pub fn from_outcomes(outcomes: &[SweepOutcome]) -> Self {
        outcomes
            .iter()
            .filter_map(SweepOutcome::candidate_set)
            .fold(Self::default(), |mut tally, set| {
                tally.productive_iterations += 1;
                for &p in &set.positions {
                    *tally.counts.entry(p).or_insert(0) += 1;
                }
                tally
            })
    }

    /// No iteration produced a candidate set.
    pub fn is_empty(&self) -> bool {
        self.productive_iterations == 0
    }

    /// Number of distinct tallied positions.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn count(&self, position: usize) -> usize {
        self.counts.get(&position).copied().unwrap_or(0)
    }

    /// Sorted, unique occurrence counts.
    pub fn count_levels(&self) -> Vec<usize> {
        let mut levels: Vec<usize> = self.counts.values().copied().collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }

    pub fn max_count(&self) -> usize {
        self.counts.values().copied().max().unwrap_or(0)
    }

    /// `count / productive iterations`, or 0 when nothing was productive.
    pub fn cluster_prob(&self, position: usize) -> f64 {
        if self.productive_iterations == 0 {
            return 0.0;
        }
        self.count(position) as f64 / self.productive_iterations as f64
    }

    pub fn positions(&self) -> Vec<usize> {
        self.counts.keys().copied().collect()
    }
}
