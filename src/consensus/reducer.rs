//! Decision table turning a sweep tally into the final outlier positions.
//!
//! Rules are evaluated top-down; the first match wins.
//!
//! | tally                                   | result                                                   |
//! |-----------------------------------------|----------------------------------------------------------|
//! | no candidate sets                       | candidates with p ≤ conservative                         |
//! | 0 or 1 distinct positions               | candidates with p ≤ conservative                         |
//! | 2 positions, both seen once             | candidates with p ≤ conservative                         |
//! | 2 positions, otherwise                  | positions seen more than once                            |
//! | one shared count, equal to 1            | tallied positions ∩ candidates with p ≤ single-shot      |
//! | one shared count, above 1               | every tallied position                                   |
//! | varying counts                          | low-resolution improbable candidates ∪ recurring positions |

use std::collections::BTreeSet;

use tracing::debug;

use crate::consensus::tally::ConsensusTally;
use crate::domain::{ConsensusThresholds, DecisionBranch, WilsonCandidates};

/// Output of the reducer, in shell positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Sorted, unique shell positions.
    pub positions: Vec<usize>,
    pub branch: DecisionBranch,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConsensusReducer {
    pub thresholds: ConsensusThresholds,
}

impl ConsensusReducer {
    pub fn new(thresholds: ConsensusThresholds) -> Self {
        Self { thresholds }
    }

    pub fn reduce(&self, tally: &ConsensusTally, candidates: &WilsonCandidates) -> Decision {
        let t = &self.thresholds;
        let fallback = |branch| Decision::new(candidates.at_or_below(t.conservative_prob), branch);
        let levels = tally.count_levels();

        let decision = if tally.is_empty() {
            fallback(DecisionBranch::NoCandidateSets)
        } else if tally.distinct() <= 1 {
            fallback(DecisionBranch::TooFewIndices)
        } else if tally.distinct() == 2 {
            if levels == [1] {
                fallback(DecisionBranch::PairSeenOnce)
            } else {
                let recurring = tally
                    .counts
                    .iter()
                    .filter(|(_, c)| **c > 1)
                    .map(|(p, _)| *p)
                    .collect();
                Decision::new(recurring, DecisionBranch::PairRecurring)
            }
        } else if levels == [1] {
            let improbable: BTreeSet<usize> = candidates.at_or_below(t.single_shot_prob).into_iter().collect();
            let kept = tally
                .positions()
                .into_iter()
                .filter(|p| improbable.contains(p))
                .collect();
            Decision::new(kept, DecisionBranch::UniformSingleShot)
        } else if levels.len() == 1 {
            Decision::new(tally.positions(), DecisionBranch::UniformRecurring)
        } else {
            let reference = tally.max_count().min(candidates.len()) as f64;
            let cut = t.recurrence_ratio * reference;
            let low_res = candidates
                .items
                .iter()
                .filter(|c| c.probability <= t.low_res_prob && c.inv_res_sq <= t.low_res_inv_d2)
                .map(|c| c.position);
            let recurring = tally
                .counts
                .iter()
                .filter(|(_, c)| **c as f64 >= cut)
                .map(|(p, _)| *p);
            Decision::new(low_res.chain(recurring).collect(), DecisionBranch::VaryingCounts)
        };

        debug!(
            branch = ?decision.branch,
            distinct = tally.distinct(),
            productive = tally.productive_iterations,
            selected = decision.positions.len(),
            "consensus reduced"
        );
        decision
    }
}

impl Decision {
    fn new(mut positions: Vec<usize>, branch: DecisionBranch) -> Self {
        positions.sort_unstable();
        positions.dedup();
        Self { positions, branch }
    }
}
