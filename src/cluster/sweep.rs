//! Minimum-cluster-size sweep validated against Wilson candidates.

use tracing::trace;

use crate::cluster::features::FeatureArray;
use crate::cluster::hdbscan::{ClusterRun, Hdbscan};
use crate::domain::{CandidateSet, DetectionConfig, SweepOutcome, WilsonCandidates};

/// Runs one HDBSCAN fit per minimum cluster size, from the candidate count down to 2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterConsensusEngine {
    /// Minimum membership probability for a point to count towards its label.
    pub membership_threshold: f64,
    /// A label is retained when its Wilson-candidate fraction exceeds this.
    pub overlap_threshold: f64,
}

impl Default for ClusterConsensusEngine {
    fn default() -> Self {
        Self {
            membership_threshold: 0.5,
            overlap_threshold: 0.5,
        }
    }
}

impl ClusterConsensusEngine {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            membership_threshold: config.membership_threshold,
            overlap_threshold: config.overlap_threshold,
        }
    }

    /// One outcome per sweep value, in sweep order (largest minimum cluster size first).
    ///
    /// Fewer than two candidates leave nothing to sweep.
    pub fn sweep(&self, features: &FeatureArray, candidates: &WilsonCandidates) -> Vec<SweepOutcome> {
        let mut is_candidate = vec![false; features.len()];
        for &p in candidates.positions().iter().filter(|&&p| p < features.len()) {
            is_candidate[p] = true;
        }

        (2..=candidates.len())
            .rev()
            .map(|min_cluster_size| {
                let outcome = self.run_once(features, &is_candidate, min_cluster_size);
                match &outcome {
                    SweepOutcome::Success(set) => trace!(
                        min_cluster_size,
                        retained = set.positions.len(),
                        "sweep iteration produced a candidate set"
                    ),
                    SweepOutcome::NoCluster { .. } => {
                        trace!(min_cluster_size, "sweep iteration found no validated cluster")
                    }
                    SweepOutcome::DegenerateFit { reason, .. } => {
                        trace!(min_cluster_size, %reason, "sweep iteration skipped")
                    }
                }
                outcome
            })
            .collect()
    }

    fn run_once(&self, features: &FeatureArray, is_candidate: &[bool], min_cluster_size: usize) -> SweepOutcome {
        match Hdbscan::new(min_cluster_size).fit(features.points()) {
            Ok(run) => self.validate(&run, is_candidate),
            Err(err) => SweepOutcome::DegenerateFit {
                min_cluster_size,
                reason: err.to_string(),
            },
        }
    }

    /// Keep every label whose confident members are mostly Wilson candidates.
    pub fn validate(&self, run: &ClusterRun, is_candidate: &[bool]) -> SweepOutcome {
        let mut positions = Vec::new();
        for label in 0..run.n_clusters() {
            let members = run.members(label as i32, self.membership_threshold);
            if members.is_empty() {
                continue;
            }
            let overlap = members
                .iter()
                .filter(|&&p| is_candidate.get(p).copied().unwrap_or(false))
                .count();
            if overlap as f64 / members.len() as f64 > self.overlap_threshold {
                positions.extend(members);
            }
        }
        positions.sort_unstable();
        positions.dedup();

        if positions.is_empty() {
            SweepOutcome::NoCluster {
                min_cluster_size: run.min_cluster_size,
            }
        } else {
            SweepOutcome::Success(CandidateSet {
                min_cluster_size: run.min_cluster_size,
                positions,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::hdbscan::NOISE;
    use crate::domain::WilsonCandidate;

    fn candidates(positions: &[usize], probability: f64) -> WilsonCandidates {
        WilsonCandidates {
            items: positions
                .iter()
                .map(|&position| WilsonCandidate {
                    position,
                    probability,
                    inv_res_sq: 0.005,
                })
                .collect(),
        }
    }

    /// 17 well-measured reflections spread over the shell and three weak ones
    /// sitting together at the low-resolution end.
    fn weak_group_features() -> FeatureArray {
        let mut inv_res_sq = vec![0.0010, 0.0011, 0.0012];
        let mut ratio = vec![2.0, 2.5, 3.0];
        for i in 0..17 {
            inv_res_sq.push(0.0015 + 0.0005 * i as f64);
            ratio.push(200.0 + 6.0 * i as f64);
        }
        FeatureArray::new(&inv_res_sq, &ratio).rescaled(80.0)
    }

    #[test]
    fn every_sweep_value_recovers_the_weak_group() {
        let engine = ClusterConsensusEngine::default();
        let outcomes = engine.sweep(&weak_group_features(), &candidates(&[0, 1, 2], 0.03));
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].min_cluster_size(), 3);
        assert_eq!(outcomes[1].min_cluster_size(), 2);
        for outcome in &outcomes {
            let set = outcome.candidate_set().expect("candidate set");
            assert_eq!(set.positions, vec![0, 1, 2], "{outcome:?}");
        }
    }

    #[test]
    fn fewer_than_two_candidates_do_not_sweep() {
        let engine = ClusterConsensusEngine::default();
        assert!(engine.sweep(&weak_group_features(), &candidates(&[0], 0.03)).is_empty());
    }

    #[test]
    fn non_finite_features_are_skipped_as_degenerate() {
        let features = FeatureArray::new(&[0.001, 0.002, 0.003], &[1.0, f64::INFINITY, 2.0]);
        let outcomes = ClusterConsensusEngine::default().sweep(&features, &candidates(&[0, 2], 0.01));
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], SweepOutcome::DegenerateFit { min_cluster_size: 2, .. }));
    }

    #[test]
    fn labels_dominated_by_non_candidates_are_dropped() {
        let run = ClusterRun {
            min_cluster_size: 2,
            labels: vec![0, 0, 0, 1, 1, NOISE],
            probabilities: vec![1.0, 1.0, 0.9, 1.0, 0.8, 0.0],
        };
        let is_candidate = [true, false, false, true, true, true];
        let outcome = ClusterConsensusEngine::default().validate(&run, &is_candidate);
        let set = outcome.candidate_set().unwrap();
        assert_eq!(set.positions, vec![3, 4]);
    }

    #[test]
    fn retained_label_keeps_its_non_candidate_members() {
        let run = ClusterRun {
            min_cluster_size: 3,
            labels: vec![0, 0, 0, NOISE],
            probabilities: vec![1.0, 1.0, 1.0, 0.0],
        };
        let is_candidate = [true, true, false, false];
        let outcome = ClusterConsensusEngine::default().validate(&run, &is_candidate);
        assert_eq!(outcome.candidate_set().unwrap().positions, vec![0, 1, 2]);
    }

    #[test]
    fn low_membership_points_do_not_count() {
        let run = ClusterRun {
            min_cluster_size: 2,
            labels: vec![0, 0, 0],
            probabilities: vec![0.4, 0.3, 1.0],
        };
        let outcome = ClusterConsensusEngine::default().validate(&run, &[true, true, false]);
        assert_eq!(outcome, SweepOutcome::NoCluster { min_cluster_size: 2 });
    }
}
