use nemo_outliers::data::{BinnedNormalizer, InMemoryProvider, SyntheticConfig, generate};
use nemo_outliers::domain::{DecisionBranch, ObservationKind};
use nemo_outliers::prepare::{NormalizedValue, ShellNormalizer};
use nemo_outliers::{DetectionConfig, MillerIndex, NemoDetector, NemoError, Reflection, ReflectionSet};

/// Treats measured amplitudes as already normalized.
struct PassThrough;

impl ShellNormalizer for PassThrough {
    fn normalize(
        &self,
        set: &ReflectionSet,
        _kind: ObservationKind,
    ) -> nemo_outliers::Result<Vec<NormalizedValue>> {
        Ok(set
            .reflections
            .iter()
            .map(|r| NormalizedValue {
                value: r.value * r.value,
                sigma: 2.0 * r.value * r.sigma,
            })
            .collect())
    }
}

/// 17 well-measured amplitudes across the low-resolution shell, `weak` faint ones
/// near 12 Å, and two faint ones beyond the 10 Å cutoff.
fn amplitude_set(weak: &[f64]) -> ReflectionSet {
    let mut reflections: Vec<Reflection> = (0..17)
        .map(|i| {
            let d = 10.5 + 1.7 * i as f64;
            let f = 0.9 + 0.7 * ((i * 7) % 17) as f64 / 16.0;
            Reflection::new(MillerIndex::new(i, 0, 1), d, f, 0.005, false)
        })
        .collect();
    for (j, &f) in weak.iter().enumerate() {
        let d = 12.0 + 0.01 * j as f64;
        reflections.push(Reflection::new(MillerIndex::new(j as i32, 3, 3), d, f, 0.005, false));
    }
    reflections.push(Reflection::new(MillerIndex::new(9, 9, 9), 8.0, 0.05, 0.005, false));
    reflections.push(Reflection::new(MillerIndex::new(8, 8, 8), 6.5, 0.04, 0.005, false));
    ReflectionSet::new("FP", "F", reflections)
}

/// 120 reflections from 40 Å down to 5.7 Å whose true `E²` follow Wilson (Exp(1))
/// quantiles, every seventh one centric. The `weak` lowest-resolution reflections
/// are measured at 0.2 % of the local mean intensity.
fn wilson_set(label: &str, kind: ObservationKind, weak: usize) -> ReflectionSet {
    let n = 120;
    let reflections = (0..n)
        .map(|i| {
            let d = 40.0 / (1.0 + 0.05 * i as f64);
            let mean = 1000.0 * (-10.0 / (d * d)).exp();
            let u = 0.15 + 0.8 * (((i * 37) % n) as f64 + 0.5) / n as f64;
            let e_sq = if i < weak { 0.002 } else { -(1.0 - u).ln() };
            let sigma_i = 0.04 * mean;
            let (value, sigma) = match kind {
                ObservationKind::Intensity => (mean * e_sq, sigma_i),
                ObservationKind::Amplitude => {
                    let f = (mean * e_sq).sqrt();
                    (f, sigma_i / (2.0 * f))
                }
            };
            Reflection::new(MillerIndex::new(i as i32, 1, 2), d, value, sigma, i % 7 == 5)
        })
        .collect();
    ReflectionSet::new(label, kind.display_name(), reflections)
}

fn planted(weak: usize) -> Vec<MillerIndex> {
    (0..weak as i32).map(|h| MillerIndex::new(h, 1, 2)).collect()
}

#[test]
fn weak_low_resolution_group_is_detected() {
    let set = amplitude_set(&[0.05, 0.05, 0.05]);
    let provider = InMemoryProvider::new().with(set);
    let detector = NemoDetector::new(DetectionConfig::default()).unwrap();

    let result = detector.detect(&provider, "FP", &PassThrough).unwrap();

    assert_eq!(result.branch, DecisionBranch::UniformRecurring);
    assert_eq!(
        result.indices,
        vec![
            MillerIndex::new(0, 3, 3),
            MillerIndex::new(1, 3, 3),
            MillerIndex::new(2, 3, 3),
        ]
    );
    assert!(!result.contains(&MillerIndex::new(9, 9, 9)));
    for (_, p) in &result.cluster_prob {
        assert!((p - 1.0).abs() < 1e-12, "cluster_prob {p}");
    }
}

#[test]
fn pair_clustered_once_falls_back_to_conservative_candidates() {
    let detector = NemoDetector::default();

    // P ≈ 0.008: flagged, clustered together in the only sweep iteration, not conservative.
    let result = detector.detect_set(&amplitude_set(&[0.09, 0.09]), &PassThrough).unwrap();
    assert_eq!(result.branch, DecisionBranch::PairSeenOnce);
    assert!(result.is_empty(), "{:?}", result.indices);

    // P ≈ 0.0025: same clustering, both survive the fallback.
    let result = detector.detect_set(&amplitude_set(&[0.05, 0.05]), &PassThrough).unwrap();
    assert_eq!(result.branch, DecisionBranch::PairSeenOnce);
    assert_eq!(result.indices, vec![MillerIndex::new(0, 3, 3), MillerIndex::new(1, 3, 3)]);
}

#[test]
fn planted_weak_intensities_are_detected() {
    let provider = InMemoryProvider::new().with(wilson_set("IMEAN", ObservationKind::Intensity, 4));
    let result = NemoDetector::default()
        .detect(&provider, "IMEAN", &BinnedNormalizer::default())
        .unwrap();

    assert_eq!(result.branch, DecisionBranch::UniformRecurring);
    assert_eq!(result.indices, planted(4));
    assert_eq!(result.cluster_prob.len(), 4);
    assert!(result.cluster_prob.iter().all(|(_, p)| (p - 1.0).abs() < 1e-12));
}

#[test]
fn planted_weak_amplitudes_are_detected() {
    let set = wilson_set("FP", ObservationKind::Amplitude, 5);
    let result = NemoDetector::default()
        .detect_set(&set, &BinnedNormalizer::default())
        .unwrap();

    assert_eq!(result.branch, DecisionBranch::UniformRecurring);
    assert_eq!(result.indices, planted(5));
}

#[test]
fn noise_only_sweep_keeps_conservative_candidates() {
    // Three flagged reflections cannot split into two clusters of two or more,
    // so every sweep iteration labels them all as noise.
    let reflections = vec![
        Reflection::new(MillerIndex::new(1, 0, 0), 31.0, 0.0317, 0.02, false),
        Reflection::new(MillerIndex::new(2, 0, 0), 24.0, 0.0548, 0.02, false),
        Reflection::new(MillerIndex::new(3, 0, 0), 17.5, 0.142, 0.02, false),
        Reflection::new(MillerIndex::new(4, 0, 0), 9.0, 1.1, 0.02, false),
        Reflection::new(MillerIndex::new(5, 0, 0), 7.0, 0.8, 0.02, false),
    ];
    let set = ReflectionSet::new("FP", "F", reflections);
    let result = NemoDetector::default().detect_set(&set, &PassThrough).unwrap();

    // P ≈ 0.001, 0.003 and 0.02: only the first two are at or below 0.005.
    assert_eq!(result.branch, DecisionBranch::NoCandidateSets);
    assert_eq!(result.indices, vec![MillerIndex::new(1, 0, 0), MillerIndex::new(2, 0, 0)]);
    assert!(result.cluster_prob.is_empty());
}

#[test]
fn zero_sigma_reflection_is_rejected() {
    let mut set = amplitude_set(&[0.05, 0.05, 0.05]);
    // The strong reflection at 37.7 Å.
    set.reflections[16].sigma = 0.0;
    let err = NemoDetector::default().detect_set(&set, &PassThrough).unwrap_err();
    assert!(matches!(err, NemoError::InvalidInput(_)), "{err:?}");
}

#[test]
fn reported_reflections_lie_beyond_the_cutoff() {
    let config = DetectionConfig::default();
    let data = generate(&SyntheticConfig {
        weak: 3,
        ..SyntheticConfig::default()
    })
    .unwrap();
    let detector = NemoDetector::new(config.clone()).unwrap();
    let normalizer = BinnedNormalizer::default();

    let first = detector.detect_set(&data.set, &normalizer).unwrap();
    let second = detector.detect_set(&data.set, &normalizer).unwrap();
    assert_eq!(first, second);

    for miller in &first.indices {
        let reflection = data
            .set
            .reflections
            .iter()
            .find(|r| r.miller == *miller)
            .expect("reported index exists in the input");
        assert!(
            reflection.d_spacing > config.resolution_cutoff,
            "{miller} at {} Å is inside the cutoff",
            reflection.d_spacing
        );
    }
}

#[test]
fn amplitude_synthetic_data_runs_end_to_end() {
    let data = generate(&SyntheticConfig {
        label: "FP".into(),
        kind: ObservationKind::Amplitude,
        weak: 2,
        seed: 11,
        ..SyntheticConfig::default()
    })
    .unwrap();
    let provider = InMemoryProvider::new().with(data.set.clone());
    let result = NemoDetector::default()
        .detect(&provider, "FP", &BinnedNormalizer::default())
        .unwrap();
    // Reported in input order, each index once.
    let input_order: Vec<usize> = result
        .indices
        .iter()
        .map(|m| {
            data.set
                .reflections
                .iter()
                .position(|r| r.miller == *m)
                .expect("reported index exists in the input")
        })
        .collect();
    assert!(input_order.windows(2).all(|w| w[0] < w[1]), "{input_order:?}");
    assert!(result.cluster_prob.iter().all(|(_, p)| (0.0..=1.0).contains(p)));
}

#[test]
fn unsupported_observation_type_aborts_the_run() {
    let mut set = amplitude_set(&[0.05]);
    set.observation_type = "anomalous_difference".into();
    let err = NemoDetector::default().detect_set(&set, &PassThrough).unwrap_err();
    assert!(matches!(err, NemoError::UnsupportedObservationType { .. }), "{err:?}");
}

#[test]
fn missing_label_is_reported() {
    let provider = InMemoryProvider::new();
    let err = NemoDetector::default()
        .detect(&provider, "IMEAN", &PassThrough)
        .unwrap_err();
    assert_eq!(err, NemoError::MissingObservation("IMEAN".into()));
}

#[test]
fn shell_without_reflections_beyond_cutoff_is_empty() {
    let config = DetectionConfig {
        resolution_cutoff: 50.0,
        ..DetectionConfig::default()
    };
    let result = NemoDetector::new(config)
        .unwrap()
        .detect_set(&amplitude_set(&[0.05, 0.05]), &PassThrough)
        .unwrap();
    assert!(result.is_empty());
}
