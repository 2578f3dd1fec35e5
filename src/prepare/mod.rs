//! Data preparation: from a labelled reflection set to the low-resolution working shell.
//!
//! Steps:
//!
//! 1. resolve the observation type (fatal if neither amplitude nor intensity)
//! 2. normalize the full set through a `ShellNormalizer`
//! 3. sort by descending d-spacing and keep `d > cutoff`
//! 4. epsilon-correct (amplitudes additionally take the square root)
//! 5. partition positions into centric / acentric

use std::cmp::Ordering;

use tracing::debug;

use crate::domain::{NormalizedObservations, ObservationKind, PreparedShell, ReflectionSet};
use crate::error::{NemoError, Result};

/// Queryable source of labelled observation arrays.
pub trait ReflectionProvider {
    fn reflection_set(&self, label: &str) -> Result<ReflectionSet>;
}

/// Normalized intensity `E²` and its sigma for one reflection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedValue {
    pub value: f64,
    pub sigma: f64,
}

/// Resolution-shell normalization routine.
///
/// Returns one `NormalizedValue` per reflection, in input order, expressed on the
/// intensity scale (`E²`) and not yet epsilon-corrected.
pub trait ShellNormalizer {
    fn normalize(&self, set: &ReflectionSet, kind: ObservationKind) -> Result<Vec<NormalizedValue>>;
}

/// Build the working shell for `set`: reflections with `d_spacing > cutoff`.
pub fn prepare_shell(
    set: &ReflectionSet,
    cutoff: f64,
    normalizer: &dyn ShellNormalizer,
) -> Result<PreparedShell> {
    let kind = ObservationKind::resolve(&set.label, &set.observation_type)?;
    set.validate()?;

    let normalized = normalizer.normalize(set, kind)?;
    if normalized.len() != set.len() {
        return Err(NemoError::invalid_input(format!(
            "Normalizer returned {} values for {} reflections in '{}'.",
            normalized.len(),
            set.len(),
            set.label
        )));
    }

    // Stable: equal d-spacings keep their original relative order.
    let mut sorted_arg: Vec<usize> = (0..set.len()).collect();
    sorted_arg.sort_by(|&a, &b| {
        set.reflections[b]
            .d_spacing
            .partial_cmp(&set.reflections[a].d_spacing)
            .unwrap_or(Ordering::Equal)
    });
    let selected: Vec<usize> = sorted_arg
        .iter()
        .copied()
        .take_while(|&i| set.reflections[i].d_spacing > cutoff)
        .collect();

    let mut d_spacing = Vec::with_capacity(selected.len());
    let mut value = Vec::with_capacity(selected.len());
    let mut sigma = Vec::with_capacity(selected.len());
    let mut centric = Vec::new();
    let mut acentric = Vec::new();
    let mut norm_value = Vec::with_capacity(selected.len());
    let mut norm_sigma = Vec::with_capacity(selected.len());

    for (position, &i) in selected.iter().enumerate() {
        let r = &set.reflections[i];
        let n = normalized[i];
        if !(n.value.is_finite() && n.sigma.is_finite()) {
            return Err(NemoError::invalid_input(format!(
                "Normalized value of {} in '{}' is not finite.",
                r.miller, set.label
            )));
        }
        d_spacing.push(r.d_spacing);
        value.push(r.value);
        sigma.push(r.sigma);
        norm_value.push(n.value / r.epsilon);
        norm_sigma.push(n.sigma / r.epsilon);
        if r.centric {
            centric.push(position);
        } else {
            acentric.push(position);
        }
    }

    let normalized = match kind {
        // Negative normalized intensities have no amplitude; they are treated as zero.
        ObservationKind::Amplitude => NormalizedObservations::Amplitude {
            e: norm_value.iter().map(|v| v.max(0.0).sqrt()).collect(),
        },
        ObservationKind::Intensity => NormalizedObservations::Intensity {
            e_sq: norm_value,
            sigma: norm_sigma,
        },
    };

    debug!(
        label = %set.label,
        kind = kind.display_name(),
        total = set.len(),
        shell = selected.len(),
        centric = centric.len(),
        cutoff,
        "working shell prepared"
    );

    Ok(PreparedShell {
        kind,
        miller: set.reflections.iter().map(|r| r.miller).collect(),
        sorted_arg,
        d_spacing,
        value,
        sigma,
        centric,
        acentric,
        normalized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MillerIndex, Reflection};

    /// Hands back the raw values on the intensity scale.
    struct Identity;

    impl ShellNormalizer for Identity {
        fn normalize(&self, set: &ReflectionSet, kind: ObservationKind) -> Result<Vec<NormalizedValue>> {
            Ok(set
                .reflections
                .iter()
                .map(|r| match kind {
                    ObservationKind::Amplitude => NormalizedValue {
                        value: r.value * r.value,
                        sigma: 2.0 * r.value * r.sigma,
                    },
                    ObservationKind::Intensity => NormalizedValue {
                        value: r.value,
                        sigma: r.sigma,
                    },
                })
                .collect())
        }
    }

    fn set(kind: &str) -> ReflectionSet {
        let mut reflections = vec![
            Reflection::new(MillerIndex::new(1, 0, 0), 12.0, 4.0, 0.5, false),
            Reflection::new(MillerIndex::new(2, 0, 0), 25.0, 9.0, 0.5, true),
            Reflection::new(MillerIndex::new(3, 0, 0), 3.0, 1.0, 0.5, false),
            Reflection::new(MillerIndex::new(4, 0, 0), 15.0, 16.0, 0.5, false),
        ];
        reflections[3].epsilon = 2.0;
        ReflectionSet::new("obs", kind, reflections)
    }

    #[test]
    fn shell_is_sorted_by_descending_resolution_and_cut() {
        let shell = prepare_shell(&set("F"), 10.0, &Identity).unwrap();
        assert_eq!(shell.len(), 3);
        assert_eq!(shell.d_spacing, vec![25.0, 15.0, 12.0]);
        assert_eq!(&shell.sorted_arg[..3], &[1, 3, 0]);
        assert_eq!(shell.miller_at(0), MillerIndex::new(2, 0, 0));
        assert!(shell.d_spacing.iter().all(|&d| d > 10.0));
    }

    #[test]
    fn partitions_cover_the_shell() {
        let shell = prepare_shell(&set("F"), 10.0, &Identity).unwrap();
        assert_eq!(shell.centric, vec![0]);
        assert_eq!(shell.acentric, vec![1, 2]);
        let mut all: Vec<usize> = shell.centric.iter().chain(&shell.acentric).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..shell.len()).collect::<Vec<_>>());
    }

    #[test]
    fn amplitudes_are_epsilon_corrected_square_roots() {
        let shell = prepare_shell(&set("amplitude"), 10.0, &Identity).unwrap();
        let NormalizedObservations::Amplitude { e } = &shell.normalized else {
            panic!("expected amplitudes");
        };
        // (16² / 2).sqrt() for the epsilon = 2 reflection at position 1.
        assert!((e[1] - (128.0f64).sqrt()).abs() < 1e-12);
        assert!((e[0] - 9.0).abs() < 1e-12);
    }

    #[test]
    fn intensities_carry_sigma() {
        let shell = prepare_shell(&set("I"), 10.0, &Identity).unwrap();
        let NormalizedObservations::Intensity { e_sq, sigma } = &shell.normalized else {
            panic!("expected intensities");
        };
        assert_eq!(e_sq, &vec![9.0, 8.0, 4.0]);
        assert_eq!(sigma, &vec![0.5, 0.25, 0.5]);
    }

    #[test]
    fn unsupported_observation_type_is_fatal() {
        let err = prepare_shell(&set("phase"), 10.0, &Identity).unwrap_err();
        assert!(matches!(err, NemoError::UnsupportedObservationType { .. }));
    }

    #[test]
    fn cutoff_beyond_every_reflection_gives_empty_shell() {
        let shell = prepare_shell(&set("I"), 100.0, &Identity).unwrap();
        assert!(shell.is_empty());
        assert!(shell.normalized.is_empty());
    }
}
