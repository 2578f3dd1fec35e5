//! Seeded synthetic diffraction data following Wilson statistics.
//!
//! True intensities are drawn from the Wilson prior of each population scaled by
//! an isotropic falloff `Σ(d) = scale · exp(-B / (2d²))`:
//!
//! - acentric: `I = Σ · Exp(1)`
//! - centric:  `I = Σ · z²`, `z ~ N(0, 1)`
//!
//! Observations add Gaussian measurement noise. A chosen number of the lowest
//! resolution reflections can be replaced by weak measurements (e.g. shadowed by
//! the beamstop), which is what the detector is meant to find.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Exp1, Normal, StandardNormal};

use crate::domain::{MillerIndex, ObservationKind, Reflection, ReflectionSet};
use crate::error::{NemoError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub label: String,
    pub kind: ObservationKind,
    pub reflections: usize,
    /// Resolution range (Å), `d_min < d_max`.
    pub d_min: f64,
    pub d_max: f64,
    pub centric_fraction: f64,
    pub scale: f64,
    pub b_factor: f64,
    /// Measurement sigma relative to `Σ(d)`.
    pub relative_sigma: f64,
    /// Number of lowest-resolution reflections replaced by weak measurements.
    pub weak: usize,
    /// Weak measurements are `weak_fraction · Σ(d)` on the intensity scale.
    pub weak_fraction: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            label: "IMEAN".to_string(),
            kind: ObservationKind::Intensity,
            reflections: 400,
            d_min: 4.0,
            d_max: 40.0,
            centric_fraction: 0.1,
            scale: 1000.0,
            b_factor: 20.0,
            relative_sigma: 0.05,
            weak: 0,
            weak_fraction: 0.001,
            seed: 7,
        }
    }
}

/// The generated set and which Miller indices were made weak.
#[derive(Debug, Clone)]
pub struct SyntheticData {
    pub set: ReflectionSet,
    pub weak: Vec<MillerIndex>,
}

fn wilson_scale(config: &SyntheticConfig, d: f64) -> f64 {
    config.scale * (-config.b_factor / (2.0 * d * d)).exp()
}

/// Miller index for the `i`-th synthetic reflection (unique per `i`).
fn miller_for(i: usize) -> MillerIndex {
    let i = i as i32;
    MillerIndex::new(i % 32, (i / 32) % 32, i / 1024)
}

pub fn generate(config: &SyntheticConfig) -> Result<SyntheticData> {
    if config.reflections == 0 {
        return Err(NemoError::invalid_input("Reflection count must be > 0."));
    }
    if !(config.d_min.is_finite() && config.d_max.is_finite() && config.d_min > 0.0 && config.d_max > config.d_min) {
        return Err(NemoError::invalid_input("Invalid resolution range for synthetic data."));
    }
    if !(0.0..=1.0).contains(&config.centric_fraction) {
        return Err(NemoError::invalid_input("centric_fraction must be within [0, 1]."));
    }
    if !(config.scale > 0.0 && config.relative_sigma > 0.0 && config.weak_fraction >= 0.0) {
        return Err(NemoError::invalid_input("Invalid scale or noise settings."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = Normal::new(0.0, 1.0)
        .map_err(|e| NemoError::invalid_input(format!("Noise distribution error: {e}")))?;

    // Reciprocal-space volume grows as s³: sample s³ uniformly.
    let (s3_lo, s3_hi) = (config.d_max.powi(-3), config.d_min.powi(-3));

    let mut reflections = Vec::with_capacity(config.reflections);
    for i in 0..config.reflections {
        let d = rng.gen_range(s3_lo..s3_hi).cbrt().recip();
        let centric = rng.gen_bool(config.centric_fraction);
        let sigma_scale = wilson_scale(config, d);
        let true_intensity = if centric {
            let z: f64 = rng.sample(StandardNormal);
            sigma_scale * z * z
        } else {
            let e: f64 = rng.sample(Exp1);
            sigma_scale * e
        };
        let sigma_i = config.relative_sigma * sigma_scale;
        let observed = true_intensity + sigma_i * noise.sample(&mut rng);

        let (value, sigma) = match config.kind {
            ObservationKind::Intensity => (observed, sigma_i),
            ObservationKind::Amplitude => {
                let f = observed.max(0.0).sqrt();
                // σ_F ≈ σ_I / 2F, floored for vanishing amplitudes.
                (f, sigma_i / (2.0 * f.max(sigma_i.sqrt())))
            }
        };
        reflections.push(Reflection::new(miller_for(i), d, value, sigma, centric));
    }

    let mut by_resolution: Vec<usize> = (0..reflections.len()).collect();
    by_resolution.sort_by(|&a, &b| reflections[b].d_spacing.total_cmp(&reflections[a].d_spacing));
    let mut weak = Vec::with_capacity(config.weak);
    for &i in by_resolution.iter().take(config.weak) {
        let r = &mut reflections[i];
        let faint = config.weak_fraction * wilson_scale(config, r.d_spacing);
        r.value = match config.kind {
            ObservationKind::Intensity => faint,
            ObservationKind::Amplitude => faint.sqrt(),
        };
        weak.push(r.miller);
    }

    let label = config.label.clone();
    let observation_type = config.kind.display_name();
    Ok(SyntheticData {
        set: ReflectionSet::new(label, observation_type, reflections),
        weak,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_data() {
        let config = SyntheticConfig::default();
        let a = generate(&config).unwrap();
        let b = generate(&config).unwrap();
        assert_eq!(a.set, b.set);
    }

    #[test]
    fn generated_set_is_valid() {
        let config = SyntheticConfig {
            weak: 4,
            ..SyntheticConfig::default()
        };
        let data = generate(&config).unwrap();
        data.set.validate().unwrap();
        assert_eq!(data.set.len(), config.reflections);
        assert_eq!(data.weak.len(), 4);
        assert!(data
            .set
            .reflections
            .iter()
            .all(|r| r.d_spacing >= config.d_min && r.d_spacing <= config.d_max));
    }

    #[test]
    fn weak_reflections_are_the_lowest_resolution_ones() {
        let config = SyntheticConfig {
            weak: 3,
            ..SyntheticConfig::default()
        };
        let data = generate(&config).unwrap();
        let max_other = data
            .set
            .reflections
            .iter()
            .filter(|r| !data.weak.contains(&r.miller))
            .map(|r| r.d_spacing)
            .fold(0.0, f64::max);
        for r in data.set.reflections.iter().filter(|r| data.weak.contains(&r.miller)) {
            assert!(r.d_spacing >= max_other);
        }
    }

    #[test]
    fn rejects_empty_request() {
        let config = SyntheticConfig {
            reflections: 0,
            ..SyntheticConfig::default()
        };
        assert!(generate(&config).is_err());
    }
}
