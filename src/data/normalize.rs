//! Reference resolution-shell normalizer.
//!
//! Reflections are sorted by `1/d²` and split into bins of (nearly) equal count.
//! Within a bin, every intensity is divided by the bin's mean intensity, giving
//! `E²`. Amplitudes are squared first and their sigma propagated (`σ_I = 2Fσ_F`).

use std::cmp::Ordering;

use crate::domain::{ObservationKind, ReflectionSet};
use crate::error::{NemoError, Result};
use crate::prepare::{NormalizedValue, ShellNormalizer};

/// Default number of reflections per normalization bin.
pub const DEFAULT_BIN_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinnedNormalizer {
    pub bin_size: usize,
}

impl Default for BinnedNormalizer {
    fn default() -> Self {
        Self {
            bin_size: DEFAULT_BIN_SIZE,
        }
    }
}

impl BinnedNormalizer {
    pub fn new(bin_size: usize) -> Self {
        Self {
            bin_size: bin_size.max(1),
        }
    }
}

impl ShellNormalizer for BinnedNormalizer {
    fn normalize(&self, set: &ReflectionSet, kind: ObservationKind) -> Result<Vec<NormalizedValue>> {
        let n = set.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let intensity: Vec<(f64, f64)> = set
            .reflections
            .iter()
            .map(|r| match kind {
                ObservationKind::Amplitude => (r.value * r.value, 2.0 * r.value.abs() * r.sigma),
                ObservationKind::Intensity => (r.value, r.sigma),
            })
            .collect();

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            set.reflections[a]
                .inv_res_sq()
                .partial_cmp(&set.reflections[b].inv_res_sq())
                .unwrap_or(Ordering::Equal)
        });

        // Spread the remainder over the bins instead of leaving a tiny last bin.
        let bins = n.div_ceil(self.bin_size.max(1));
        let mut out = vec![NormalizedValue { value: 0.0, sigma: 0.0 }; n];
        let mut start = 0;
        for b in 0..bins {
            let end = start + (n - start) / (bins - b);
            let members = &order[start..end];
            let mean = members.iter().map(|&i| intensity[i].0 / set.reflections[i].epsilon).sum::<f64>()
                / members.len() as f64;
            if !(mean.is_finite() && mean > 0.0) {
                return Err(NemoError::invalid_input(format!(
                    "Resolution bin {b} of '{}' has non-positive mean intensity {mean}.",
                    set.label
                )));
            }
            for &i in members {
                out[i] = NormalizedValue {
                    value: intensity[i].0 / mean,
                    sigma: intensity[i].1 / mean,
                };
            }
            start = end;
        }
        Ok(out)
    }
}
