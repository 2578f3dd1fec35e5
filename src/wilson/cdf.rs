//! Cumulative Wilson distributions.
//!
//! With `E` the normalized amplitude and `E²` the normalized intensity:
//!
//! - acentric amplitude: `P(E < e) = 1 - exp(-e²)`
//! - centric amplitude:  `P(E < e) = 1 - erfc(e/√2)`
//! - acentric intensity with Gaussian measurement error σ (Read & McCoy, 2016):
//!   `P(E²_obs < e²) = ½ [erfc(-e²/(√2σ)) - exp((σ² - 2e²)/2) · erfc((σ² - e²)/(√2σ))]`
//! - centric intensity: no closed form; the double integral
//!   `∫_{-∞}^{e²} ∫_0^∞ N(y; x, σ) · exp(-x/2)/√(2πx) dx dy`
//!
//! As σ → 0 each intensity form tends to its amplitude counterpart at `e = √e²`.

use std::f64::consts::{PI, SQRT_2};

use rayon::prelude::*;
use statrs::function::erf::erfc;
use tracing::trace;

use crate::math::{InnerRange, Integrator, Quadrature};

/// Half-width (in σ) of the window bracketing the Gaussian peak of the centric integrand.
const PEAK_WINDOW: f64 = 6.0;

/// `P(E < e)` for an acentric normalized amplitude.
pub fn cumprob_ac_amplitude(e: f64) -> f64 {
    // 1 - exp(-e²) computed as -expm1(-e²).
    -(-e * e).exp_m1()
}

/// `P(E < e)` for a centric normalized amplitude.
pub fn cumprob_c_amplitude(e: f64) -> f64 {
    1.0 - erfc(e / SQRT_2)
}

/// `P(E²_obs < e_sq)` for an acentric normalized intensity measured with error `sig`.
pub fn cumprob_ac_intensity(e_sq: f64, sig: f64) -> f64 {
    if !(sig > 0.0) {
        return cumprob_ac_amplitude(e_sq.max(0.0).sqrt());
    }
    let var = sig * sig;
    let head = erfc(-e_sq / SQRT_2 / sig);
    let tail = erfc((var - e_sq) / SQRT_2 / sig);
    // exp() may overflow for very negative e_sq while erfc() underflows to zero.
    let damped = if tail == 0.0 {
        0.0
    } else {
        ((var - 2.0 * e_sq) / 2.0).exp() * tail
    };
    (0.5 * (head - damped)).clamp(0.0, 1.0)
}

/// Vectorized `cumprob_ac_intensity` over paired slices.
pub fn cumprob_ac_intensity_all(e_sq: &[f64], sig: &[f64]) -> Vec<f64> {
    e_sq.iter()
        .zip(sig.iter())
        .map(|(&e, &s)| cumprob_ac_intensity(e, s))
        .collect()
}

/// Joint density of true centric intensity `x` and observed intensity `y`.
pub fn centric_intensity_integrand(x: f64, y: f64, sig: f64) -> f64 {
    if !(x > 0.0) {
        return 0.0;
    }
    let z = (y - x) / sig;
    let measurement = (-0.5 * z * z).exp() / (sig * (2.0 * PI).sqrt());
    let prior = (-0.5 * x).exp() / (2.0 * PI * x).sqrt();
    measurement * prior
}

/// `P(E²_obs < e_sq)` for one centric reflection, with the raw quadrature diagnostics.
pub fn cumprob_c_intensity_one(e_sq: f64, sig: f64, engine: &Integrator) -> Quadrature {
    if !(sig > 0.0) {
        let value = cumprob_c_amplitude(e_sq.max(0.0).sqrt());
        return Quadrature {
            value,
            abs_error: 0.0,
            converged: true,
            subintervals: 0,
            warnings: 0,
        };
    }
    let window = PEAK_WINDOW * sig;
    let q = engine.integrate_2d(
        |x, y| centric_intensity_integrand(x, y, sig),
        |y| InnerRange {
            lo: 0.0,
            hi: f64::INFINITY,
            points: vec![y - window, y, y + window],
        },
        f64::NEG_INFINITY,
        e_sq,
        &[-window, 0.0, window],
    );
    Quadrature {
        value: q.value.clamp(0.0, 1.0),
        ..q
    }
}

/// Vectorized centric-intensity CDF.
///
/// Elements are independent and evaluated in parallel. Slowly convergent
/// integrals are expected; they are logged at trace level and otherwise ignored.
pub fn cumprob_c_intensity(e_sq: &[f64], sig: &[f64], engine: &Integrator) -> Vec<f64> {
    e_sq.par_iter()
        .zip(sig.par_iter())
        .map(|(&e, &s)| {
            let q = cumprob_c_intensity_one(e, s, engine);
            if q.warnings > 0 {
                trace!(
                    e_sq = e,
                    sigma = s,
                    warnings = q.warnings,
                    "centric intensity integral is probably divergent, or slowly convergent"
                );
            }
            q.value
        })
        .collect()
}
