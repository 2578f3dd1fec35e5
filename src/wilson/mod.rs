//! Wilson-statistics outlier test.
//!
//! - `cdf`: cumulative probabilities of normalized amplitudes/intensities for
//!   acentric and centric reflections
//! - `outlier_test`: per-shell evaluation and low-probability flagging

pub mod cdf;

pub use cdf::*;
pub use outlier_test::*;
