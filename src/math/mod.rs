//! Numerical utilities: adaptive quadrature and order statistics.

pub mod quadrature;
pub mod stats;

pub use quadrature::*;
pub use stats::*;
