//! Two-dimensional clustering features of a working shell.

use nalgebra::DMatrix;

use crate::domain::PreparedShell;
use crate::math::{max_value, percentile};

/// Column 0: `1/d²`. Column 1: measured value over sigma. One row per shell position.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureArray {
    points: DMatrix<f64>,
}

impl FeatureArray {
    pub fn new(inv_res_sq: &[f64], signal_to_noise: &[f64]) -> Self {
        let n = inv_res_sq.len().min(signal_to_noise.len());
        let points = DMatrix::from_fn(n, 2, |i, j| {
            if j == 0 { inv_res_sq[i] } else { signal_to_noise[i] }
        });
        Self { points }
    }

    pub fn from_shell(shell: &PreparedShell) -> Self {
        let inv_res_sq: Vec<f64> = (0..shell.len()).map(|p| shell.inv_res_sq(p)).collect();
        let ratio: Vec<f64> = shell
            .value
            .iter()
            .zip(&shell.sigma)
            .map(|(v, s)| v / s)
            .collect();
        Self::new(&inv_res_sq, &ratio)
    }

    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    pub fn points(&self) -> &DMatrix<f64> {
        &self.points
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        self.points.column(j).iter().copied().collect()
    }

    /// Stretch the `1/d²` axis so its maximum equals the `q`-th percentile of the value/sigma axis.
    ///
    /// Left unchanged when either statistic is undefined or the `1/d²` maximum is zero.
    pub fn rescaled(mut self, q: f64) -> Self {
        let x = self.column(0);
        let y = self.column(1);
        if let (Some(target), Some(max_x)) = (percentile(&y, q), max_value(&x)) {
            if target.is_finite() && max_x.is_finite() && max_x != 0.0 {
                let factor = target / max_x;
                self.points.column_mut(0).iter_mut().for_each(|v| *v *= factor);
            }
        }
        self
    }
}
