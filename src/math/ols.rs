//! Linear least squares.
//!
//! Small dense problems show up in two places:
//!
//! - log-linear regressions that seed the nonlinear fit
//! - the Γ-over-q² regression of multi-angle measurements
//!
//! The log-linear seeds go through the SVD solve below. SVD handles tall design
//! matrices (more rows than columns) and tolerates near-singular systems.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Singular values are cut off relative to the largest one, so a column with a
/// tiny scale (a lag time in µs, a τ² derivative) still gets its share of the
/// solution. Returns `None` if the system is too ill-conditioned to solve
/// robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);
    let s_max = svd.singular_values.max();
    if !(s_max.is_finite() && s_max > 0.0) {
        return None;
    }

    // Try progressively looser tolerances if strict solve fails.
    for &rel in &[1e-14, 1e-12, 1e-10] {
        if let Ok(beta) = svd.solve(y, rel * s_max) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Ordinary least squares line `y = intercept + slope·x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub intercept: f64,
    pub slope: f64,
    /// Coefficient of determination.
    pub r_squared: f64,
}

/// Fit a straight line in closed form. Needs at least two distinct `x` values.
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<LineFit> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let x_bar = x[..n].iter().sum::<f64>() / n_f;
    let y_bar = y[..n].iter().sum::<f64>() / n_f;

    let mut cov = 0.0;
    let mut var = 0.0;
    for i in 0..n {
        let dx = x[i] - x_bar;
        cov += dx * (y[i] - y_bar);
        var += dx * dx;
    }
    // Relative check so q²-sized abscissae (~1e14) are handled like unit-sized ones.
    if !(var > 1e-24 * x_bar.abs().max(1.0).powi(2) * n_f) || !cov.is_finite() {
        return None;
    }
    let slope = cov / var;
    let intercept = y_bar - slope * x_bar;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for i in 0..n {
        let fit = intercept + slope * x[i];
        ss_res += (y[i] - fit).powi(2);
        ss_tot += (y[i] - y_bar).powi(2);
    }
    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 1.0 };

    Some(LineFit {
        intercept,
        slope,
        r_squared,
    })
}
