//! Model evaluation for the decay model family.
//!
//! The fitter relies on three primitive operations per model kind:
//! - predict `y(τ)` given a parameter vector (for residuals/plots)
//! - fill a Jacobian row `∂y/∂p` at one lag time (for Levenberg–Marquardt)
//! - produce a starting parameter vector from the data
//!
//! These are implemented here for each model kind. The target decides the
//! exponent scale `c`: 1 for the field correlation, 2 for `g2 - 1`.
//!
//! Parameter layouts:
//! - single:    `[A, Γ]`                    `A·e^{-cΓτ}`
//! - double:    `[A1, Γ1, A2, Γ2]`          `A1·e^{-cΓ1τ} + A2·e^{-cΓ2τ}`
//! - cumulant2: `[A, Γ, μ2]`                `A·e^{c(-Γτ + μ2τ²/2)}`
//! - cumulant3: `[A, Γ, μ2, μ3]`            `A·e^{c(-Γτ + μ2τ²/2 - μ3τ³/6)}`

use nalgebra::{DMatrix, DVector};

use crate::domain::{FitTarget, ModelKind};
use crate::math::solve_least_squares;

/// Points below this fraction of the initial amplitude are ignored by the
/// log-linear guess (their logarithm is dominated by noise).
const GUESS_CUTOFF: f64 = 0.05;

/// Predict `y(τ)` for the given model kind.
pub fn predict(model: ModelKind, target: FitTarget, tau: f64, params: &[f64]) -> f64 {
    let c = target.exponent_scale();
    match model {
        ModelKind::SingleExp => params[0] * (-c * params[1] * tau).exp(),
        ModelKind::DoubleExp => {
            params[0] * (-c * params[1] * tau).exp() + params[2] * (-c * params[3] * tau).exp()
        }
        ModelKind::Cumulant2 | ModelKind::Cumulant3 => {
            params[0] * cumulant_exponent(model, c, tau, params).exp()
        }
    }
}

/// Fill the Jacobian row `∂y/∂p_j` at lag time `tau`.
///
/// # Panics
/// Panics if `out` or `params` are shorter than `model.param_count()`.
pub fn fill_jacobian_row(model: ModelKind, target: FitTarget, tau: f64, params: &[f64], out: &mut [f64]) {
    let c = target.exponent_scale();
    match model {
        ModelKind::SingleExp => {
            let e = (-c * params[1] * tau).exp();
            out[0] = e;
            out[1] = -c * tau * params[0] * e;
        }
        ModelKind::DoubleExp => {
            let e1 = (-c * params[1] * tau).exp();
            let e2 = (-c * params[3] * tau).exp();
            out[0] = e1;
            out[1] = -c * tau * params[0] * e1;
            out[2] = e2;
            out[3] = -c * tau * params[2] * e2;
        }
        ModelKind::Cumulant2 => {
            let e = cumulant_exponent(model, c, tau, params).exp();
            let y = params[0] * e;
            out[0] = e;
            out[1] = -c * tau * y;
            out[2] = c * tau * tau / 2.0 * y;
        }
        ModelKind::Cumulant3 => {
            let e = cumulant_exponent(model, c, tau, params).exp();
            let y = params[0] * e;
            out[0] = e;
            out[1] = -c * tau * y;
            out[2] = c * tau * tau / 2.0 * y;
            out[3] = -c * tau.powi(3) / 6.0 * y;
        }
    }
}

/// Data-derived starting parameters.
///
/// A log-linear regression of `ln y` over `τ` on the leading points (those
/// above `GUESS_CUTOFF` of the first value) seeds `A` and `Γ`. Double
/// exponentials split the amplitude evenly and spread the rates by a factor 3
/// around the single-exponential rate; cumulant models start with `μ = 0`.
///
/// Returns `None` when the data carries no usable decay (no positive values).
pub fn initial_guess(model: ModelKind, target: FitTarget, tau: &[f64], y: &[f64]) -> Option<Vec<f64>> {
    let (amplitude, rate) = single_exp_guess(target, tau, y)?;
    let guess = match model {
        ModelKind::SingleExp => vec![amplitude, rate],
        ModelKind::DoubleExp => vec![amplitude / 2.0, rate / 3.0, amplitude / 2.0, rate * 3.0],
        ModelKind::Cumulant2 => vec![amplitude, rate, 0.0],
        ModelKind::Cumulant3 => vec![amplitude, rate, 0.0, 0.0],
    };
    Some(guess)
}

fn cumulant_exponent(model: ModelKind, c: f64, tau: f64, params: &[f64]) -> f64 {
    let mut arg = -params[1] * tau + params[2] * tau * tau / 2.0;
    if model == ModelKind::Cumulant3 {
        arg -= params[3] * tau.powi(3) / 6.0;
    }
    c * arg
}

fn single_exp_guess(target: FitTarget, tau: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let c = target.exponent_scale();
    let first = y.iter().copied().find(|v| v.is_finite() && *v > 0.0)?;
    let cutoff = first * GUESS_CUTOFF;

    let lead: Vec<(f64, f64)> = tau
        .iter()
        .zip(y)
        .skip_while(|(_, v)| !(v.is_finite() && **v > 0.0))
        .take_while(|(_, v)| v.is_finite() && **v > cutoff)
        .map(|(&t, &v)| (t, v))
        .collect();

    if lead.len() >= 2 {
        let design = DMatrix::from_fn(lead.len(), 2, |i, j| if j == 0 { 1.0 } else { -c * lead[i].0 });
        let obs = DVector::from_iterator(lead.len(), lead.iter().map(|(_, v)| v.ln()));
        if let Some(beta) = solve_least_squares(&design, &obs) {
            let amplitude = beta[0].exp();
            let rate = beta[1];
            if amplitude.is_finite() && rate.is_finite() && rate > 0.0 {
                return Some((amplitude, rate));
            }
        }
    }

    // Fallback: 1/e time of the data.
    let threshold = first / std::f64::consts::E;
    let tau_e = tau
        .iter()
        .zip(y)
        .find(|(t, v)| **t > 0.0 && **v < threshold)
        .map(|(t, _)| *t)
        .or_else(|| tau.iter().copied().filter(|t| *t > 0.0).last())?;
    Some((first, 1.0 / (c * tau_e)))
}
