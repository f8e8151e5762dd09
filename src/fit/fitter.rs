//! Nonlinear fitting of a single model kind.
//!
//! Given:
//! - lag times `τ_i`
//! - observed values `y_i`
//! - an ordered list of initial guesses
//!
//! we run Levenberg–Marquardt from each guess in turn and keep the first run
//! that converges. There is no retry logic beyond that list: a model either
//! converges from one of the configured starting points or the fit reports
//! `FitDidNotConverge`.

use tracing::{debug, warn};

use crate::domain::{FitTarget, FitWarning, InitialGuess, ModelKind, Termination};
use crate::error::AnalysisError;
use crate::fit::data::FitData;
use crate::math::{LmFailure, LmOptions, levenberg_marquardt, standard_errors};
use crate::models::{fill_jacobian_row, initial_guess, predict};

/// Relative decay-rate difference below which two modes are always merged.
const MERGE_RATE_TOLERANCE: f64 = 1e-3;
/// Amplitude fraction below which a mode is dropped.
const MERGE_AMPLITUDE_FRACTION: f64 = 1e-3;

/// Converged fit for one model kind.
#[derive(Debug, Clone)]
pub struct ModelFit {
    pub model: ModelKind,
    pub target: FitTarget,
    pub params: Vec<f64>,
    pub std_errors: Vec<Option<f64>>,
    pub sse: f64,
    pub rmse: f64,
    pub n: usize,
    pub evaluations: usize,
    pub termination: Termination,
    /// Index into the guess list of the converging start.
    pub attempt: usize,
    pub warnings: Vec<FitWarning>,
}

/// Fit one model kind, trying `guesses` in order.
pub fn fit_model(
    model: ModelKind,
    target: FitTarget,
    data: &FitData,
    guesses: &[InitialGuess],
    max_iterations: usize,
) -> Result<ModelFit, AnalysisError> {
    if data.is_empty() {
        return Err(AnalysisError::InsufficientData("no data points to fit".to_string()));
    }
    if max_iterations == 0 {
        return Err(AnalysisError::InvalidConfig("max iterations must be > 0".to_string()));
    }

    let opts = LmOptions {
        max_iterations,
        ..LmOptions::default()
    };
    let eval = |tau: f64, p: &[f64]| predict(model, target, tau, p);
    let jac = |tau: f64, p: &[f64], row: &mut [f64]| fill_jacobian_row(model, target, tau, p, row);

    let mut attempts = 0;
    let mut last_evaluations = 0;

    for (idx, guess) in guesses.iter().enumerate() {
        let Some(start) = resolve_guess(guess, model, target, data) else {
            debug!(model = ?model, attempt = idx, "initial guess not applicable");
            continue;
        };
        attempts += 1;

        match levenberg_marquardt(&data.tau, &data.y, &start, &opts, eval, jac) {
            Ok(outcome) => {
                debug!(
                    model = ?model,
                    attempt = idx,
                    evaluations = outcome.evaluations,
                    sse = outcome.sse,
                    termination = ?outcome.termination,
                    "fit converged"
                );
                let mut params = outcome.params;
                let mut sse = outcome.sse;
                let mut std_errors = standard_errors(&data.tau, &params, sse, jac);
                let mut warnings = Vec::new();

                if model == ModelKind::DoubleExp {
                    order_modes(&mut params, &mut std_errors);
                    if let Some(mode) = merged_mode(&params, &std_errors) {
                        debug!(model = ?model, ?params, "double exponential collapsed to one mode");
                        (params, std_errors, sse) = collapse_to_single(data, target, mode, &opts);
                        warnings.push(FitWarning::DegenerateComponents);
                    }
                }

                return Ok(ModelFit {
                    model,
                    target,
                    params,
                    std_errors,
                    sse,
                    rmse: (sse / data.len() as f64).sqrt(),
                    n: data.len(),
                    evaluations: outcome.evaluations,
                    termination: outcome.termination,
                    attempt: idx,
                    warnings,
                });
            }
            Err(failure) => {
                last_evaluations = failure.evaluations();
                match failure {
                    LmFailure::LostPatience { evaluations } => {
                        warn!(model = ?model, attempt = idx, evaluations, "fit attempt did not converge")
                    }
                    LmFailure::NonFiniteStart => {
                        warn!(model = ?model, attempt = idx, "initial guess gives non-finite residuals")
                    }
                    LmFailure::Numerical { evaluations } => {
                        warn!(model = ?model, attempt = idx, evaluations, "fit attempt hit non-finite values")
                    }
                }
            }
        }
    }

    if attempts == 0 {
        return Err(AnalysisError::InvalidConfig(format!(
            "no initial guess applies to the {} model",
            model.display_name()
        )));
    }
    Err(AnalysisError::FitDidNotConverge {
        model,
        attempts,
        evaluations: last_evaluations,
    })
}

/// Turn a configured guess into a parameter vector for `model`.
///
/// Explicit vectors of the wrong length belong to another model and are skipped.
pub fn resolve_guess(guess: &InitialGuess, model: ModelKind, target: FitTarget, data: &FitData) -> Option<Vec<f64>> {
    match guess {
        InitialGuess::Auto => initial_guess(model, target, &data.tau, &data.y),
        InitialGuess::Explicit(p) => (p.len() == model.param_count()).then(|| p.clone()),
        InitialGuess::DecayRate(rate) => {
            let mut p = initial_guess(model, target, &data.tau, &data.y)?;
            match model {
                ModelKind::DoubleExp => {
                    p[1] = *rate;
                    p[3] = *rate * 10.0;
                }
                _ => p[1] = *rate,
            }
            Some(p)
        }
    }
}

/// Order double-exponential modes slowest first, errors alongside.
fn order_modes(params: &mut [f64], errors: &mut [Option<f64>]) {
    if params[3] < params[1] {
        params.swap(0, 2);
        params.swap(1, 3);
        errors.swap(0, 2);
        errors.swap(1, 3);
    }
}

/// The single `[A, Γ]` mode a double fit degenerates to, if it does.
///
/// A mode holding a negligible share of the amplitude is dropped. Two rates
/// closer than their combined standard errors (or whose errors are unknown)
/// cannot be told apart and merge into their amplitude-weighted mean.
fn merged_mode(params: &[f64], errors: &[Option<f64>]) -> Option<[f64; 2]> {
    let (a1, g1, a2, g2) = (params[0], params[1], params[2], params[3]);

    let total = a1.abs() + a2.abs();
    if total > 0.0 && a1.abs().min(a2.abs()) < MERGE_AMPLITUDE_FRACTION * total {
        return Some(if a1.abs() >= a2.abs() { [a1, g1] } else { [a2, g2] });
    }

    let gap = (g2 - g1).abs();
    let within_tolerance = gap <= MERGE_RATE_TOLERANCE * g1.abs().max(g2.abs());
    let within_errors = match (errors[1], errors[3]) {
        (Some(s1), Some(s2)) => gap <= s1 + s2,
        _ => true,
    };
    if !(within_tolerance || within_errors) {
        return None;
    }

    let amplitude = a1 + a2;
    let rate = if amplitude != 0.0 { (a1 * g1 + a2 * g2) / amplitude } else { g1 };
    Some([amplitude, rate])
}

/// Refit the merged mode as a single exponential.
///
/// The result is laid out as a double fit with `A2 = 0` and `Γ2 = Γ1`; errors
/// are those of the surviving mode. When the refit fails the merged mode is
/// kept as is.
fn collapse_to_single(
    data: &FitData,
    target: FitTarget,
    mode: [f64; 2],
    opts: &LmOptions,
) -> (Vec<f64>, Vec<Option<f64>>, f64) {
    let eval = |tau: f64, p: &[f64]| predict(ModelKind::SingleExp, target, tau, p);
    let jac = |tau: f64, p: &[f64], row: &mut [f64]| fill_jacobian_row(ModelKind::SingleExp, target, tau, p, row);

    let single = match levenberg_marquardt(&data.tau, &data.y, &mode, opts, eval, jac) {
        Ok(outcome) => outcome.params,
        Err(failure) => {
            debug!(?failure, "single-mode refit failed, keeping merged mode");
            mode.to_vec()
        }
    };
    let sse = sum_squared_residuals(data, &single, eval);
    let mut errors = standard_errors(&data.tau, &single, sse, jac);
    errors.extend([None, None]);
    (vec![single[0], single[1], 0.0, single[1]], errors, sse)
}

fn sum_squared_residuals<F>(data: &FitData, params: &[f64], eval: F) -> f64
where
    F: Fn(f64, &[f64]) -> f64,
{
    data.tau
        .iter()
        .zip(&data.y)
        .map(|(&t, &y)| (y - eval(t, params)).powi(2))
        .sum()
}
