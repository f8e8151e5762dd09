//! Decay-rate grids for initial guesses.
//!
//! Levenberg–Marquardt finds the local minimum closest to its start. When the
//! automatic guess lands in the wrong basin, a log-spaced sweep of starting
//! decay rates gives the fitter further deterministic chances.

use crate::domain::InitialGuess;
use crate::error::AnalysisError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AnalysisError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > min) {
        return Err(AnalysisError::InvalidConfig(format!(
            "invalid range: min={min}, max={max} (must be finite, >0, and max>min)"
        )));
    }
    if steps < 2 {
        return Err(AnalysisError::InvalidConfig("grid steps must be >= 2".to_string()));
    }

    let ln_min = min.ln();
    let step = (max.ln() - ln_min) / (steps as f64 - 1.0);
    Ok((0..steps).map(|i| (ln_min + step * i as f64).exp()).collect())
}

/// Starting decay rates for the guess list, slowest first.
pub fn decay_rate_guesses(min: f64, max: f64, steps: usize) -> Result<Vec<InitialGuess>, AnalysisError> {
    Ok(log_space(min, max, steps)?
        .into_iter()
        .map(InitialGuess::DecayRate)
        .collect())
}
