//! Fit input preparation.
//!
//! Turns a normalized curve into the `(τ, y)` arrays the fitter sees:
//!
//! - `field` target: `y = f(τ)`, with undefined lags excluded, clipped or fatal
//! - `intensity` target: `y = g2(τ) - 1`, un-normalized (always defined)
//!
//! The fit range (start index, falloff cutoff, lag-time bound) is applied first.
//! The falloff is measured on the normalized intensity correlation, which is
//! defined at every lag.

use tracing::warn;

use crate::domain::{CorrelationCurve, FitRange, FitTarget, FitWarning, NormalizedField, UndefinedPolicy};
use crate::error::AnalysisError;

/// Points entering the fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitData {
    pub tau: Vec<f64>,
    pub y: Vec<f64>,
    /// Source lag index of each point.
    pub lags: Vec<usize>,
    pub warnings: Vec<FitWarning>,
}

impl FitData {
    pub fn len(&self) -> usize {
        self.tau.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tau.is_empty()
    }
}

/// Select and transform the fit input.
pub fn prepare_fit_data(
    curve: &CorrelationCurve,
    normalized: &NormalizedField,
    target: FitTarget,
    policy: UndefinedPolicy,
    range: &FitRange,
) -> Result<FitData, AnalysisError> {
    let len = curve.len().min(normalized.len());
    if range.start >= len {
        return Err(AnalysisError::InsufficientData(format!(
            "fit start index {} is beyond the {len} available lags",
            range.start
        )));
    }
    if let Some(falloff) = range.falloff {
        if !(falloff.is_finite() && falloff > 0.0 && falloff < 1.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "falloff must be in (0, 1), got {falloff}"
            )));
        }
    }

    let reference = normalized.g2minus1[range.start];
    let cutoff = range.falloff.map(|f| f * reference);

    let mut data = FitData {
        tau: Vec::new(),
        y: Vec::new(),
        lags: Vec::new(),
        warnings: Vec::new(),
    };
    let mut excluded = 0;
    let mut clipped = 0;

    for k in range.start..len {
        let tau = curve.tau[k];
        if range.max_tau.is_some_and(|max| tau > max) {
            break;
        }
        if cutoff.is_some_and(|c| normalized.g2minus1[k] < c) {
            break;
        }

        let y = match target {
            FitTarget::Intensity => curve.g2[k] - 1.0,
            FitTarget::Field => match (normalized.field[k], policy) {
                (Some(f), _) => f,
                (None, UndefinedPolicy::Abort) => return Err(AnalysisError::UndefinedField { lag: k }),
                (None, UndefinedPolicy::Exclude) => {
                    excluded += 1;
                    continue;
                }
                (None, UndefinedPolicy::Clip) => {
                    clipped += 1;
                    0.0
                }
            },
        };

        data.tau.push(tau);
        data.y.push(y);
        data.lags.push(k);
    }

    if excluded > 0 {
        warn!(count = excluded, "excluded undefined field lags from fit");
        data.warnings.push(FitWarning::ExcludedUndefinedLags { count: excluded });
    }
    if clipped > 0 {
        warn!(count = clipped, "clipped undefined field lags to zero");
        data.warnings.push(FitWarning::ClippedUndefinedLags { count: clipped });
    }

    if data.is_empty() {
        return Err(AnalysisError::InsufficientData(
            "no lags left in the fit range".to_string(),
        ));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::normalize;

    fn sample() -> (CorrelationCurve, NormalizedField) {
        // g2 - 1 = [0.5, 0.25, -0.01, 0.05, 0.01]
        let curve = CorrelationCurve::from_lags(vec![1.5, 1.25, 0.99, 1.05, 1.01], 1e-3);
        let normalized = normalize(&curve, 1e-9).unwrap();
        (curve, normalized)
    }

    #[test]
    fn field_target_excludes_undefined_lags() {
        let (curve, n) = sample();
        let data = prepare_fit_data(&curve, &n, FitTarget::Field, UndefinedPolicy::Exclude, &FitRange::default())
            .unwrap();
        assert_eq!(data.lags, vec![0, 1, 3, 4]);
        assert_eq!(data.warnings, vec![FitWarning::ExcludedUndefinedLags { count: 1 }]);
        assert_eq!(data.y[0], 1.0);
    }

    #[test]
    fn field_target_clips_or_aborts() {
        let (curve, n) = sample();
        let data = prepare_fit_data(&curve, &n, FitTarget::Field, UndefinedPolicy::Clip, &FitRange::default())
            .unwrap();
        assert_eq!(data.lags, vec![0, 1, 2, 3, 4]);
        assert_eq!(data.y[2], 0.0);

        let err = prepare_fit_data(&curve, &n, FitTarget::Field, UndefinedPolicy::Abort, &FitRange::default())
            .unwrap_err();
        assert_eq!(err, AnalysisError::UndefinedField { lag: 2 });
    }

    #[test]
    fn intensity_target_keeps_raw_g2_minus_one() {
        let (curve, n) = sample();
        let data = prepare_fit_data(&curve, &n, FitTarget::Intensity, UndefinedPolicy::Abort, &FitRange::default())
            .unwrap();
        assert_eq!(data.len(), 5);
        assert!((data.y[0] - 0.5).abs() < 1e-15);
        assert!(data.y[2] < 0.0);
        assert!(data.warnings.is_empty());
    }

    #[test]
    fn range_start_falloff_and_max_tau() {
        let (curve, n) = sample();
        let range = FitRange {
            start: 1,
            falloff: Some(0.5),
            max_tau: None,
        };
        // Reference is 0.5 at lag 1, so the cutoff is 0.25 and lag 2 stops the range.
        let data = prepare_fit_data(&curve, &n, FitTarget::Field, UndefinedPolicy::Abort, &range).unwrap();
        assert_eq!(data.lags, vec![1]);

        let range = FitRange {
            start: 0,
            falloff: None,
            max_tau: Some(1.5e-3),
        };
        let data = prepare_fit_data(&curve, &n, FitTarget::Intensity, UndefinedPolicy::Exclude, &range).unwrap();
        assert_eq!(data.lags, vec![0, 1]);
    }

    #[test]
    fn start_beyond_curve_is_insufficient() {
        let (curve, n) = sample();
        let range = FitRange {
            start: 5,
            ..FitRange::default()
        };
        assert!(matches!(
            prepare_fit_data(&curve, &n, FitTarget::Field, UndefinedPolicy::Exclude, &range).unwrap_err(),
            AnalysisError::InsufficientData(_)
        ));
    }
}
