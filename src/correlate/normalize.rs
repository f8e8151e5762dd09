//! Baseline normalization and the Siegert transform.
//!
//! Given `g2(τ)`:
//!
//! ```text
//! β          = g2(0) - 1
//! g2minus1   = (g2 - 1) / β
//! f          = sqrt(g2minus1)
//! ```
//!
//! Noise can push `g2` below its baseline at long lags. The radicand is then
//! negative and `f` is recorded as `None` so callers see every undefined lag.

use tracing::warn;

use crate::domain::{CorrelationCurve, NormalizedField};
use crate::error::AnalysisError;

/// Normalize `curve` and derive the field correlation.
///
/// Fails with `DegenerateBaseline` when `|g2(0) - 1| < tolerance`.
pub fn normalize(curve: &CorrelationCurve, tolerance: f64) -> Result<NormalizedField, AnalysisError> {
    let Some(&g0) = curve.g2.first() else {
        return Err(AnalysisError::InvalidCurve("curve has no points".to_string()));
    };
    let beta = g0 - 1.0;
    if !(beta.is_finite() && beta.abs() >= tolerance) {
        return Err(AnalysisError::DegenerateBaseline {
            value: beta,
            tolerance,
        });
    }

    let mut g2minus1: Vec<f64> = curve.g2.iter().map(|g| (g - 1.0) / beta).collect();
    // Exact by construction, independent of rounding in the division.
    g2minus1[0] = 1.0;

    let field: Vec<Option<f64>> = g2minus1
        .iter()
        .map(|&v| if v >= 0.0 { Some(v.sqrt()) } else { None })
        .collect();

    let undefined = field.iter().filter(|f| f.is_none()).count();
    if undefined > 0 {
        warn!(undefined, lags = field.len(), "field correlation undefined at some lags");
    }

    Ok(NormalizedField {
        tau: curve.tau.clone(),
        g2minus1,
        field,
        beta,
    })
}
