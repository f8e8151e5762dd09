//! Read/write result JSON files.
//!
//! Result JSON is the "portable" representation of an analysis:
//! - physical parameters and fit target
//! - the selected fit plus every attempted fit and skipped model
//! - the points that entered the fit and a precomputed fitted grid for quick plotting
//!
//! The schema is defined by `domain::ResultFile`.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::Utc;

use crate::domain::{CurveGrid, FitConfig, ResultFile};
use crate::error::AppError;
use crate::fit::{FitData, FitSelection, fitted_curve, log_space};

/// Points in the log-spaced fitted grid.
const GRID_POINTS: usize = 121;

/// Assemble the result file for a finished run.
pub fn build_result_file(
    source: &str,
    selection: &FitSelection,
    data: &FitData,
    beta: f64,
    config: &FitConfig,
) -> ResultFile {
    let tau = grid_tau(&data.tau);
    let y = fitted_curve(&selection.best, &tau);
    ResultFile {
        tool: "dls".to_string(),
        generated_at: Utc::now(),
        source: source.to_string(),
        physical: config.physical,
        target: config.target,
        beta,
        best: selection.best.clone(),
        fits: selection.fits.clone(),
        skipped: selection.skipped.clone(),
        data: CurveGrid {
            tau: data.tau.clone(),
            y: data.y.clone(),
        },
        grid: CurveGrid { tau, y },
    }
}

/// Write a result JSON file.
pub fn write_result_json(path: &Path, result: &ResultFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create result JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), result)
        .map_err(|e| AppError::new(2, format!("Failed to write result JSON: {e}")))?;
    Ok(())
}

/// Read a result JSON file.
pub fn read_result_json(path: &Path) -> Result<ResultFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open result JSON '{}': {e}", path.display())))?;
    let result: ResultFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid result JSON: {e}")))?;
    Ok(result)
}

/// Log-spaced lag times covering the positive part of `tau`, plus `τ = 0`
/// when the data starts there.
fn grid_tau(tau: &[f64]) -> Vec<f64> {
    let positive: Vec<f64> = tau.iter().copied().filter(|t| *t > 0.0).collect();
    let min = positive.iter().copied().fold(f64::INFINITY, f64::min);
    let max = positive.iter().copied().fold(0.0_f64, f64::max);

    let mut out = Vec::with_capacity(GRID_POINTS + 1);
    if tau.first().is_some_and(|t| *t <= 0.0) {
        out.push(0.0);
    }
    match log_space(min, max, GRID_POINTS) {
        Ok(v) => out.extend(v),
        Err(_) => out.extend(positive),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{FitContext, fit_and_select};

    #[test]
    fn result_json_round_trip() {
        let tau: Vec<f64> = (0..60).map(|i| i as f64 * 5e-5).collect();
        let y: Vec<f64> = tau.iter().map(|&t| (-400.0 * t).exp()).collect();
        let data = FitData {
            lags: (0..tau.len()).collect(),
            tau,
            y,
            warnings: Vec::new(),
        };
        let config = FitConfig::default();
        let ctx = FitContext {
            beta: 0.75,
            mean_countrate: Some(50.0),
        };
        let selection = fit_and_select(&data, &ctx, &config).unwrap();
        let file = build_result_file("unit-test", &selection, &data, 0.75, &config);
        assert_eq!(file.grid.tau[0], 0.0);
        assert_eq!(file.grid.tau.len(), GRID_POINTS + 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        write_result_json(&path, &file).unwrap();
        let back = read_result_json(&path).unwrap();
        assert_eq!(back.best.model, file.best.model);
        for (a, b) in back.best.values().iter().zip(file.best.values()) {
            assert!((a - b).abs() <= 1e-12 * b.abs().max(1.0));
        }
        assert_eq!(back.source, "unit-test");
        assert_eq!(back.data.tau.len(), file.data.tau.len());
        assert_eq!(back.best.physical.mean_countrate, Some(50.0));
    }

    #[test]
    fn grid_covers_single_positive_lag() {
        assert_eq!(grid_tau(&[0.0, 1e-3]), vec![0.0, 1e-3]);
    }
}
