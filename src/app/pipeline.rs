//! Shared analysis pipeline used by the `correlate` and `fit` commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! traces -> per-channel correlation -> ensemble -> normalize -> fit/select
//!
//! Pre-computed correlator curves enter at the normalize stage. The command
//! handlers then only deal with presentation and exports.

use tracing::info;

use crate::correlate::{
    ExtremeSide, correlate_channels, ensemble_average, mean_countrate, normalize, select_extreme_channels,
};
use crate::domain::{AnalysisWindow, ChannelCorrelation, ChannelSet, CorrelationCurve, FitConfig, NormalizedField};
use crate::error::{AnalysisError, AppError};
use crate::fit::{FitContext, FitData, FitSelection, fit_and_select, fitted_curve, prepare_fit_data};
use crate::io::{build_result_file, write_curve_csv, write_result_json};
use crate::report::DatasetSummary;

/// Sub-ensemble of the fastest and/or slowest channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtremeSelection {
    pub fraction: f64,
    pub lag: usize,
    pub side: ExtremeSide,
}

/// How raw traces are turned into one ensemble curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelOptions {
    pub window: AnalysisWindow,
    pub extreme: Option<ExtremeSelection>,
}

/// All computed outputs of fitting one curve.
#[derive(Debug, Clone)]
pub struct CurveRun {
    pub curve: CorrelationCurve,
    pub normalized: NormalizedField,
    pub data: FitData,
    pub selection: FitSelection,
    pub dataset: DatasetSummary,
}

/// Outputs of a trace run: the per-channel curves that went into the ensemble
/// plus the fit of the ensemble curve.
#[derive(Debug, Clone)]
pub struct ChannelRun {
    pub channels: Vec<ChannelCorrelation>,
    pub fit: CurveRun,
}

/// Correlate, reduce, normalize and fit a set of traces.
pub fn run_channels(
    source: &str,
    set: &ChannelSet,
    options: &ChannelOptions,
    config: &FitConfig,
) -> Result<ChannelRun, AnalysisError> {
    let window = options.window;
    info!(
        channels = set.len(),
        frames = set.frame_count(),
        start = window.start,
        duration = window.duration,
        "correlating"
    );
    let all = correlate_channels(set, &window)?;

    let channels = match options.extreme {
        Some(sel) => select_extreme_channels(&all, sel.lag, sel.fraction, sel.side)?,
        None => all,
    };

    let curve = ensemble_average(&channels, config.ensemble_method)?;
    let countrate = mean_countrate(set, &channels, &window, config.countrate_window)?;

    let mut fit = run_curve(source, curve, Some(countrate), config)?;
    fit.dataset.channels = Some(channels.len());
    fit.dataset.frames = Some(set.frame_count());
    fit.dataset.window = Some(window);

    Ok(ChannelRun { channels, fit })
}

/// Normalize and fit an ensemble (or correlator) curve.
pub fn run_curve(
    source: &str,
    curve: CorrelationCurve,
    mean_countrate: Option<f64>,
    config: &FitConfig,
) -> Result<CurveRun, AnalysisError> {
    let normalized = normalize(&curve, config.baseline_tolerance)?;
    let data = prepare_fit_data(&curve, &normalized, config.target, config.undefined_policy, &config.range)?;
    info!(points = data.len(), target = ?config.target, model = ?config.model_spec, "fitting");

    let ctx = FitContext {
        beta: normalized.beta,
        mean_countrate,
    };
    let selection = fit_and_select(&data, &ctx, config)?;

    let dataset = DatasetSummary {
        source: source.to_string(),
        channels: None,
        frames: None,
        window: None,
        lags: curve.len(),
        beta: normalized.beta,
        undefined_lags: normalized.undefined_lags().len(),
        mean_countrate,
        fit_points: data.len(),
        fit_tau: (
            data.tau.first().copied().unwrap_or(0.0),
            data.tau.last().copied().unwrap_or(0.0),
        ),
    };

    Ok(CurveRun {
        curve,
        normalized,
        data,
        selection,
        dataset,
    })
}

/// Write the optional curve CSV and result JSON.
pub fn write_exports(run: &CurveRun, config: &FitConfig) -> Result<(), AppError> {
    if let Some(path) = &config.export_curve {
        let fitted = fitted_curve(&run.selection.best, &run.curve.tau);
        write_curve_csv(path, &run.curve, &run.normalized, Some(&fitted))?;
        info!(path = %path.display(), "wrote curve CSV");
    }
    if let Some(path) = &config.export_result {
        let result = build_result_file(
            &run.dataset.source,
            &run.selection,
            &run.data,
            run.normalized.beta,
            config,
        );
        write_result_json(path, &result)?;
        info!(path = %path.display(), "wrote result JSON");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SpeckleSimulation, simulate_speckles, synthetic_g2_curve};
    use crate::domain::{EnsembleMethod, ModelKind};

    #[test]
    fn curve_run_recovers_decay_rate() {
        let tau: Vec<f64> = (0..150).map(|k| k as f64 * 2e-5).collect();
        let curve = synthetic_g2_curve(&tau, 0.7, &[(1.0, 800.0)], 0.0, 3).unwrap();
        let run = run_curve("synthetic", curve, None, &FitConfig::default()).unwrap();
        assert_eq!(run.selection.best.model, ModelKind::SingleExp);
        let gamma = run.selection.best.params[1].value;
        assert!((gamma - 800.0).abs() < 1e-6 * 800.0, "gamma = {gamma}");
        assert!((run.dataset.beta - 0.7).abs() < 1e-12);
        assert_eq!(run.dataset.fit_points, 150);
    }

    #[test]
    fn channel_run_fills_dataset_summary() {
        let sim = SpeckleSimulation {
            channels: 8,
            frames: 5_000,
            ..SpeckleSimulation::default()
        };
        let set = simulate_speckles(&sim).unwrap();
        let options = ChannelOptions {
            window: AnalysisWindow::full(set.frame_count()).with_max_lag(Some(40)),
            extreme: Some(ExtremeSelection {
                fraction: 0.25,
                lag: 1,
                side: ExtremeSide::Both,
            }),
        };
        let config = FitConfig {
            ensemble_method: EnsembleMethod::Weighted,
            ..FitConfig::default()
        };
        let run = run_channels("sim", &set, &options, &config).unwrap();
        assert_eq!(run.channels.len(), 4);
        assert_eq!(run.fit.dataset.channels, Some(4));
        assert_eq!(run.fit.dataset.frames, Some(5_000));
        assert_eq!(run.fit.curve.len(), 40);
        assert!(run.fit.dataset.mean_countrate.is_some_and(|c| c > 0.0));
    }

    #[test]
    fn sub_ensemble_reports_its_own_countrate() {
        let sim = SpeckleSimulation {
            channels: 8,
            frames: 2_000,
            brightness_spread: 0.5,
            ..SpeckleSimulation::default()
        };
        let set = simulate_speckles(&sim).unwrap();
        let options = ChannelOptions {
            window: AnalysisWindow::full(set.frame_count()).with_max_lag(Some(30)),
            extreme: Some(ExtremeSelection {
                fraction: 0.25,
                lag: 1,
                side: ExtremeSide::Fastest,
            }),
        };
        let config = FitConfig {
            ensemble_method: EnsembleMethod::Weighted,
            ..FitConfig::default()
        };
        let run = run_channels("sim", &set, &options, &config).unwrap();
        assert_eq!(run.channels.len(), 2);

        let expected = run.channels.iter().map(|c| c.mean_intensity).sum::<f64>() / 2.0;
        let countrate = run.fit.dataset.mean_countrate.unwrap();
        assert!((countrate - expected).abs() < 1e-9 * expected, "{countrate} vs {expected}");
    }

    #[test]
    fn exports_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let tau: Vec<f64> = (0..80).map(|k| k as f64 * 5e-5).collect();
        let curve = synthetic_g2_curve(&tau, 0.5, &[(1.0, 300.0)], 0.0, 1).unwrap();
        let config = FitConfig {
            export_curve: Some(dir.path().join("curve.csv")),
            export_result: Some(dir.path().join("result.json")),
            ..FitConfig::default()
        };
        let run = run_curve("unit", curve, Some(12.0), &config).unwrap();
        write_exports(&run, &config).unwrap();
        assert!(dir.path().join("curve.csv").exists());
        let back = crate::io::read_result_json(&dir.path().join("result.json")).unwrap();
        assert_eq!(back.source, "unit");
    }
}
