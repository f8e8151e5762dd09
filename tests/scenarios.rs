//! End-to-end scenarios across correlation, normalization and fitting.

use dls_fit::app::pipeline::{ChannelOptions, run_channels, run_curve};
use dls_fit::correlate::{autocorrelate, correlate_channels, ensemble_average, normalize};
use dls_fit::data::{SpeckleSimulation, simulate_speckles, synthetic_g2_curve};
use dls_fit::domain::{
    AnalysisWindow, ChannelSet, EnsembleMethod, FitConfig, FitRange, FitTarget, FitWarning, InitialGuess,
    IntensityTrace, ModelKind, ModelSpec,
};
use dls_fit::error::AnalysisError;
use dls_fit::fit::{FitContext, FitData, fit_and_select, fit_model, log_space};
use dls_fit::io::{CurveInput, load_correlator, write_g2_csv};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

fn linear_tau(n: usize, dt: f64) -> Vec<f64> {
    (0..n).map(|k| k as f64 * dt).collect()
}

fn field_data(tau: Vec<f64>, y: Vec<f64>) -> FitData {
    FitData {
        lags: (0..tau.len()).collect(),
        tau,
        y,
        warnings: Vec::new(),
    }
}

#[test]
fn siegert_round_trip_field_target() {
    let tau = linear_tau(400, 1e-5);
    let curve = synthetic_g2_curve(&tau, 0.8, &[(1.0, 500.0)], 0.0, 0).unwrap();

    let run = run_curve("siegert", curve, None, &FitConfig::default()).unwrap();
    assert_eq!(run.normalized.g2minus1[0], 1.0);
    assert!((run.normalized.beta - 0.8).abs() < 1e-12);

    let best = &run.selection.best;
    assert_eq!(best.model, ModelKind::SingleExp);
    let gamma = best.params[1].value;
    assert!((gamma - 500.0).abs() < 1e-6 * 500.0, "gamma = {gamma}");
    assert!((best.physical.coherence_factor - 0.8).abs() < 1e-12);
    assert!(best.physical.components[0].radius_nm.is_some());
}

#[test]
fn siegert_round_trip_intensity_target() {
    let tau = linear_tau(400, 1e-5);
    let curve = synthetic_g2_curve(&tau, 0.8, &[(1.0, 500.0)], 0.0, 0).unwrap();
    let beta = curve.g2[0] - 1.0;
    let config = FitConfig {
        target: FitTarget::Intensity,
        ..FitConfig::default()
    };

    let run = run_curve("siegert", curve, None, &config).unwrap();
    let best = &run.selection.best;
    let (amplitude, gamma) = (best.params[0].value, best.params[1].value);
    assert!((gamma - 500.0).abs() < 1e-6 * 500.0, "gamma = {gamma}");
    assert!((amplitude - beta).abs() < 1e-8, "amplitude = {amplitude}");
    assert!((best.physical.coherence_factor - beta).abs() < 1e-8);
}

#[test]
fn double_exponential_on_single_exponential_data_degenerates_gracefully() {
    let tau = linear_tau(200, 2e-5);
    let y = tau.iter().map(|&t| (-500.0 * t).exp()).collect();
    let data = field_data(tau, y);

    let fit = fit_model(ModelKind::DoubleExp, FitTarget::Field, &data, &[InitialGuess::Auto], 1000).unwrap();
    let p = &fit.params;
    let total = p[0].abs() + p[2].abs();
    let effectively_single = fit.warnings.contains(&FitWarning::DegenerateComponents)
        || p[0].abs().min(p[2].abs()) < 0.05 * total
        || (p[1] - p[3]).abs() < 0.05 * p[1].abs().max(p[3].abs());
    assert!(effectively_single, "params = {p:?}");

    let mean_rate = (p[0] * p[1] + p[2] * p[3]) / (p[0] + p[2]);
    assert!((mean_rate - 500.0).abs() < 0.01 * 500.0, "params = {p:?}");
    assert!(fit.rmse < 1e-6, "rmse = {}", fit.rmse);
}

#[test]
fn noisy_single_exponential_prefers_single_over_split_double() {
    let tau = linear_tau(200, 2e-5);
    let noise = Normal::new(0.0, 1e-3).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let y = tau.iter().map(|&t| (-500.0 * t).exp() + noise.sample(&mut rng)).collect();
    let data = field_data(tau, y);

    let double = fit_model(ModelKind::DoubleExp, FitTarget::Field, &data, &[InitialGuess::Auto], 1000).unwrap();
    assert!(double.warnings.contains(&FitWarning::DegenerateComponents), "params = {:?}", double.params);
    assert_eq!(double.params[2], 0.0);
    assert!((double.params[1] - 500.0).abs() < 0.02 * 500.0, "params = {:?}", double.params);

    let config = FitConfig {
        model_spec: ModelSpec::Auto,
        max_iterations: 1000,
        ..FitConfig::default()
    };
    let ctx = FitContext {
        beta: 0.8,
        mean_countrate: None,
    };
    let selection = fit_and_select(&data, &ctx, &config).unwrap();
    assert_eq!(selection.best.model, ModelKind::SingleExp);
}

#[test]
fn siegert_round_trip_on_microsecond_lags() {
    let mut tau = vec![0.0];
    tau.extend(log_space(1e-7, 1e-2, 200).unwrap());
    let curve = synthetic_g2_curve(&tau, 0.8, &[(1.0, 2e5)], 0.0, 0).unwrap();

    let run = run_curve("fast", curve, None, &FitConfig::default()).unwrap();
    let gamma = run.selection.best.params[1].value;
    assert!((gamma - 2e5).abs() < 1e-6 * 2e5, "gamma = {gamma}");
}

#[test]
fn noisy_double_exponential_recovers_parameters() {
    let tau = log_space(1e-6, 1e-1, 200).unwrap();
    let noise = Normal::new(0.0, 1e-4).unwrap();
    let mut rng = StdRng::seed_from_u64(2024);
    let y = tau
        .iter()
        .map(|&t| 0.6 * (-200.0 * t).exp() + 0.4 * (-2000.0 * t).exp() + noise.sample(&mut rng))
        .collect();
    let data = field_data(tau, y);

    let config = FitConfig {
        model_spec: ModelSpec::Double,
        max_iterations: 1000,
        ..FitConfig::default()
    };
    let ctx = FitContext {
        beta: 0.8,
        mean_countrate: None,
    };
    let selection = fit_and_select(&data, &ctx, &config).unwrap();
    let best = &selection.best;
    assert_eq!(best.model, ModelKind::DoubleExp);

    let expected = [0.6, 200.0, 0.4, 2000.0];
    for (param, want) in best.params.iter().zip(expected) {
        assert!(
            (param.value - want).abs() <= 0.05 * want,
            "{} = {} (expected {want})",
            param.name,
            param.value
        );
        assert!(param.std_error.is_some());
    }
    assert_eq!(best.physical.components.len(), 2);
    let (r_slow, r_fast) = (
        best.physical.components[0].radius_nm.unwrap(),
        best.physical.components[1].radius_nm.unwrap(),
    );
    assert!(r_slow > r_fast);
}

#[test]
fn identical_flat_channels_average_to_one() {
    let set = ChannelSet::new(
        [10.0, 20.0, 30.0]
            .iter()
            .enumerate()
            .map(|(i, &m)| IntensityTrace::new(format!("c{i}"), vec![m; 100]))
            .collect(),
        1e-3,
    )
    .unwrap();
    let channels = correlate_channels(&set, &AnalysisWindow::full(100)).unwrap();

    let weighted = ensemble_average(&channels, EnsembleMethod::Weighted).unwrap();
    assert_eq!(weighted.len(), 100);
    assert!(weighted.g2.iter().all(|g| (g - 1.0).abs() < 1e-12));

    // M·Σm²/(Σm)² = 3·1400/3600 for the unweighted brute-force sum.
    let brute = ensemble_average(&channels, EnsembleMethod::BruteForce).unwrap();
    assert!(brute.g2.iter().all(|g| (g - 7.0 / 6.0).abs() < 1e-12));
}

#[test]
fn window_boundaries() {
    let trace = IntensityTrace::new("c0", (1..=50).map(f64::from).collect());

    let one = autocorrelate(&trace, &AnalysisWindow::new(10, 1), 1e-3).unwrap();
    assert_eq!(one.curve.len(), 1);
    assert!((one.curve.g2[0] - 1.0).abs() < 1e-15);

    let err = autocorrelate(&trace, &AnalysisWindow::new(0, 0), 1e-3).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidWindow { .. }));
    let err = autocorrelate(&trace, &AnalysisWindow::new(45, 6), 1e-3).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidWindow { ref channel, .. } if channel == "c0"));
}

#[test]
fn flat_curve_has_degenerate_baseline() {
    let trace = IntensityTrace::new("c0", vec![4.0; 64]);
    let corr = autocorrelate(&trace, &AnalysisWindow::full(64), 1e-3).unwrap();
    assert!(corr.curve.g2.iter().all(|g| (g - 1.0).abs() < 1e-15));
    assert!(matches!(
        normalize(&corr.curve, 1e-9).unwrap_err(),
        AnalysisError::DegenerateBaseline { .. }
    ));
}

#[test]
fn simulated_speckles_end_to_end() {
    let sim = SpeckleSimulation {
        channels: 32,
        frames: 10_000,
        frame_interval: 1e-4,
        decay_rate: 500.0,
        beta: 0.8,
        ..SpeckleSimulation::default()
    };
    let set = simulate_speckles(&sim).unwrap();
    let options = ChannelOptions {
        window: AnalysisWindow::full(set.frame_count()).with_max_lag(Some(100)),
        extreme: None,
    };
    let config = FitConfig {
        ensemble_method: EnsembleMethod::Weighted,
        range: FitRange {
            falloff: Some(0.1),
            ..FitRange::default()
        },
        ..FitConfig::default()
    };

    let run = run_channels("simulation", &set, &options, &config).unwrap();
    assert_eq!(run.channels.len(), 32);
    assert!((run.fit.normalized.beta - 0.8).abs() < 0.08, "beta = {}", run.fit.normalized.beta);

    let gamma = run.fit.selection.best.params[1].value;
    assert!((gamma - 500.0).abs() < 0.1 * 500.0, "gamma = {gamma}");
    let countrate = run.fit.dataset.mean_countrate.unwrap();
    assert!((countrate - 100.0 / 0.8_f64.sqrt()).abs() < 5.0, "countrate = {countrate}");
}

#[test]
fn correlator_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("g2.csv");
    let tau = linear_tau(120, 1e-5);
    let curve = synthetic_g2_curve(&tau, 0.6, &[(1.0, 1500.0)], 0.0, 0).unwrap();
    write_g2_csv(&path, &curve).unwrap();

    let loaded = load_correlator(&path, CurveInput::default()).unwrap();
    assert!(loaded.row_errors.is_empty());
    let run = run_curve("file", loaded.curve, loaded.mean_countrate, &FitConfig::default()).unwrap();
    let gamma = run.selection.best.params[1].value;
    assert!((gamma - 1500.0).abs() < 1e-4 * 1500.0, "gamma = {gamma}");
}
