//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - installs logging
//! - parses CLI arguments
//! - loads traces, frames or correlator curves
//! - runs correlation, fitting and model selection
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing::{info, warn};

use crate::cli::{AnglesArgs, Command, CorrelateArgs, CurveArgs, FitArgs, PlotArgs, SimulateArgs};
use crate::domain::{AnalysisWindow, CorrelationCurve, FitConfig, FitRange, InitialGuess, PhysicalParams};
use crate::error::AppError;
use crate::io::{CurveInput, RowError};

pub mod pipeline;

use pipeline::{ChannelOptions, CurveRun, ExtremeSelection};

/// Entry point for the `dls` binary.
pub fn run() -> Result<(), AppError> {
    init_logging();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Correlate(args) => handle_correlate(args),
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Angles(args) => handle_angles(args),
        Command::Plot(args) => handle_plot(args),
    }
}

/// Logs go to stderr so stdout stays a clean report. `RUST_LOG` overrides the
/// default `info` level.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn handle_correlate(args: CorrelateArgs) -> Result<(), AppError> {
    let mut config = fit_config_from_args(&args.fit)?;
    config.ensemble_method = args.ensemble;
    config.countrate_window = args.countrate_window;

    let (source, set) = match (&args.input, &args.frames) {
        (Some(path), _) => {
            let loaded = crate::io::load_traces(path, args.frame_interval)?;
            info!(rows = loaded.rows_read, channels = loaded.set.len(), "loaded traces");
            (path.display().to_string(), loaded.set)
        }
        (None, Some(path)) => {
            let (width, height) = match (args.width, args.height) {
                (Some(w), Some(h)) => (w, h),
                _ => return Err(AppError::new(2, "--frames needs --width and --height.")),
            };
            let stack = crate::io::load_frames(path, width, height)?;
            let set = crate::data::bin_squares(&stack, args.square, args.frame_interval)?;
            (path.display().to_string(), set)
        }
        (None, None) => return Err(AppError::new(2, "Either --input or --frames is required.")),
    };

    let duration = args
        .duration
        .unwrap_or_else(|| set.frame_count().saturating_sub(args.start));
    let options = ChannelOptions {
        window: AnalysisWindow::new(args.start, duration).with_max_lag(args.max_lag),
        extreme: args.extreme_fraction.map(|fraction| ExtremeSelection {
            fraction,
            lag: args.extreme_lag,
            side: args.extreme_side,
        }),
    };

    let run = pipeline::run_channels(&source, &set, &options, &config)?;
    if args.channels {
        println!("{}", crate::report::format_channel_table(&run.channels));
    }
    present(&run.fit, &config)
}

fn handle_fit(args: CurveArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args.fit)?;
    let input = CurveInput {
        tau_scale: args.tau_scale,
        minus_one: args.minus_one,
    };
    let loaded = crate::io::load_correlator(&args.input, input)?;
    log_row_errors(&loaded.row_errors);
    info!(rows = loaded.rows_read, lags = loaded.curve.len(), "loaded correlator curve");

    let source = args.input.display().to_string();
    let run = pipeline::run_curve(&source, loaded.curve, loaded.mean_countrate, &config)?;
    present(&run, &config)
}

/// Print the summary and plot, then write exports.
fn present(run: &CurveRun, config: &FitConfig) -> Result<(), AppError> {
    println!(
        "{}",
        crate::report::format_run_summary(&run.dataset, &run.selection, config)
    );
    if config.plot {
        let plot = crate::plot::render_fit_plot(&run.data, &run.selection.best, config.plot_width, config.plot_height);
        println!("{plot}");
    }
    pipeline::write_exports(run, config)
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    if args.curve {
        let tau: Vec<f64> = (0..args.lags).map(|k| k as f64 * args.frame_interval).collect();
        let curve: CorrelationCurve =
            crate::data::synthetic_g2_curve(&tau, args.beta, &[(1.0, args.decay_rate)], args.noise, args.seed)?;
        crate::io::write_g2_csv(&args.output, &curve)?;
        info!(lags = curve.len(), path = %args.output.display(), "wrote synthetic g2 curve");
        return Ok(());
    }

    let sim = crate::data::SpeckleSimulation {
        channels: args.channels,
        frames: args.frames,
        frame_interval: args.frame_interval,
        decay_rate: args.decay_rate,
        beta: args.beta,
        brightness_spread: args.brightness_spread,
        mean_intensity: args.mean_intensity,
        noise_level: args.noise,
        seed: args.seed,
    };
    let set = crate::data::simulate_speckles(&sim)?;
    crate::io::write_traces_csv(&args.output, &set)?;
    info!(path = %args.output.display(), "wrote synthetic traces");
    Ok(())
}

fn handle_angles(args: AnglesArgs) -> Result<(), AppError> {
    let (observations, row_errors) = crate::io::load_angles(&args.input)?;
    log_row_errors(&row_errors);

    let params = PhysicalParams {
        wavelength_nm: args.wavelength,
        viscosity_mpa_s: args.viscosity,
        temperature_c: args.temperature,
        refractive_index: args.refractive_index,
        ..PhysicalParams::default()
    };
    crate::physics::validate_physical(&params)?;
    let fit = crate::physics::fit_diffusion(&observations, &params)?;
    println!(
        "{}",
        crate::report::format_angle_summary(&args.input.display().to_string(), &fit)
    );
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let result = crate::io::read_result_json(&args.result)?;
    println!("Source: {}", result.source);
    println!("{}", crate::report::format_fit(&result.best));
    println!("{}", crate::plot::render_result_plot(&result, args.width, args.height));
    Ok(())
}

fn log_row_errors(errors: &[RowError]) {
    for err in errors {
        warn!(line = err.line, message = %err.message, "skipped row");
    }
}

/// Build a `FitConfig` from the shared fit flags.
///
/// Guess order: explicit `--guess` vectors, then the data-derived guess, then
/// the decay-rate grid.
pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, AppError> {
    let mut initial_guesses = Vec::new();
    for raw in &args.guesses {
        initial_guesses.push(InitialGuess::Explicit(parse_guess(raw)?));
    }
    initial_guesses.push(InitialGuess::Auto);
    if let (Some(min), Some(max)) = (args.gamma_min, args.gamma_max) {
        initial_guesses.extend(crate::fit::decay_rate_guesses(min, max, args.gamma_steps)?);
    }

    Ok(FitConfig {
        physical: PhysicalParams {
            wavelength_nm: args.wavelength,
            scattering_angle_deg: args.angle,
            viscosity_mpa_s: args.viscosity,
            temperature_c: args.temperature,
            refractive_index: args.refractive_index,
        },
        range: FitRange {
            start: args.fit_start,
            falloff: args.falloff,
            max_tau: args.max_tau,
        },
        model_spec: args.model,
        target: args.target,
        initial_guesses,
        max_iterations: args.max_iterations,
        undefined_policy: args.undefined,
        baseline_tolerance: args.baseline_tolerance,
        plot: !args.no_plot,
        plot_width: args.plot_width,
        plot_height: args.plot_height,
        export_curve: args.export_curve.clone(),
        export_result: args.export_result.clone(),
        ..FitConfig::default()
    })
}

fn parse_guess(raw: &str) -> Result<Vec<f64>, AppError> {
    let values = raw
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| AppError::new(2, format!("Invalid value '{part}' in --guess '{raw}'.")))
        })
        .collect::<Result<Vec<f64>, AppError>>()?;
    Ok(values)
}
