//! Command-line parsing for the `dls` correlation and fit tool.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! correlation, fitting and physics code. `app` turns these structs into a
//! `FitConfig` and dispatches.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::correlate::ExtremeSide;
use crate::domain::{CountrateWindow, EnsembleMethod, FitTarget, ModelSpec, UndefinedPolicy};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "dls", version, about = "Dynamic light scattering: multi-speckle correlation and decay fitting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Correlate intensity traces (or binned camera frames), then normalize and fit.
    Correlate(CorrelateArgs),
    /// Fit a pre-computed correlation curve.
    Fit(CurveArgs),
    /// Write synthetic speckle traces (or a synthetic g2 curve).
    Simulate(SimulateArgs),
    /// Hydrodynamic radius from decay rates measured at several angles.
    Angles(AnglesArgs),
    /// Plot a previously exported result JSON.
    Plot(PlotArgs),
}

/// Options for correlating raw traces.
#[derive(Debug, Args, Clone)]
pub struct CorrelateArgs {
    /// Trace CSV: one column per channel, one row per frame.
    #[arg(long, value_name = "CSV", required_unless_present = "frames", conflicts_with = "frames")]
    pub input: Option<PathBuf>,

    /// Raw frame CSV: one flattened frame per row, no header.
    #[arg(long, value_name = "CSV", requires_all = ["width", "height"])]
    pub frames: Option<PathBuf>,

    /// Frame width in pixels (with --frames).
    #[arg(long)]
    pub width: Option<usize>,

    /// Frame height in pixels (with --frames).
    #[arg(long)]
    pub height: Option<usize>,

    /// Side of the square pixel bins forming one channel (with --frames).
    #[arg(long, default_value_t = 1)]
    pub square: usize,

    /// Seconds between frames.
    #[arg(long, default_value_t = 1e-4)]
    pub frame_interval: f64,

    /// First frame of the analysis window.
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// Frames in the analysis window (default: to the end of the traces).
    #[arg(long)]
    pub duration: Option<usize>,

    /// Only compute lags 0..max-lag.
    #[arg(long)]
    pub max_lag: Option<usize>,

    /// How per-channel curves are combined.
    #[arg(long, value_enum, default_value_t = EnsembleMethod::BruteForce)]
    pub ensemble: EnsembleMethod,

    /// Frames used for the mean countrate.
    #[arg(long, value_enum, default_value_t = CountrateWindow::Analysis)]
    pub countrate_window: CountrateWindow,

    /// Keep only this fraction of extreme channels before averaging.
    #[arg(long)]
    pub extreme_fraction: Option<f64>,

    /// Lag at which channels are ranked for --extreme-fraction.
    #[arg(long, default_value_t = 1)]
    pub extreme_lag: usize,

    /// Which extreme channels to keep.
    #[arg(long, value_enum, default_value_t = ExtremeSide::Both)]
    pub extreme_side: ExtremeSide,

    /// Print the per-channel table.
    #[arg(long)]
    pub channels: bool,

    #[command(flatten)]
    pub fit: FitArgs,
}

/// Options for fitting a correlator curve.
#[derive(Debug, Args, Clone)]
pub struct CurveArgs {
    /// Curve CSV with `tau` and `g2` columns (optional `countrate`).
    #[arg(long, value_name = "CSV")]
    pub input: PathBuf,

    /// The value column holds g2 - 1 instead of g2.
    #[arg(long)]
    pub minus_one: bool,

    /// Multiplier turning the tau column into seconds (e.g. 1e-3 for ms).
    #[arg(long, default_value_t = 1.0)]
    pub tau_scale: f64,

    #[command(flatten)]
    pub fit: FitArgs,
}

/// Fit options shared by `correlate` and `fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Which model(s) to fit.
    #[arg(long, value_enum, default_value_t = ModelSpec::Single)]
    pub model: ModelSpec,

    /// Fit the field correlation or g2 - 1.
    #[arg(long, value_enum, default_value_t = FitTarget::Field)]
    pub target: FitTarget,

    /// Handling of lags where the field correlation is undefined.
    #[arg(long, value_enum, default_value_t = UndefinedPolicy::Exclude)]
    pub undefined: UndefinedPolicy,

    /// Smallest acceptable |g2(0) - 1|.
    #[arg(long, default_value_t = 1e-9)]
    pub baseline_tolerance: f64,

    /// Laser wavelength in vacuum (nm).
    #[arg(long, default_value_t = 632.8)]
    pub wavelength: f64,

    /// Scattering angle (degrees).
    #[arg(long, default_value_t = 90.0)]
    pub angle: f64,

    /// Solvent viscosity (mPa·s).
    #[arg(long, default_value_t = 0.89)]
    pub viscosity: f64,

    /// Temperature (°C).
    #[arg(long, default_value_t = 25.0)]
    pub temperature: f64,

    /// Solvent refractive index.
    #[arg(long, default_value_t = 1.33)]
    pub refractive_index: f64,

    /// First lag index entering the fit.
    #[arg(long, default_value_t = 0)]
    pub fit_start: usize,

    /// End the fit before the curve drops below this fraction of its start value.
    #[arg(long)]
    pub falloff: Option<f64>,

    /// Largest lag time (s) entering the fit.
    #[arg(long)]
    pub max_tau: Option<f64>,

    /// Explicit initial parameters, comma separated (repeatable).
    #[arg(long = "guess", value_name = "P1,P2,..")]
    pub guesses: Vec<String>,

    /// Smallest decay rate (1/s) of the starting-point grid.
    #[arg(long, requires = "gamma_max")]
    pub gamma_min: Option<f64>,

    /// Largest decay rate (1/s) of the starting-point grid.
    #[arg(long, requires = "gamma_min")]
    pub gamma_max: Option<f64>,

    /// Points in the starting-point grid.
    #[arg(long, default_value_t = 8)]
    pub gamma_steps: usize,

    /// Iteration bound per Levenberg–Marquardt run.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long = "plot-width", default_value_t = 100)]
    pub plot_width: usize,

    /// Plot height (rows).
    #[arg(long = "plot-height", default_value_t = 25)]
    pub plot_height: usize,

    /// Export the analysed curve (tau, g2, normalized, field, fitted) to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_curve: Option<PathBuf>,

    /// Export the full result to JSON.
    #[arg(long, value_name = "JSON")]
    pub export_result: Option<PathBuf>,
}

/// Options for the simulator.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Output CSV (traces, or `tau,g2` with --curve).
    #[arg(long, value_name = "CSV")]
    pub output: PathBuf,

    /// Write a noisy g2 curve instead of speckle traces.
    #[arg(long)]
    pub curve: bool,

    #[arg(long, default_value_t = 64)]
    pub channels: usize,

    #[arg(long, default_value_t = 10_000)]
    pub frames: usize,

    /// Seconds between frames (or between curve lags).
    #[arg(long, default_value_t = 1e-4)]
    pub frame_interval: f64,

    /// Field decay rate Γ (1/s).
    #[arg(long, default_value_t = 500.0)]
    pub decay_rate: f64,

    /// Coherence factor β.
    #[arg(long, default_value_t = 0.8)]
    pub beta: f64,

    /// Log-normal σ of per-channel brightness.
    #[arg(long, default_value_t = 0.0)]
    pub brightness_spread: f64,

    /// Mean intensity of a unit-brightness channel.
    #[arg(long, default_value_t = 100.0)]
    pub mean_intensity: f64,

    /// Detector noise σ relative to the channel mean (traces) or absolute (curve).
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Lags written with --curve.
    #[arg(long, default_value_t = 200)]
    pub lags: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Options for multi-angle analysis.
#[derive(Debug, Args, Clone)]
pub struct AnglesArgs {
    /// CSV with `angle_deg` and `gamma` columns.
    #[arg(long, value_name = "CSV")]
    pub input: PathBuf,

    /// Laser wavelength in vacuum (nm).
    #[arg(long, default_value_t = 632.8)]
    pub wavelength: f64,

    /// Solvent viscosity (mPa·s).
    #[arg(long, default_value_t = 0.89)]
    pub viscosity: f64,

    /// Temperature (°C).
    #[arg(long, default_value_t = 25.0)]
    pub temperature: f64,

    /// Solvent refractive index.
    #[arg(long, default_value_t = 1.33)]
    pub refractive_index: f64,
}

/// Options for plotting a saved result.
#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Result JSON produced by `--export-result`.
    #[arg(long, value_name = "JSON")]
    pub result: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn correlate_accepts_frames_with_size() {
        let cli = Cli::try_parse_from([
            "dls", "correlate", "--frames", "f.csv", "--width", "8", "--height", "4", "--square", "2",
        ])
        .unwrap();
        let Command::Correlate(args) = cli.command else {
            panic!("expected correlate");
        };
        assert_eq!(args.width, Some(8));
        assert_eq!(args.square, 2);
        assert!(args.input.is_none());
    }

    #[test]
    fn correlate_requires_an_input() {
        assert!(Cli::try_parse_from(["dls", "correlate"]).is_err());
        assert!(Cli::try_parse_from(["dls", "correlate", "--frames", "f.csv"]).is_err());
    }

    #[test]
    fn fit_parses_guesses_and_enums() {
        let cli = Cli::try_parse_from([
            "dls",
            "fit",
            "--input",
            "g2.csv",
            "--model",
            "all",
            "--target",
            "intensity",
            "--guess",
            "1,500",
            "--guess",
            "0.5,100,0.5,2000",
            "--undefined",
            "clip",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.fit.model, ModelSpec::All);
        assert_eq!(args.fit.target, FitTarget::Intensity);
        assert_eq!(args.fit.undefined, UndefinedPolicy::Clip);
        assert_eq!(args.fit.guesses, vec!["1,500", "0.5,100,0.5,2000"]);
    }
}
