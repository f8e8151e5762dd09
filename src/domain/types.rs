//! Shared domain types.
//!
//! These types are intentionally kept lightweight so they can be:
//!
//! - produced by the loaders (CSV ingest, synthetic generators, frame binning)
//! - passed through the correlation and fit stages without copying state around
//! - exported to JSON/CSV by the boundary layer
//!
//! Nothing here is long-lived: every value is created and dropped within one
//! analysis invocation.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// One detection channel (a speckle or a correlator channel) and its intensity samples.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityTrace {
    pub id: String,
    /// Intensity per frame, in frame order.
    pub samples: Vec<f64>,
}

impl IntensityTrace {
    pub fn new(id: impl Into<String>, samples: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// All channels of one measurement.
///
/// Invariants (checked by [`ChannelSet::new`]):
/// - at least one channel
/// - every trace has the same frame count
/// - a finite, positive sampling interval
///
/// The set is read-only once built; the correlation stage only borrows it.
#[derive(Debug, Clone)]
pub struct ChannelSet {
    channels: Vec<IntensityTrace>,
    frame_interval: f64,
}

impl ChannelSet {
    pub fn new(channels: Vec<IntensityTrace>, frame_interval: f64) -> Result<Self, AnalysisError> {
        let Some(first) = channels.first() else {
            return Err(AnalysisError::EmptyChannelSet);
        };
        if !(frame_interval.is_finite() && frame_interval > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "frame interval must be finite and > 0, got {frame_interval}"
            )));
        }
        let expected = first.len();
        for trace in &channels[1..] {
            if trace.len() != expected {
                return Err(AnalysisError::InconsistentTraceLength {
                    channel: trace.id.clone(),
                    expected,
                    found: trace.len(),
                });
            }
        }
        Ok(Self {
            channels,
            frame_interval,
        })
    }

    pub fn channels(&self) -> &[IntensityTrace] {
        &self.channels
    }

    pub fn frame_interval(&self) -> f64 {
        self.frame_interval
    }

    /// Frames per channel (uniform across the set).
    pub fn frame_count(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Sub-range of every trace used for correlation, in frame units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    /// First frame of the window.
    pub start: usize,
    /// Number of frames in the window.
    pub duration: usize,
    /// Optional cap on the number of computed lags (`0..max_lag`).
    pub max_lag: Option<usize>,
}

impl AnalysisWindow {
    pub fn new(start: usize, duration: usize) -> Self {
        Self {
            start,
            duration,
            max_lag: None,
        }
    }

    /// Window covering a whole trace of `len` frames.
    pub fn full(len: usize) -> Self {
        Self::new(0, len)
    }

    pub fn with_max_lag(mut self, max_lag: Option<usize>) -> Self {
        self.max_lag = max_lag;
        self
    }

    /// Number of lags produced for this window.
    pub fn lag_count(&self) -> usize {
        match self.max_lag {
            Some(m) => m.min(self.duration),
            None => self.duration,
        }
    }

    /// Check the window against a trace of `len` frames.
    pub fn validate(&self, channel: &str, len: usize) -> Result<(), AnalysisError> {
        let end = self.start.checked_add(self.duration);
        let lags_ok = self.max_lag.map(|m| m > 0).unwrap_or(true);
        match end {
            Some(end) if self.duration > 0 && end <= len && lags_ok => Ok(()),
            _ => Err(AnalysisError::InvalidWindow {
                channel: channel.to_string(),
                start: self.start,
                duration: self.duration,
                len,
            }),
        }
    }
}

/// An intensity autocorrelation curve: `g2[k]` at lag time `tau[k]`.
///
/// Index 0 is the reference baseline used by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationCurve {
    pub tau: Vec<f64>,
    pub g2: Vec<f64>,
}

impl CorrelationCurve {
    /// Curve sampled at integer lags `k · frame_interval`.
    pub fn from_lags(g2: Vec<f64>, frame_interval: f64) -> Self {
        let tau = (0..g2.len()).map(|k| k as f64 * frame_interval).collect();
        Self { tau, g2 }
    }

    /// Curve from pre-tabulated `(tau, g2)` pairs, e.g. a hardware correlator export.
    pub fn from_pairs(tau: Vec<f64>, g2: Vec<f64>) -> Result<Self, AnalysisError> {
        if tau.len() != g2.len() {
            return Err(AnalysisError::InvalidCurve(format!(
                "{} lag times but {} correlation values",
                tau.len(),
                g2.len()
            )));
        }
        if g2.is_empty() {
            return Err(AnalysisError::InvalidCurve("curve has no points".to_string()));
        }
        if let Some(k) = tau.iter().zip(&g2).position(|(t, g)| !(t.is_finite() && g.is_finite())) {
            return Err(AnalysisError::InvalidCurve(format!("non-finite value at lag {k}")));
        }
        if let Some(k) = tau.windows(2).position(|w| w[1] <= w[0]) {
            return Err(AnalysisError::InvalidCurve(format!(
                "lag times must be strictly increasing (lag {})",
                k + 1
            )));
        }
        Ok(Self { tau, g2 })
    }

    pub fn len(&self) -> usize {
        self.g2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.g2.is_empty()
    }
}

/// Per-channel correlation output of the autocorrelator.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCorrelation {
    pub channel: String,
    pub curve: CorrelationCurve,
    /// Time-averaged intensity over the analysis window (always > 0).
    pub mean_intensity: f64,
}

/// Normalized correlation and Siegert-derived field correlation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedField {
    pub tau: Vec<f64>,
    /// `(g2 - 1) / (g2(0) - 1)`, exactly 1 at lag 0.
    pub g2minus1: Vec<f64>,
    /// `sqrt(g2minus1)`; `None` marks lags where the radicand is negative.
    pub field: Vec<Option<f64>>,
    /// Coherence factor `g2(0) - 1`.
    pub beta: f64,
}

impl NormalizedField {
    /// Lags flagged as undefined (negative radicand).
    pub fn undefined_lags(&self) -> Vec<usize> {
        self.field
            .iter()
            .enumerate()
            .filter_map(|(k, f)| if f.is_none() { Some(k) } else { None })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tau.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tau.is_empty()
    }
}

/// Which decay model(s) to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelSpec {
    Single,
    Double,
    Cumulant2,
    Cumulant3,
    /// Single and double exponential, chosen by BIC.
    Auto,
    /// Every model, chosen by BIC.
    All,
}

/// Concrete decay model kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    SingleExp,
    DoubleExp,
    Cumulant2,
    Cumulant3,
}

impl ModelKind {
    /// Order of increasing complexity, used when preferring simpler models.
    pub const ALL: [ModelKind; 4] = [
        ModelKind::SingleExp,
        ModelKind::Cumulant2,
        ModelKind::Cumulant3,
        ModelKind::DoubleExp,
    ];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::SingleExp => "Single exponential",
            ModelKind::DoubleExp => "Double exponential",
            ModelKind::Cumulant2 => "2-cumulant",
            ModelKind::Cumulant3 => "3-cumulant",
        }
    }

    /// Number of free parameters.
    pub fn param_count(self) -> usize {
        self.param_names().len()
    }

    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            ModelKind::SingleExp => &["A", "Gamma"],
            ModelKind::DoubleExp => &["A1", "Gamma1", "A2", "Gamma2"],
            ModelKind::Cumulant2 => &["A", "Gamma", "mu2"],
            ModelKind::Cumulant3 => &["A", "Gamma", "mu2", "mu3"],
        }
    }

    pub fn param_units(self) -> &'static [&'static str] {
        match self {
            ModelKind::SingleExp => &["1", "1/s"],
            ModelKind::DoubleExp => &["1", "1/s", "1", "1/s"],
            ModelKind::Cumulant2 => &["1", "1/s", "1/s^2"],
            ModelKind::Cumulant3 => &["1", "1/s", "1/s^2", "1/s^3"],
        }
    }
}

/// Which correlation the model is fitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FitTarget {
    /// Normalized field correlation `f(τ) = Σ A·exp(-Γτ)`.
    Field,
    /// Un-normalized `g2 - 1 = Σ A·exp(-2Γτ)`; the amplitude is the coherence factor.
    Intensity,
}

impl FitTarget {
    /// Multiplier applied to the decay exponent.
    pub fn exponent_scale(self) -> f64 {
        match self {
            FitTarget::Field => 1.0,
            FitTarget::Intensity => 2.0,
        }
    }
}

/// What to do with lags whose field correlation is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UndefinedPolicy {
    /// Drop the lag from the fit input.
    Exclude,
    /// Use a field value of zero.
    Clip,
    /// Fail the analysis with `UndefinedField`.
    Abort,
}

/// How per-channel curves are reduced into one ensemble curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EnsembleMethod {
    /// `M · Σ g2_i·m_i² / (Σ m_i)²`
    BruteForce,
    /// `Σ g2_i·m_i² / Σ m_i²`
    Weighted,
}

/// Frames used for the mean countrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CountrateWindow {
    /// Same window as the correlation.
    Analysis,
    /// The whole trace.
    Full,
}

/// A starting point for the nonlinear fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InitialGuess {
    /// Derived from the data by the model's guess routine.
    Auto,
    /// Explicit parameter vector; only tried for models of matching length.
    Explicit(Vec<f64>),
    /// Data-derived amplitude with a fixed starting decay rate (1/s).
    DecayRate(f64),
}

/// Physical constants of the measurement, in lab units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalParams {
    pub wavelength_nm: f64,
    pub scattering_angle_deg: f64,
    pub viscosity_mpa_s: f64,
    pub temperature_c: f64,
    pub refractive_index: f64,
}

impl Default for PhysicalParams {
    fn default() -> Self {
        Self {
            wavelength_nm: 632.8,
            scattering_angle_deg: 90.0,
            viscosity_mpa_s: 0.89,
            temperature_c: 25.0,
            refractive_index: 1.33,
        }
    }
}

/// Which part of the normalized curve enters the fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitRange {
    /// First lag index used.
    pub start: usize,
    /// Stop before the first point whose value drops below `falloff × value(start)`.
    pub falloff: Option<f64>,
    /// Largest lag time (seconds) used.
    pub max_tau: Option<f64>,
}

impl Default for FitRange {
    fn default() -> Self {
        Self {
            start: 0,
            falloff: None,
            max_tau: None,
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub physical: PhysicalParams,
    pub range: FitRange,
    pub model_spec: ModelSpec,
    pub target: FitTarget,
    /// Tried in order; the first converging guess wins.
    pub initial_guesses: Vec<InitialGuess>,
    /// Iteration bound per Levenberg–Marquardt run.
    pub max_iterations: usize,
    pub undefined_policy: UndefinedPolicy,
    /// Smallest acceptable `|g2(0) - 1|`.
    pub baseline_tolerance: f64,
    pub ensemble_method: EnsembleMethod,
    pub countrate_window: CountrateWindow,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_curve: Option<PathBuf>,
    pub export_result: Option<PathBuf>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            physical: PhysicalParams::default(),
            range: FitRange::default(),
            model_spec: ModelSpec::Single,
            target: FitTarget::Field,
            initial_guesses: vec![InitialGuess::Auto],
            max_iterations: 200,
            undefined_policy: UndefinedPolicy::Exclude,
            baseline_tolerance: 1e-9,
            ensemble_method: EnsembleMethod::BruteForce,
            countrate_window: CountrateWindow::Analysis,
            plot: false,
            plot_width: 100,
            plot_height: 25,
            export_curve: None,
            export_result: None,
        }
    }
}

/// Why the Levenberg–Marquardt solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Termination {
    /// Relative cost reduction fell below tolerance (or cost is zero).
    Cost,
    /// Parameter step fell below tolerance.
    Step,
    /// Gradient vanished.
    Gradient,
}

/// Fit quality diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    pub sse: f64,
    pub rmse: f64,
    pub bic: f64,
    pub n: usize,
    /// Model evaluations spent by the solver.
    pub evaluations: usize,
    pub termination: Termination,
    /// Index of the initial guess that converged.
    pub attempt: usize,
}

/// One fitted parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitParameter {
    pub name: String,
    pub value: f64,
    /// Standard error from the covariance matrix; `None` if it is singular.
    pub std_error: Option<f64>,
    pub unit: String,
}

/// One exponential decay mode with its physical interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayComponent {
    pub amplitude: f64,
    /// Decay rate Γ (1/s).
    pub decay_rate: f64,
    /// Diffusion coefficient (m²/s), when Γ > 0.
    pub diffusion_coefficient: Option<f64>,
    /// Stokes–Einstein hydrodynamic radius (nm), when Γ > 0.
    pub radius_nm: Option<f64>,
}

/// Physical quantities derived from a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalResult {
    /// Scattering vector magnitude q (1/m).
    pub scattering_vector: f64,
    pub components: Vec<DecayComponent>,
    pub coherence_factor: f64,
    /// Raw average intensity; not derived from the fit.
    pub mean_countrate: Option<f64>,
    /// `μ₂ / Γ²` for cumulant models.
    pub polydispersity: Option<f64>,
}

/// Non-fatal conditions attached to a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FitWarning {
    /// A converged fit with Γ ≤ 0 for the given component.
    NegativeDecayRate { component: usize },
    /// Two decay modes collapsed into one.
    DegenerateComponents,
    /// Undefined field lags dropped from the fit input.
    ExcludedUndefinedLags { count: usize },
    /// Undefined field lags replaced by zero.
    ClippedUndefinedLags { count: usize },
}

impl std::fmt::Display for FitWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitWarning::NegativeDecayRate { component } => write!(
                f,
                "component {} has a non-positive decay rate (physically implausible)",
                component + 1
            ),
            FitWarning::DegenerateComponents => {
                write!(f, "decay rates coincide; components merged into one")
            }
            FitWarning::ExcludedUndefinedLags { count } => {
                write!(f, "{count} lag(s) with undefined field excluded from fit")
            }
            FitWarning::ClippedUndefinedLags { count } => {
                write!(f, "{count} lag(s) with undefined field clipped to zero")
            }
        }
    }
}

/// Fit output for a single model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub model: ModelKind,
    pub display_name: String,
    pub target: FitTarget,
    pub params: Vec<FitParameter>,
    pub quality: FitQuality,
    pub physical: PhysicalResult,
    pub warnings: Vec<FitWarning>,
}

impl FitResult {
    /// Raw parameter vector in model order.
    pub fn values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }
}

/// A model that was not fitted, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedModel {
    pub model: ModelKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveGrid {
    pub tau: Vec<f64>,
    pub y: Vec<f64>,
}

/// A saved result file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub physical: PhysicalParams,
    pub target: FitTarget,
    pub beta: f64,
    pub best: FitResult,
    pub fits: Vec<FitResult>,
    pub skipped: Vec<SkippedModel>,
    /// Points that entered the fit.
    pub data: CurveGrid,
    /// Fitted model on a log-spaced lag grid.
    pub grid: CurveGrid,
}
