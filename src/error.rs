//! Error types.
//!
//! Two layers:
//!
//! - [`AnalysisError`]: typed failures of the correlation/fit core. Every variant
//!   names the offending channel, lag or model so callers can report precisely.
//! - [`AppError`]: what the `dls` binary prints, paired with a process exit code.
//!
//! Exit codes used throughout the binary:
//! - `2`: bad input, configuration or file IO
//! - `3`: data present but unusable (empty, degenerate)
//! - `4`: fit failure

use crate::domain::ModelKind;

/// Failures raised by the correlation-and-fit engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error(
        "Invalid analysis window for channel '{channel}': start={start}, duration={duration}, trace length={len}."
    )]
    InvalidWindow {
        channel: String,
        start: usize,
        duration: usize,
        len: usize,
    },

    #[error("Channel '{channel}' has non-positive mean intensity ({mean}) over the analysis window.")]
    DegenerateChannel { channel: String, mean: f64 },

    #[error("No channels supplied.")]
    EmptyChannelSet,

    #[error("Channel '{channel}' has {found} frames, expected {expected}.")]
    InconsistentTraceLength {
        channel: String,
        expected: usize,
        found: usize,
    },

    #[error("Correlation curve of channel '{channel}' has {found} lags, expected {expected}.")]
    InconsistentCurveLength {
        channel: String,
        expected: usize,
        found: usize,
    },

    #[error("Degenerate baseline: g2(0) - 1 = {value:e} is below tolerance {tolerance:e}.")]
    DegenerateBaseline { value: f64, tolerance: f64 },

    #[error("Field correlation undefined at lag {lag} (g2 below baseline).")]
    UndefinedField { lag: usize },

    #[error("{} fit did not converge ({attempts} initial guess(es), {evaluations} evaluations on the last).", model.display_name())]
    FitDidNotConverge {
        model: ModelKind,
        attempts: usize,
        evaluations: usize,
    },

    #[error("Invalid correlation curve: {0}")]
    InvalidCurve(String),

    #[error("Invalid frame binning: {0}")]
    InvalidBinning(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),
}

impl AnalysisError {
    /// Exit code used when this error reaches the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            AnalysisError::InvalidWindow { .. }
            | AnalysisError::InvalidCurve(_)
            | AnalysisError::InvalidBinning(_)
            | AnalysisError::InvalidConfig(_)
            | AnalysisError::InconsistentTraceLength { .. }
            | AnalysisError::InconsistentCurveLength { .. } => 2,
            AnalysisError::DegenerateChannel { .. }
            | AnalysisError::EmptyChannelSet
            | AnalysisError::DegenerateBaseline { .. }
            | AnalysisError::UndefinedField { .. }
            | AnalysisError::InsufficientData(_) => 3,
            AnalysisError::FitDidNotConverge { .. } => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
