//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - measurement inputs (`IntensityTrace`, `ChannelSet`, `AnalysisWindow`)
//! - intermediate curves (`CorrelationCurve`, `NormalizedField`)
//! - configuration enums (`ModelSpec`, `FitTarget`, `UndefinedPolicy`, ...)
//! - fit outputs (`FitResult`, `PhysicalResult`, `ResultFile`)

pub mod types;

pub use types::*;
