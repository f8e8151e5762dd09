//! Curve fitting orchestration.
//!
//! Responsibilities:
//!
//! - prepare the fit input (range, target, undefined lags)
//! - fit each model from an ordered list of initial guesses
//! - select best model using BIC + guardrails

pub mod data;
pub mod fitter;
pub mod rate_grid;
pub mod selection;

pub use data::*;
pub use fitter::*;
pub use rate_grid::*;
pub use selection::*;
