//! Measurement producers that do not come from files: the speckle and curve
//! simulators, and square binning of camera frames.

pub mod frames;
pub mod synthetic;

pub use frames::*;
pub use synthetic::*;
