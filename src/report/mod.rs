//! Reporting: formatted terminal output for runs.

pub mod format;

pub use format::*;
