//! `dls-fit` library crate.
//!
//! The binary (`dls`) is a thin wrapper around this library so that:
//!
//! - the correlation and fit core is testable without spawning processes
//! - the pipeline stages are reusable on their own (e.g. correlate only)
//!
//! Data flow: `ChannelSet` -> `correlate` -> `fit` -> `physics` -> `report`/`io`.

pub mod app;
pub mod cli;
pub mod correlate;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod physics;
pub mod plot;
pub mod report;
