//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - curve and trace exports (CSV) (`export`)
//! - result JSON read/write (`result`)

pub mod export;
pub mod ingest;
pub mod result;

pub use export::*;
pub use ingest::*;
pub use result::*;
