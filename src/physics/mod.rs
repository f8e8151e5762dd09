//! Physical interpretation of fitted decay rates.

pub mod angles;
pub mod stokes_einstein;

pub use angles::*;
pub use stokes_einstein::*;
