//! Decay model implementations.
//!
//! Models are implemented as small, pure functions dispatched on `ModelKind`
//! so that fitting/search code can stay generic.

pub mod model;

pub use model::*;
