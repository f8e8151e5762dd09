//! Correlation stages: per-channel autocorrelation, ensemble reduction and
//! normalization.
//!
//! Data flow:
//!
//! ```text
//! ChannelSet -> correlate_channels -> ensemble_average -> normalize
//! ```

pub mod autocorrelator;
pub mod ensemble;
pub mod normalize;

pub use autocorrelator::*;
pub use ensemble::*;
pub use normalize::*;
