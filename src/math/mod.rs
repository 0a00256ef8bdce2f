//! Mathematical utilities: statistics primitives and nonlinear least squares.

pub mod lm;
pub mod stats;

pub use lm::*;
pub use stats::*;
