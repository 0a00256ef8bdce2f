//! Parametric model implementations.
//!
//! Models are small, pure objects so that the fitting code can stay generic:
//! the robust fitter only ever sees the [`Model`] trait.

pub mod model;

pub use model::*;
