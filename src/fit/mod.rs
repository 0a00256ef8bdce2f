//! Robust curve fitting.
//!
//! Responsibilities:
//!
//! - run the iterative fit-and-remove-outliers loop per series
//! - guard well-posedness before every solve
//! - keep the inclusion mask consistent with the original point order

pub mod robust;

pub use robust::*;
