//! Shared domain types.
//!
//! This module defines:
//!
//! - normalized measurement series (`Series`, `SeriesPoint`)
//! - fit outputs (`SeriesFit`, `FitQuality`, `PointFit`)
//! - run configuration (`FitConfig`) and the fit-file export schema

pub mod types;

pub use types::*;
