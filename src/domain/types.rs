//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they
//! can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - reloaded later for plotting or comparisons

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::ModelKind;

/// One aligned `(flow, pressure drop)` observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    /// Independent variable (flow rate).
    pub x: f64,
    /// Observed dependent variable (pressure drop).
    pub y: f64,
}

/// One measurement series: a named column of the input CSV paired with the
/// shared flow column.
#[derive(Debug, Clone)]
pub struct Series {
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }
}

/// Per-point fitted values for reporting, plotting, and export.
#[derive(Debug, Clone)]
pub struct PointFit {
    pub x: f64,
    pub y_obs: f64,
    pub y_fit: f64,
    pub residual: f64,
    /// False once the point was excluded as an outlier.
    pub inlier: bool,
}

/// Fit quality over the surviving inliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitQuality {
    pub sse: f64,
    pub rmse: f64,
    pub n_inliers: usize,
    pub n_outliers: usize,
}

/// Final fit for a single series.
#[derive(Debug, Clone)]
pub struct SeriesFit {
    pub name: String,
    pub model: ModelKind,
    pub params: Vec<f64>,
    /// Inclusion mask over the series' points (true = inlier).
    pub mask: Vec<bool>,
    /// Completed fit attempts (1-indexed).
    pub iterations: usize,
    /// True when the loop stopped because no new outliers were found,
    /// false when it stopped at the iteration cap.
    pub converged: bool,
    pub quality: FitQuality,
}

/// Summary stats about the points actually used for fitting.
#[derive(Debug, Clone)]
pub struct DatasetStats {
    pub n_series: usize,
    pub n_points: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Input CSV; `None` means synthetic demo data.
    pub csv_path: Option<PathBuf>,

    pub model: ModelKind,
    /// Fixed physical constant of the valve model (specific gravity).
    pub k: f64,

    /// Residual z-score threshold (standard deviations).
    pub threshold: f64,
    /// Fit-and-remove iteration cap.
    pub max_iterations: usize,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_results: Option<PathBuf>,
    pub export_fit: Option<PathBuf>,

    // Synthetic sample settings (demo/TUI).
    pub sample_series: usize,
    pub sample_count: usize,
    pub sample_seed: u64,
    pub sample_cv: f64,
    pub sample_x_min: f64,
    pub sample_x_max: f64,
    pub sample_noise: f64,
    pub sample_outlier_prob: f64,
    pub sample_outlier_k: f64,
}

/// A saved fit file (JSON): the portable representation of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitFile {
    pub tool: String,
    pub model: ModelKind,
    /// Physical constant used by the valve model.
    pub k: f64,
    pub threshold: f64,
    pub max_iterations: usize,
    pub series: Vec<SeriesFitRecord>,
}

/// One series' fitted parameters plus a precomputed grid for quick plotting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesFitRecord {
    pub name: String,
    pub params: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    pub quality: FitQuality,
    /// Flow values of the excluded points.
    pub outlier_x: Vec<f64>,
    pub grid: FitGrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitGrid {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}
