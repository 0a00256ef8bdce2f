//! Command-line parsing for the valve Cv curve fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::{DEFAULT_K, ModelKind};

pub mod picker;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "cv", version, about = "Valve Cv Curve Fitter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit Cv curves from a CSV of flow/pressure-drop measurements.
    Fit(FitArgs),
    /// Fit synthetic demo data (no CSV needed).
    Demo(FitArgs),
    /// Plot a previously exported fit JSON.
    Plot(PlotArgs),
    /// Launch the interactive TUI.
    ///
    /// This uses the same underlying fit pipeline as `cv fit`, but renders results
    /// in a terminal UI using Ratatui.
    Tui(FitArgs),
}

/// Common options for fitting.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Input CSV: first column is flow, each further column one series.
    #[arg(short = 'f', long, value_name = "CSV")]
    pub file: Option<PathBuf>,

    /// Which curve model to fit.
    #[arg(long, value_enum, default_value_t = ModelKind::Valve)]
    pub model: ModelKind,

    /// Specific-gravity constant of the valve square law.
    #[arg(long, default_value_t = DEFAULT_K)]
    pub k: f64,

    /// Residual z-score threshold (standard deviations) for outlier rejection.
    #[arg(short = 't', long, default_value_t = 2.0)]
    pub threshold: f64,

    /// Maximum fit-and-remove iterations per series.
    #[arg(long, default_value_t = 5)]
    pub max_iterations: usize,

    /// Render an ASCII plot in the terminal (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export per-point results to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export fits (params + fitted grid per series) to JSON.
    #[arg(long = "export-fit")]
    pub export_fit: Option<PathBuf>,

    /// Number of synthetic series to generate (demo/TUI).
    #[arg(long, default_value_t = 2)]
    pub series: usize,

    /// Number of synthetic points per series.
    #[arg(short = 'n', long, default_value_t = 24)]
    pub sample_count: usize,

    /// Random seed for sample generation.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// True Cv of the first synthetic series.
    #[arg(long, default_value_t = 2.0)]
    pub cv: f64,

    /// Minimum flow for generated samples.
    #[arg(long, default_value_t = 1.0)]
    pub x_min: f64,

    /// Maximum flow for generated samples.
    #[arg(long, default_value_t = 10.0)]
    pub x_max: f64,

    /// Relative Gaussian noise applied to generated pressure drops.
    #[arg(long, default_value_t = 0.02)]
    pub noise: f64,

    /// Probability of injecting an outlier at each generated point.
    #[arg(long, default_value_t = 0.08)]
    pub outlier_prob: f64,

    /// Magnitude multiplier for injected outliers.
    #[arg(long, default_value_t = 3.0)]
    pub outlier_k: f64,
}

/// Options for plotting a saved fit.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Fit JSON file produced by `cv fit --export-fit`.
    #[arg(long, value_name = "JSON")]
    pub fit: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}
