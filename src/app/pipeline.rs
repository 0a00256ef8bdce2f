//! Shared "fit pipeline" logic used by both CLI and TUI front-ends.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! ingest (CSV or synthetic) -> per-series robust fit -> per-point results
//!
//! The CLI and the TUI can then focus on presentation (printing vs widgets).

use rayon::prelude::*;

use crate::data::generate_sample;
use crate::domain::{FitConfig, PointFit, Series, SeriesFit};
use crate::error::AppError;
use crate::fit::{RobustOptions, fit_robust};
use crate::io::ingest::{SeriesTable, load_series_table, table_from_series};

/// One successfully fitted series with its per-point results.
#[derive(Debug, Clone)]
pub struct SeriesRun {
    pub series: Series,
    pub fit: SeriesFit,
    pub points: Vec<PointFit>,
}

/// All computed outputs of a single `cv fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub table: SeriesTable,
    pub runs: Vec<SeriesRun>,
    /// Series that could not be fitted, with the reason. A run is only an
    /// error overall when every series fails.
    pub failures: Vec<(String, AppError)>,
}

/// Execute the full fitting pipeline and return the computed outputs.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, AppError> {
    let table = match &config.csv_path {
        Some(path) => load_series_table(path)?,
        None => table_from_series("flow", generate_sample(config)?)?,
    };
    run_fit_with_table(config, table)
}

/// Execute the fitting pipeline with a pre-loaded table.
///
/// This is useful for the TUI where we want to refit without re-reading.
pub fn run_fit_with_table(config: &FitConfig, table: SeriesTable) -> Result<RunOutput, AppError> {
    let model = config.model.build(config.k);
    let opts = RobustOptions {
        max_iterations: config.max_iterations,
        threshold: config.threshold,
    };

    // Series are independent; fit them in parallel.
    let results: Vec<Result<SeriesRun, (String, AppError)>> = table
        .series
        .par_iter()
        .map(|series| {
            let xs = series.xs();
            let ys = series.ys();
            fit_robust(model.as_ref(), &xs, &ys, &opts)
                .and_then(|robust| crate::report::build_series_fit(config, model.as_ref(), series, &robust))
                .map(|(fit, points)| SeriesRun {
                    series: series.clone(),
                    fit,
                    points,
                })
                .map_err(|err| (series.name.clone(), err))
        })
        .collect();

    let mut runs = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(run) => runs.push(run),
            Err(failure) => failures.push(failure),
        }
    }

    if runs.is_empty() {
        return match failures.into_iter().next() {
            Some((name, err)) => Err(AppError::new(
                err.exit_code(),
                format!("No series could be fitted. First failure ({name}): {err}"),
            )),
            None => Err(AppError::new(3, "No series to fit.")),
        };
    }

    Ok(RunOutput { table, runs, failures })
}
