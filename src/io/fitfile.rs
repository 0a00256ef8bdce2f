//! Read/write fit JSON files.
//!
//! Fit JSON is the "portable" representation of a finished run:
//! - model kind + fitted parameters per series
//! - the rejection settings the run used
//! - a precomputed fitted grid per series for quick plotting
//!
//! The schema is defined by `domain::FitFile`.

use std::fs::File;
use std::path::Path;

use crate::domain::{FitConfig, FitFile, FitGrid, Series, SeriesFit, SeriesFitRecord};
use crate::error::AppError;
use crate::models::Model;

/// Write a fit JSON file covering every fitted series.
pub fn write_fit_json(
    path: &Path,
    config: &FitConfig,
    model: &dyn Model,
    fits: &[(Series, SeriesFit)],
) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create fit JSON '{}': {e}", path.display())))?;

    let series = fits
        .iter()
        .map(|(series, fit)| {
            let xs = series.xs();
            let x_min = xs.iter().copied().fold(f64::INFINITY, f64::min);
            let x_max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let grid = build_grid(model, &fit.params, x_min, x_max, 101);

            let outlier_x = series
                .points
                .iter()
                .zip(&fit.mask)
                .filter(|&(_, &keep)| !keep)
                .map(|(p, _)| p.x)
                .collect();

            SeriesFitRecord {
                name: fit.name.clone(),
                params: fit.params.clone(),
                iterations: fit.iterations,
                converged: fit.converged,
                quality: fit.quality.clone(),
                outlier_x,
                grid,
            }
        })
        .collect();

    let fit_file = FitFile {
        tool: "cv".to_string(),
        model: config.model,
        k: config.k,
        threshold: config.threshold,
        max_iterations: config.max_iterations,
        series,
    };

    serde_json::to_writer_pretty(file, &fit_file)
        .map_err(|e| AppError::new(2, format!("Failed to write fit JSON: {e}")))?;

    Ok(())
}

/// Read a fit JSON file.
pub fn read_fit_json(path: &Path) -> Result<FitFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open fit JSON '{}': {e}", path.display())))?;
    let fit: FitFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid fit JSON: {e}")))?;
    Ok(fit)
}

fn build_grid(model: &dyn Model, params: &[f64], x_min: f64, x_max: f64, n: usize) -> FitGrid {
    let n = n.max(2);
    let mut x0 = x_min;
    let mut x1 = x_max;
    if !(x0.is_finite() && x1.is_finite()) || x1 <= x0 {
        x0 = 0.0;
        x1 = 1.0;
    }
    if (x1 - x0).abs() < 1e-9 {
        x0 = (x0 - 0.5).max(0.0);
        x1 += 0.5;
    }

    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);

    for i in 0..n {
        let u = i as f64 / (n as f64 - 1.0);
        let xi = x0 + u * (x1 - x0);
        x.push(xi);
        y.push(model.predict(xi, params));
    }

    FitGrid { x, y }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitQuality, SeriesPoint};
    use crate::models::{DEFAULT_K, ModelKind, ValveCv};

    fn demo_config() -> FitConfig {
        FitConfig {
            csv_path: None,
            model: ModelKind::Valve,
            k: DEFAULT_K,
            threshold: 2.0,
            max_iterations: 5,
            plot: false,
            plot_width: 72,
            plot_height: 20,
            export_results: None,
            export_fit: None,
            sample_series: 1,
            sample_count: 8,
            sample_seed: 42,
            sample_cv: 2.0,
            sample_x_min: 1.0,
            sample_x_max: 8.0,
            sample_noise: 0.0,
            sample_outlier_prob: 0.0,
            sample_outlier_k: 3.0,
        }
    }

    #[test]
    fn round_trips_a_fit_file() {
        let mut path = std::env::temp_dir();
        path.push(format!("cv_fitfile_test_{}.json", std::process::id()));

        let model = ValveCv { k: DEFAULT_K };
        let series = Series {
            name: "valve_a".to_string(),
            points: vec![
                SeriesPoint { x: 1.0, y: 0.25 },
                SeriesPoint { x: 2.0, y: 1.0 },
                SeriesPoint { x: 4.0, y: 9.0 },
            ],
        };
        let fit = SeriesFit {
            name: "valve_a".to_string(),
            model: ModelKind::Valve,
            params: vec![2.0],
            mask: vec![true, true, false],
            iterations: 2,
            converged: true,
            quality: FitQuality { sse: 0.0, rmse: 0.0, n_inliers: 2, n_outliers: 1 },
        };

        write_fit_json(&path, &demo_config(), &model, &[(series, fit)]).unwrap();
        let loaded = read_fit_json(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.tool, "cv");
        assert_eq!(loaded.model, ModelKind::Valve);
        assert_eq!(loaded.series.len(), 1);

        let record = &loaded.series[0];
        assert_eq!(record.params, vec![2.0]);
        assert_eq!(record.outlier_x, vec![4.0]);
        assert_eq!(record.grid.x.len(), 101);
        assert!((record.grid.x[0] - 1.0).abs() < 1e-12);
        assert!((record.grid.x[100] - 4.0).abs() < 1e-12);
    }
}
