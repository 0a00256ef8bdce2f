//! Reporting utilities: per-point fits, quality, and formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized (important for future snapshot tests)

use crate::domain::{DatasetStats, FitConfig, FitQuality, PointFit, Series, SeriesFit};
use crate::error::AppError;
use crate::fit::RobustFit;
use crate::io::ingest::RowError;
use crate::models::Model;

/// Compute fitted values and residuals for every point of a series,
/// tagged with the final inclusion mask.
pub fn compute_point_fits(
    model: &dyn Model,
    params: &[f64],
    series: &Series,
    mask: &[bool],
) -> Result<Vec<PointFit>, AppError> {
    let mut out = Vec::with_capacity(series.points.len());
    for (p, &inlier) in series.points.iter().zip(mask) {
        let y_fit = model.predict(p.x, params);
        if !y_fit.is_finite() {
            return Err(AppError::numeric("Non-finite model prediction during residual computation."));
        }
        out.push(PointFit {
            x: p.x,
            y_obs: p.y,
            y_fit,
            residual: p.y - y_fit,
            inlier,
        });
    }
    Ok(out)
}

/// Fit quality over the surviving inliers.
pub fn compute_quality(points: &[PointFit]) -> FitQuality {
    let mut sse = 0.0;
    let mut n_inliers = 0usize;
    for p in points {
        if p.inlier {
            sse += p.residual * p.residual;
            n_inliers += 1;
        }
    }
    let rmse = if n_inliers > 0 { (sse / n_inliers as f64).sqrt() } else { 0.0 };
    FitQuality {
        sse,
        rmse,
        n_inliers,
        n_outliers: points.len() - n_inliers,
    }
}

/// Assemble the final per-series fit from the raw loop result.
pub fn build_series_fit(
    config: &FitConfig,
    model: &dyn Model,
    series: &Series,
    robust: &RobustFit,
) -> Result<(SeriesFit, Vec<PointFit>), AppError> {
    let points = compute_point_fits(model, &robust.params, series, &robust.mask)?;
    let quality = compute_quality(&points);
    let fit = SeriesFit {
        name: series.name.clone(),
        model: config.model,
        params: robust.params.clone(),
        mask: robust.mask.clone(),
        iterations: robust.iterations,
        converged: robust.converged,
        quality,
    };
    Ok((fit, points))
}

/// Format the run header (settings + dataset stats).
pub fn format_run_header(config: &FitConfig, stats: &DatasetStats, x_label: &str) -> String {
    let mut out = String::new();

    out.push_str("=== cv - Valve Cv Curve Fit ===\n");
    out.push_str(&format!("Model: {}\n", config.model.display_name()));
    out.push_str(&format!(
        "Rejection: threshold={:.2} sigma | max_iterations={}\n",
        config.threshold, config.max_iterations
    ));
    out.push_str(&format!(
        "Points: n={} across {} series | {}=[{:.3}, {:.3}] | dp=[{:.3}, {:.3}]\n",
        stats.n_points, stats.n_series, x_label, stats.x_min, stats.x_max, stats.y_min, stats.y_max
    ));

    out
}

/// Format one fitted series.
pub fn format_series_fit(fit: &SeriesFit, points: &[PointFit]) -> String {
    let mut out = String::new();

    out.push_str(&format!("\n--- {} ---\n", fit.name));
    out.push_str(&format!("- params: {}\n", fmt_params(fit)));
    out.push_str(&format!(
        "- iterations: {}{}\n",
        fit.iterations,
        if fit.converged { "" } else { " (stopped at cap)" }
    ));
    out.push_str(&format!(
        "- quality: SSE={:.6} RMSE={:.6} over {} inliers\n",
        fit.quality.sse, fit.quality.rmse, fit.quality.n_inliers
    ));

    if fit.quality.n_outliers == 0 {
        out.push_str("- outliers: none\n");
    } else {
        let flows: Vec<String> = points
            .iter()
            .filter(|p| !p.inlier)
            .map(|p| format!("{:.4}", p.x))
            .collect();
        out.push_str(&format!(
            "- outliers: {} removed at flow [{}]\n",
            fit.quality.n_outliers,
            flows.join(", ")
        ));
    }

    out
}

/// Format skipped series (fit failures in a multi-series run).
pub fn format_series_failures(failures: &[(String, AppError)]) -> String {
    let mut out = String::new();
    for (name, err) in failures {
        out.push_str(&format!("\n--- {name} ---\n"));
        out.push_str(&format!("- skipped: {err}\n"));
    }
    out
}

/// Format row-level ingest warnings (capped so a broken file stays readable).
pub fn format_row_errors(row_errors: &[RowError]) -> String {
    const MAX_SHOWN: usize = 10;

    let mut out = String::new();
    if row_errors.is_empty() {
        return out;
    }

    out.push_str(&format!("\nIngest warnings ({} cells skipped):\n", row_errors.len()));
    for e in row_errors.iter().take(MAX_SHOWN) {
        match &e.series {
            Some(series) => out.push_str(&format!("- line {} [{}]: {}\n", e.line, series, e.message)),
            None => out.push_str(&format!("- line {}: {}\n", e.line, e.message)),
        }
    }
    if row_errors.len() > MAX_SHOWN {
        out.push_str(&format!("- ... and {} more\n", row_errors.len() - MAX_SHOWN));
    }

    out
}

fn fmt_params(fit: &SeriesFit) -> String {
    match fit.model {
        crate::models::ModelKind::Valve => format!("Cv={:.6}", fit.params[0]),
        crate::models::ModelKind::PowerLaw => {
            format!("a={:.6}, b={:.6}", fit.params[0], fit.params[1])
        }
    }
}
