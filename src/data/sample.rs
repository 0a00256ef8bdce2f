//! Synthetic measurement generation for demos and the TUI.
//!
//! Samples follow the valve square law with a known Cv, plus multiplicative
//! Gaussian noise and occasional injected outliers. Generation is fully
//! deterministic for a given config, so the demo, TUI resamples, and tests
//! all reproduce.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{FitConfig, Series, SeriesPoint};
use crate::error::AppError;
use crate::models::{Model, ValveCv};

/// Cv spacing between consecutive generated series.
///
/// Each series gets `sample_cv + i * CV_STEP`, so a multi-series demo shows
/// visually distinct curves.
const CV_STEP: f64 = 0.75;

/// Generate deterministic synthetic series.
pub fn generate_sample(config: &FitConfig) -> Result<Vec<Series>, AppError> {
    if config.sample_series == 0 {
        return Err(AppError::new(2, "Sample series count must be > 0."));
    }
    if config.sample_count == 0 {
        return Err(AppError::new(2, "Sample point count must be > 0."));
    }
    if !(config.sample_x_min.is_finite()
        && config.sample_x_max.is_finite()
        && config.sample_x_max > config.sample_x_min
        && config.sample_x_min >= 0.0)
    {
        return Err(AppError::new(2, "Invalid flow range for sample generation."));
    }
    if !(config.sample_cv.is_finite() && config.sample_cv > 0.0) {
        return Err(AppError::new(2, "Sample Cv must be > 0."));
    }
    if !(0.0..1.0).contains(&config.sample_outlier_prob) {
        return Err(AppError::new(2, "Outlier probability must be in [0, 1)."));
    }
    if !(config.sample_outlier_k.is_finite() && config.sample_outlier_k > 1.0) {
        return Err(AppError::new(2, "Outlier magnitude must be > 1."));
    }
    if !(config.sample_noise.is_finite() && config.sample_noise >= 0.0) {
        return Err(AppError::new(2, "Sample noise must be >= 0."));
    }

    let mut rng = StdRng::seed_from_u64(sample_seed(config));
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::numeric(format!("Noise distribution error: {e}")))?;

    let mut out = Vec::with_capacity(config.sample_series);

    for s in 0..config.sample_series {
        let cv = config.sample_cv + s as f64 * CV_STEP;
        let model = ValveCv { k: config.k };

        let mut points = Vec::with_capacity(config.sample_count);
        for i in 0..config.sample_count {
            // Evenly spaced flows so the plotted curve reads cleanly.
            let u = if config.sample_count == 1 {
                0.5
            } else {
                i as f64 / (config.sample_count as f64 - 1.0)
            };
            let x = config.sample_x_min + u * (config.sample_x_max - config.sample_x_min);
            let base = model.predict(x, &[cv]);

            let z = normal.sample(&mut rng);
            let mut y = base * (1.0 + config.sample_noise * z);

            let roll: f64 = rng.r#gen();
            if roll < config.sample_outlier_prob {
                y *= config.sample_outlier_k;
            }

            points.push(SeriesPoint { x, y });
        }

        out.push(Series {
            name: format!("valve_{}", (b'a' + (s % 26) as u8) as char),
            points,
        });
    }

    Ok(out)
}

fn sample_seed(config: &FitConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    config.sample_seed.hash(&mut hasher);
    config.sample_series.hash(&mut hasher);
    config.sample_count.hash(&mut hasher);
    config.sample_cv.to_bits().hash(&mut hasher);
    config.sample_x_min.to_bits().hash(&mut hasher);
    config.sample_x_max.to_bits().hash(&mut hasher);
    config.sample_noise.to_bits().hash(&mut hasher);
    config.sample_outlier_prob.to_bits().hash(&mut hasher);
    config.sample_outlier_k.to_bits().hash(&mut hasher);
    config.k.to_bits().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DEFAULT_K, ModelKind};

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
            sample_series: 2,
            sample_count: 16,
            sample_seed: 42,
            sample_cv: 2.0,
            sample_x_min: 1.0,
            sample_x_max: 10.0,
            sample_noise: 0.02,
            sample_outlier_prob: 0.1,
            sample_outlier_k: 3.0,
        }
    }

    #[test]
    fn sample_is_deterministic_for_a_seed() {
        let config = demo_config();
        let a = generate_sample(&config).unwrap();
        let b = generate_sample(&config).unwrap();

        assert_eq!(a.len(), 2);
        assert_eq!(a[0].name, "valve_a");
        assert_eq!(a[1].name, "valve_b");
        for (sa, sb) in a.iter().zip(&b) {
            assert_eq!(sa.points, sb.points);
        }
    }

    #[test]
    fn different_seeds_give_different_noise() {
        let mut config = demo_config();
        let a = generate_sample(&config).unwrap();
        config.sample_seed = 43;
        let b = generate_sample(&config).unwrap();
        assert_ne!(a[0].points, b[0].points);
    }

    #[test]
    fn noiseless_sample_lies_on_the_square_law() {
        let mut config = demo_config();
        config.sample_noise = 0.0;
        config.sample_outlier_prob = 0.0;

        let series = generate_sample(&config).unwrap();
        let model = ValveCv { k: config.k };
        for p in &series[0].points {
            let expected = model.predict(p.x, &[config.sample_cv]);
            assert!((p.y - expected).abs() < 1e-12);
        }
        // Second series uses a larger Cv, so pressure drops are smaller.
        assert!(series[1].points[5].y < series[0].points[5].y);
    }

    #[test]
    fn invalid_settings_are_usage_errors() {
        let mut config = demo_config();
        config.sample_outlier_prob = 1.5;
        assert_eq!(generate_sample(&config).unwrap_err().exit_code(), 2);

        let mut config = demo_config();
        config.sample_x_max = config.sample_x_min;
        assert_eq!(generate_sample(&config).unwrap_err().exit_code(), 2);
    }
}
