//! Iterative fit with residual z-score outlier rejection.
//!
//! The loop:
//!
//! 1. least-squares fit over the current inliers
//! 2. residual z-scores over the current inliers only
//! 3. drop every point with `|z| > threshold`
//! 4. repeat until no new outliers or the iteration cap is hit
//!
//! Removal is irreversible within one run: a point excluded in round k is
//! never reconsidered in round k+1 even if the refit would no longer flag
//! it. Because the inlier set is non-increasing and finite, the loop always
//! terminates. The z-score is recomputed each round strictly over the
//! surviving subset, so removing earlier outliers changes the leverage of
//! the threshold on later rounds. Both behaviors are deliberate and must not
//! be "fixed" when touching this code: re-evaluating all points each round
//! changes convergence behavior.

use crate::error::AppError;
use crate::math::{mean, sample_stddev, solve_least_squares};
use crate::models::Model;

/// Residual stddev at or below this fraction of the data scale counts as an
/// exact fit: no point can be meaningfully flagged against it.
const STDDEV_FLOOR_REL: f64 = 1e-12;

/// Options for one robust fit run.
#[derive(Debug, Clone, Copy)]
pub struct RobustOptions {
    /// Fit-and-remove iteration cap (>= 1).
    pub max_iterations: usize,
    /// Residual z-score threshold in standard deviations (> 0).
    pub threshold: f64,
}

impl Default for RobustOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            threshold: 2.0,
        }
    }
}

/// Outcome of one robust fit run.
#[derive(Debug, Clone)]
pub struct RobustFit {
    /// Best-fit parameters from the final completed fit attempt.
    pub params: Vec<f64>,
    /// Inclusion mask over the input points (true = inlier).
    ///
    /// Same length and order as the input; flips found on the final
    /// permitted iteration are applied even when the cap is hit.
    pub mask: Vec<bool>,
    /// Completed fit attempts (1-indexed).
    pub iterations: usize,
    /// True when the loop stopped because no new outliers were found.
    pub converged: bool,
}

impl RobustFit {
    pub fn n_inliers(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    pub fn n_outliers(&self) -> usize {
        self.mask.len() - self.n_inliers()
    }
}

/// Fit `model` to `(xs, ys)` with iterative outlier removal.
///
/// Errors:
/// - exit code 2: mismatched inputs or invalid options
/// - exit code 3: inlier count at or below the model's free-parameter count
///   (checked before every solve, including after removals)
/// - exit code 4: the least-squares solve failed; not retried, since
///   retrying the same ill-conditioned problem without changing inputs is
///   pointless
pub fn fit_robust(
    model: &dyn Model,
    xs: &[f64],
    ys: &[f64],
    opts: &RobustOptions,
) -> Result<RobustFit, AppError> {
    let n = xs.len();
    if ys.len() != n {
        return Err(AppError::new(
            2,
            format!("Input length mismatch: {} x values vs {} y values.", n, ys.len()),
        ));
    }
    if opts.max_iterations == 0 {
        return Err(AppError::new(2, "max_iterations must be >= 1."));
    }
    if !(opts.threshold.is_finite() && opts.threshold > 0.0) {
        return Err(AppError::new(
            2,
            format!("Outlier threshold must be a positive real, got {}.", opts.threshold),
        ));
    }

    let p = model.param_len();
    let mut mask = vec![true; n];
    let mut iteration = 0usize;

    loop {
        iteration += 1;

        // Gather the surviving subset, remembering original indices so mask
        // flips land on the right points.
        let mut in_idx = Vec::with_capacity(n);
        let mut in_xs = Vec::with_capacity(n);
        let mut in_ys = Vec::with_capacity(n);
        for i in 0..n {
            if mask[i] {
                in_idx.push(i);
                in_xs.push(xs[i]);
                in_ys.push(ys[i]);
            }
        }

        if in_xs.len() <= p {
            return Err(AppError::insufficient_data(format!(
                "Insufficient data: {} inlier(s) for {} free parameter(s) of model {}.",
                in_xs.len(),
                p,
                model.display_name(),
            )));
        }

        let init = model.initial_guess(&in_xs, &in_ys);
        let params = solve_least_squares(model, &in_xs, &in_ys, &init).ok_or_else(|| {
            AppError::numeric(format!(
                "Least-squares fit did not converge for model {} ({} points, iteration {}).",
                model.display_name(),
                in_xs.len(),
                iteration,
            ))
        })?;

        let residuals: Vec<f64> = in_xs
            .iter()
            .zip(in_ys.iter())
            .map(|(&x, &y)| y - model.predict(x, &params))
            .collect();

        let flagged = flag_outliers(&residuals, &in_ys, opts.threshold);

        if flagged.is_empty() {
            return Ok(RobustFit {
                params,
                mask,
                iterations: iteration,
                converged: true,
            });
        }

        for &j in &flagged {
            mask[in_idx[j]] = false;
        }

        if iteration >= opts.max_iterations {
            return Ok(RobustFit {
                params,
                mask,
                iterations: iteration,
                converged: false,
            });
        }
    }
}

/// Indices (into the inlier subset) whose residual z-score exceeds the
/// threshold.
///
/// Mean and standard deviation are taken over the current inliers only
/// (sample stddev). A zero or numerically negligible stddev flags nothing:
/// with all residuals (near-)identical there is no outlier to speak of, and
/// dividing by it would manufacture spurious flags from float noise.
fn flag_outliers(residuals: &[f64], ys: &[f64], threshold: f64) -> Vec<usize> {
    let Some(m) = mean(residuals) else {
        return Vec::new();
    };
    let Some(sd) = sample_stddev(residuals) else {
        return Vec::new();
    };

    let y_scale = ys.iter().fold(1.0_f64, |acc, &y| acc.max(y.abs()));
    if !sd.is_finite() || sd <= STDDEV_FLOOR_REL * y_scale {
        return Vec::new();
    }

    residuals
        .iter()
        .enumerate()
        .filter(|&(_, &r)| ((r - m) / sd).abs() > threshold)
        .map(|(j, _)| j)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EXIT_INSUFFICIENT_DATA, EXIT_NUMERIC};
    use crate::models::{DEFAULT_K, Model, ValveCv};

    const TRUE_CV: f64 = 2.0;

    fn valve() -> ValveCv {
        ValveCv { k: DEFAULT_K }
    }

    fn clean_ys(xs: &[f64]) -> Vec<f64> {
        let model = valve();
        xs.iter().map(|&x| model.predict(x, &[TRUE_CV])).collect()
    }

    #[test]
    fn exact_data_converges_in_one_iteration() {
        let xs: Vec<f64> = (1..=8).map(|i| i as f64).collect();
        let ys = clean_ys(&xs);

        let fit = fit_robust(&valve(), &xs, &ys, &RobustOptions::default()).unwrap();
        assert_eq!(fit.iterations, 1);
        assert!(fit.converged);
        assert!(fit.mask.iter().all(|&m| m));
        assert!((fit.params[0] - TRUE_CV).abs() < 1e-6, "Cv = {}", fit.params[0]);
    }

    #[test]
    fn single_outlier_is_removed_and_cv_recovered() {
        // Moderate leverage: tripling the last point's pressure drop gives it
        // a residual z-score of ~2.2 on the first (contaminated) fit.
        let xs: Vec<f64> = (1..=8).map(|i| i as f64).collect();
        let mut ys = clean_ys(&xs);
        ys[7] *= 3.0;

        let opts = RobustOptions {
            max_iterations: 5,
            threshold: 2.0,
        };
        let fit = fit_robust(&valve(), &xs, &ys, &opts).unwrap();

        assert!(fit.converged);
        assert_eq!(fit.iterations, 2);
        assert_eq!(fit.mask, vec![true, true, true, true, true, true, true, false]);
        assert!(
            (fit.params[0] - TRUE_CV).abs() < 0.05,
            "recovered Cv = {}",
            fit.params[0]
        );
    }

    #[test]
    fn refit_moves_parameters_toward_truth() {
        let xs: Vec<f64> = (1..=8).map(|i| i as f64).collect();
        let mut ys = clean_ys(&xs);
        ys[7] *= 3.0;

        // Contaminated single-pass fit (threshold high enough to flag nothing).
        let no_removal = RobustOptions {
            max_iterations: 1,
            threshold: 1e6,
        };
        let before = fit_robust(&valve(), &xs, &ys, &no_removal).unwrap();

        let after = fit_robust(
            &valve(),
            &xs,
            &ys,
            &RobustOptions {
                max_iterations: 5,
                threshold: 2.0,
            },
        )
        .unwrap();

        let err_before = (before.params[0] - TRUE_CV).abs();
        let err_after = (after.params[0] - TRUE_CV).abs();
        assert!(
            err_after < err_before,
            "refit should improve: before {err_before}, after {err_after}"
        );
    }

    #[test]
    fn huge_threshold_returns_unconstrained_fit_after_one_iteration() {
        let xs: Vec<f64> = (1..=8).map(|i| i as f64).collect();
        let mut ys = clean_ys(&xs);
        ys[3] += 100.0;
        ys[6] -= 40.0;

        let opts = RobustOptions {
            max_iterations: 5,
            threshold: 1e6,
        };
        let fit = fit_robust(&valve(), &xs, &ys, &opts).unwrap();
        assert_eq!(fit.iterations, 1);
        assert!(fit.converged);
        assert!(fit.mask.iter().all(|&m| m));
    }

    /// Data with two outliers removed over two successive rounds: the large
    /// one inflates the stddev enough to hide the moderate one at first.
    fn two_round_data() -> (Vec<f64>, Vec<f64>) {
        let xs: Vec<f64> = (1..=12).map(|i| i as f64).collect();
        let mut ys = clean_ys(&xs);
        ys[2] += 50.0; // x = 3, flagged in round 1
        ys[5] += 4.0; // x = 6, flagged in round 2
        (xs, ys)
    }

    #[test]
    fn cascaded_outliers_need_two_rounds() {
        let (xs, ys) = two_round_data();
        let opts = RobustOptions {
            max_iterations: 5,
            threshold: 2.5,
        };
        let fit = fit_robust(&valve(), &xs, &ys, &opts).unwrap();

        assert!(fit.converged);
        assert_eq!(fit.iterations, 3);
        assert_eq!(fit.n_outliers(), 2);
        assert!(!fit.mask[2]);
        assert!(!fit.mask[5]);
        assert!((fit.params[0] - TRUE_CV).abs() < 0.05);
    }

    #[test]
    fn iteration_cap_returns_partial_mask_as_best_effort() {
        let (xs, ys) = two_round_data();
        let opts = RobustOptions {
            max_iterations: 1,
            threshold: 2.5,
        };
        let fit = fit_robust(&valve(), &xs, &ys, &opts).unwrap();

        // Only the first round's removal is reflected; the moderate outlier
        // survives because the loop was not allowed to refit.
        assert_eq!(fit.iterations, 1);
        assert!(!fit.converged);
        assert!(!fit.mask[2]);
        assert!(fit.mask[5]);
    }

    #[test]
    fn mask_flips_are_monotone_across_caps() {
        let (xs, ys) = two_round_data();
        let masks: Vec<Vec<bool>> = (1..=3)
            .map(|cap| {
                let opts = RobustOptions {
                    max_iterations: cap,
                    threshold: 2.5,
                };
                fit_robust(&valve(), &xs, &ys, &opts).unwrap().mask
            })
            .collect();

        // Once false, stays false as the cap grows; the true-count never
        // increases.
        for w in masks.windows(2) {
            for (a, b) in w[0].iter().zip(w[1].iter()) {
                assert!(*a || !*b, "a reinstated point: {:?} -> {:?}", w[0], w[1]);
            }
        }
    }

    #[test]
    fn insufficient_data_is_detected_before_the_solve() {
        let err = fit_robust(&valve(), &[3.0], &[2.2], &RobustOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_INSUFFICIENT_DATA);
    }

    #[test]
    fn solver_failure_propagates_as_numeric_error() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [0.25, f64::NAN, 2.25, 4.0];
        let err = fit_robust(&valve(), &xs, &ys, &RobustOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_NUMERIC);
    }

    /// Model that ignores its parameter and predicts a constant; every
    /// residual is then identical when the observations are.
    struct ConstantModel;

    impl Model for ConstantModel {
        fn predict(&self, _x: f64, _params: &[f64]) -> f64 {
            1.0
        }
        fn param_len(&self) -> usize {
            1
        }
        fn initial_guess(&self, _xs: &[f64], _ys: &[f64]) -> Vec<f64> {
            vec![0.0]
        }
        fn display_name(&self) -> &'static str {
            "constant"
        }
    }

    #[test]
    fn identical_residuals_flag_nothing_and_terminate() {
        // All residuals equal 2.0: stddev is exactly zero, which must not
        // divide-by-zero or flag anything.
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [3.0, 3.0, 3.0, 3.0];
        let fit = fit_robust(&ConstantModel, &xs, &ys, &RobustOptions::default()).unwrap();
        assert_eq!(fit.iterations, 1);
        assert!(fit.converged);
        assert!(fit.mask.iter().all(|&m| m));
    }

    #[test]
    fn extreme_leverage_outlier_evades_residual_rejection() {
        // An outlier at extreme flow dominates the squared-error objective,
        // so the unweighted fit passes almost exactly through it and its
        // residual z-score stays small. The procedure then returns the
        // unconstrained fit with an all-true mask. Known limitation of
        // residual-based rejection under high leverage; pinned here so a
        // change in this behavior is caught.
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        let mut ys = clean_ys(&xs);
        ys[5] = 5000.0;

        let opts = RobustOptions {
            max_iterations: 5,
            threshold: 2.0,
        };
        let fit = fit_robust(&valve(), &xs, &ys, &opts).unwrap();
        assert_eq!(fit.iterations, 1);
        assert!(fit.converged);
        assert!(fit.mask.iter().all(|&m| m));
    }
}
