//! Model definitions for pressure-drop curve fitting.
//!
//! The fitter relies on three primitive operations:
//! - predict `y(x)` given a parameter vector (for residuals/plots)
//! - report the number of free parameters (for well-posedness checks)
//! - produce an initial parameter guess from data (for the nonlinear solve)
//!
//! These are implemented here for each built-in model kind.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Default density correction constant for the valve model.
///
/// The pressure-drop relation `dp = (q / Cv)^2 * k` uses the specific gravity
/// of the fluid relative to water; `0.9982` is water at 20°C.
pub const DEFAULT_K: f64 = 0.9982;

/// A parametric model `y = f(x, params)`.
///
/// Implementations must be pure: no I/O, no interior mutability. The robust
/// fitter calls `predict` many times per iteration.
pub trait Model: Sync {
    /// Predicted `y` at `x` for the given parameter vector.
    ///
    /// `params` must have length `param_len()`.
    fn predict(&self, x: f64, params: &[f64]) -> f64;

    /// Number of free parameters.
    fn param_len(&self) -> usize;

    /// Initial parameter guess derived from the data.
    ///
    /// The guess only needs to be good enough for the Levenberg–Marquardt
    /// solve to converge; a closed-form estimate is used where one exists.
    fn initial_guess(&self, xs: &[f64], ys: &[f64]) -> Vec<f64>;

    /// Human-readable label for terminal output.
    fn display_name(&self) -> &'static str;
}

/// Which built-in model to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Valve flow coefficient: `dp = (q / Cv)^2 * k`, one free parameter.
    Valve,
    /// Power law: `y = a * x^b`, two free parameters.
    #[value(name = "power-law")]
    PowerLaw,
}

impl ModelKind {
    /// Build the model instance for this kind.
    ///
    /// `k` is the valve model's fixed physical constant; the power-law model
    /// ignores it.
    pub fn build(self, k: f64) -> Box<dyn Model> {
        match self {
            ModelKind::Valve => Box::new(ValveCv { k }),
            ModelKind::PowerLaw => Box::new(PowerLaw),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Valve => "valve (dp = (q/Cv)^2 * k)",
            ModelKind::PowerLaw => "power-law (y = a * x^b)",
        }
    }
}

/// Valve flow coefficient model: `dp = (q / Cv)^2 * k`.
///
/// `Cv` is the sole free parameter; `k` is a fixed physical constant
/// (specific gravity of the fluid).
#[derive(Debug, Clone, Copy)]
pub struct ValveCv {
    pub k: f64,
}

impl Model for ValveCv {
    fn predict(&self, x: f64, params: &[f64]) -> f64 {
        let cv = params[0];
        (x / cv) * (x / cv) * self.k
    }

    fn param_len(&self) -> usize {
        1
    }

    fn initial_guess(&self, xs: &[f64], ys: &[f64]) -> Vec<f64> {
        // The model is linear in c = k / Cv^2:
        //   y = c * x^2  =>  c* = Σ x^2 y / Σ x^4
        // which gives a closed-form starting point for the nonlinear solve.
        let mut num = 0.0;
        let mut den = 0.0;
        for (&x, &y) in xs.iter().zip(ys.iter()) {
            let x2 = x * x;
            num += x2 * y;
            den += x2 * x2;
        }
        if num.is_finite() && den > 0.0 && num > 0.0 {
            vec![(self.k * den / num).sqrt()]
        } else {
            vec![1.0]
        }
    }

    fn display_name(&self) -> &'static str {
        "valve"
    }
}

/// Power-law model: `y = a * x^b`.
#[derive(Debug, Clone, Copy)]
pub struct PowerLaw;

impl Model for PowerLaw {
    fn predict(&self, x: f64, params: &[f64]) -> f64 {
        params[0] * x.powf(params[1])
    }

    fn param_len(&self) -> usize {
        2
    }

    fn initial_guess(&self, xs: &[f64], ys: &[f64]) -> Vec<f64> {
        // Log-log OLS over strictly positive points:
        //   ln y = ln a + b ln x
        let pairs: Vec<(f64, f64)> = xs
            .iter()
            .zip(ys.iter())
            .filter_map(|(&x, &y)| {
                if x > 0.0 && y > 0.0 {
                    Some((x.ln(), y.ln()))
                } else {
                    None
                }
            })
            .collect();
        if pairs.len() < 2 {
            return vec![1.0, 1.0];
        }

        let n = pairs.len() as f64;
        let sx: f64 = pairs.iter().map(|p| p.0).sum();
        let sy: f64 = pairs.iter().map(|p| p.1).sum();
        let xbar = sx / n;
        let ybar = sy / n;

        let mut cov = 0.0;
        let mut var = 0.0;
        for &(lx, ly) in &pairs {
            cov += (lx - xbar) * (ly - ybar);
            var += (lx - xbar) * (lx - xbar);
        }
        if var <= 1e-18 || !cov.is_finite() {
            return vec![1.0, 1.0];
        }
        let b = cov / var;
        let a = (ybar - b * xbar).exp();
        if a.is_finite() && b.is_finite() {
            vec![a, b]
        } else {
            vec![1.0, 1.0]
        }
    }

    fn display_name(&self) -> &'static str {
        "power-law"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valve_predict_matches_closed_form() {
        let model = ValveCv { k: DEFAULT_K };
        let y = model.predict(4.0, &[2.0]);
        assert!((y - 4.0 * DEFAULT_K).abs() < 1e-12);
    }

    #[test]
    fn valve_initial_guess_recovers_cv_on_exact_data() {
        let model = ValveCv { k: DEFAULT_K };
        let xs: Vec<f64> = (1..=8).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| model.predict(x, &[2.0])).collect();
        let guess = model.initial_guess(&xs, &ys);
        assert_eq!(guess.len(), 1);
        assert!((guess[0] - 2.0).abs() < 1e-9, "guess = {}", guess[0]);
    }

    #[test]
    fn power_law_initial_guess_recovers_exponent() {
        let model = PowerLaw;
        let xs: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| 3.0 * x.powf(1.7)).collect();
        let guess = model.initial_guess(&xs, &ys);
        assert!((guess[0] - 3.0).abs() < 1e-6);
        assert!((guess[1] - 1.7).abs() < 1e-9);
    }
}
