//! Nonlinear least-squares solver (Levenberg–Marquardt).
//!
//! Given a model `f(x, θ)` and observations `(x_i, y_i)`, we find θ
//! minimizing `Σ (y_i - f(x_i, θ))^2`.
//!
//! Implementation choices:
//! - The Jacobian is computed by central differences; the built-in models are
//!   cheap to evaluate and have at most two parameters, so the extra model
//!   calls are negligible.
//! - Each damped normal-equations step `(JᵀJ + λ diag(JᵀJ)) δ = Jᵀ r` is
//!   solved by SVD with progressively looser tolerances, which handles the
//!   near-singular systems that show up when a parameter is weakly
//!   identified by the surviving points.
//! - Steps that do not reduce the SSE are rejected and λ is increased; once
//!   no finite improving step exists the current θ is the solution.

use nalgebra::{DMatrix, DVector};

use crate::models::Model;

/// Maximum outer LM iterations.
const MAX_STEPS: usize = 100;
/// Relative SSE improvement below which we declare convergence.
const FTOL: f64 = 1e-12;
/// Step norm below which we declare convergence.
const XTOL: f64 = 1e-12;
/// Damping factor ceiling; beyond this the problem is declared stuck.
const LAMBDA_MAX: f64 = 1e14;

/// Solve the least-squares problem for `model` over `(xs, ys)` starting from
/// `init`.
///
/// Returns `None` when the solver cannot produce a finite solution: fewer
/// points than parameters, non-finite inputs, or a damped step search that
/// diverges. The caller decides how to surface that.
pub fn solve_least_squares(
    model: &dyn Model,
    xs: &[f64],
    ys: &[f64],
    init: &[f64],
) -> Option<Vec<f64>> {
    let n = xs.len();
    let p = init.len();
    if p == 0 || n < p || ys.len() != n {
        return None;
    }
    if xs.iter().chain(ys.iter()).any(|v| !v.is_finite()) {
        return None;
    }

    let mut params: Vec<f64> = init.to_vec();
    let mut sse = sse_at(model, xs, ys, &params)?;
    let mut lambda = 1e-3;

    for _ in 0..MAX_STEPS {
        let jac = numeric_jacobian(model, xs, &params)?;
        let r = residual_vector(model, xs, ys, &params)?;

        let jt = jac.transpose();
        let jtj = &jt * &jac;
        let g = &jt * &r;

        // Inner search: grow λ until a finite, improving step is found.
        let mut accepted = false;
        for _ in 0..16 {
            let mut damped = jtj.clone();
            for i in 0..p {
                let d = jtj[(i, i)].abs().max(1e-12);
                damped[(i, i)] += lambda * d;
            }

            let Some(delta) = solve_step(&damped, &g) else {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    return None;
                }
                continue;
            };

            let candidate: Vec<f64> = params
                .iter()
                .zip(delta.iter())
                .map(|(&v, &d)| v + d)
                .collect();

            match sse_at(model, xs, ys, &candidate) {
                Some(sse_new) if sse_new <= sse => {
                    let drop = sse - sse_new;
                    let step_norm = delta.norm();
                    params = candidate;
                    sse = sse_new;
                    lambda = (lambda * 0.25).max(1e-12);
                    accepted = true;

                    if drop <= FTOL * sse.max(f64::MIN_POSITIVE) || step_norm <= XTOL {
                        return Some(params);
                    }
                    break;
                }
                _ => {
                    lambda *= 10.0;
                    if lambda > LAMBDA_MAX {
                        // No finite improving step exists; the current θ is
                        // the numerical minimum.
                        return Some(params);
                    }
                }
            }
        }

        if !accepted {
            return Some(params);
        }
    }

    Some(params)
}

/// Residual vector `r_i = y_i - f(x_i, θ)`. `None` on non-finite values.
fn residual_vector(model: &dyn Model, xs: &[f64], ys: &[f64], params: &[f64]) -> Option<DVector<f64>> {
    let mut r = DVector::<f64>::zeros(xs.len());
    for i in 0..xs.len() {
        let y_fit = model.predict(xs[i], params);
        if !y_fit.is_finite() {
            return None;
        }
        r[i] = ys[i] - y_fit;
    }
    Some(r)
}

/// Sum of squared residuals. `None` on non-finite values.
fn sse_at(model: &dyn Model, xs: &[f64], ys: &[f64], params: &[f64]) -> Option<f64> {
    let mut sse = 0.0;
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        let y_fit = model.predict(x, params);
        if !y_fit.is_finite() {
            return None;
        }
        let r = y - y_fit;
        sse += r * r;
    }
    if sse.is_finite() { Some(sse) } else { None }
}

/// Model Jacobian `∂f(x_i, θ) / ∂θ_j` by central differences.
fn numeric_jacobian(model: &dyn Model, xs: &[f64], params: &[f64]) -> Option<DMatrix<f64>> {
    let n = xs.len();
    let p = params.len();
    let mut jac = DMatrix::<f64>::zeros(n, p);

    let mut lo = params.to_vec();
    let mut hi = params.to_vec();
    for j in 0..p {
        let h = 1e-6 * params[j].abs().max(1e-6);
        lo[j] = params[j] - h;
        hi[j] = params[j] + h;

        for i in 0..n {
            let d = (model.predict(xs[i], &hi) - model.predict(xs[i], &lo)) / (2.0 * h);
            if !d.is_finite() {
                return None;
            }
            jac[(i, j)] = d;
        }

        lo[j] = params[j];
        hi[j] = params[j];
    }
    Some(jac)
}

/// Solve the damped normal equations using SVD.
///
/// Tries progressively looser tolerances; the damping usually keeps the
/// system well conditioned, but a weakly identified parameter can still
/// produce tiny singular values.
fn solve_step(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = a.clone().svd(true, true);
    for &tol in &[1e-12, 1e-9, 1e-6] {
        if let Ok(delta) = svd.solve(b, tol) {
            if delta.iter().all(|v| v.is_finite()) {
                return Some(delta);
            }
        }
    }
    None
}
