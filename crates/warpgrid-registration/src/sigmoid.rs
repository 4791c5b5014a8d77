//! Four-parameter logistic fit by bounded Levenberg–Marquardt.
//!
//! `f(x) = bottom + (top - bottom) / (1 + exp(-(x - center) / width))`,
//! fitted to `data[k]` at `x = k + 1`. Parameters are projected after every
//! step onto `bottom, top ∈ [min, max]`, `center ∈ [1, n]`, `width ∈ [0.1, n]`.

use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};
use crate::error::{RegistrationError, Result};

/// Fewer points leave the logistic curve underdetermined.
pub const MIN_SIGMOID_POINTS: usize = 4;

const MIN_WIDTH: f64 = 0.1;
const MAX_ITERATIONS: usize = 500;
const DAMPING_INIT: f64 = 1e-2;
const DAMPING_CONVERGE: f64 = 0.5;
const DAMPING_DIVERGE: f64 = 2.0;
const DAMPING_MAX: f64 = 1e12;
const COST_TOLERANCE: f64 = 1e-12;

type Params = SVector<f64, 4>;

/// Fitted logistic curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SigmoidFit {
    pub bottom: f64,
    pub top: f64,
    pub center: f64,
    pub width: f64,
    /// Sum of squared residuals.
    pub residual: f64,
    pub converged: bool,
}

impl SigmoidFit {
    pub fn evaluate(&self, x: f64) -> f64 {
        self.bottom + (self.top - self.bottom) * logistic((x - self.center) / self.width)
    }

    /// 1-based index `max(1, round(center - width))`, at most `n`.
    pub fn chosen_index(&self, n: usize) -> usize {
        let index = (self.center - self.width).round();
        if index < 1.0 {
            1
        } else {
            (index as usize).min(n.max(1))
        }
    }

    /// `residual / (top - bottom)² / n`.
    pub fn quality(&self, n: usize) -> f64 {
        let span = (self.top - self.bottom).powi(2).max(f64::EPSILON);
        self.residual / span / n.max(1) as f64
    }
}

fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-z.clamp(-500.0, 500.0)).exp())
}

struct Problem<'a> {
    data: &'a [f64],
    lower: Params,
    upper: Params,
}

impl<'a> Problem<'a> {
    fn project(&self, p: &mut Params) {
        for k in 0..4 {
            p[k] = p[k].clamp(self.lower[k], self.upper[k]);
        }
    }

    fn cost(&self, p: &Params) -> f64 {
        self.data
            .iter()
            .enumerate()
            .map(|(k, y)| {
                let z = ((k + 1) as f64 - p[2]) / p[3];
                (p[0] + (p[1] - p[0]) * logistic(z) - y).powi(2)
            })
            .sum()
    }

    /// `Jᵀ J` and `Jᵀ r`.
    fn normal_equations(&self, p: &Params) -> (SMatrix<f64, 4, 4>, Params) {
        let (bottom, top, center, width) = (p[0], p[1], p[2], p[3]);
        let mut jtj = SMatrix::<f64, 4, 4>::zeros();
        let mut jtr = Params::zeros();
        for (k, y) in self.data.iter().enumerate() {
            let x = (k + 1) as f64;
            let s = logistic((x - center) / width);
            let ds = s * (1.0 - s);
            let r = bottom + (top - bottom) * s - y;
            let row = Params::new(
                1.0 - s,
                s,
                -(top - bottom) * ds / width,
                -(top - bottom) * ds * (x - center) / (width * width),
            );
            jtj += row * row.transpose();
            jtr += row * r;
        }
        (jtj, jtr)
    }
}

/// Fit the logistic curve to `data`.
///
/// Fails with a precondition error for fewer than [`MIN_SIGMOID_POINTS`] values.
pub fn fit_sigmoid(data: &[f64]) -> Result<SigmoidFit> {
    let n = data.len();
    if n < MIN_SIGMOID_POINTS {
        return Err(RegistrationError::precondition(format!(
            "a sigmoid fit needs at least {} points, got {}",
            MIN_SIGMOID_POINTS, n
        )));
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(RegistrationError::numerical_instability("sigmoid data must be finite"));
    }

    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let (min, max) = (sorted[0], sorted[n - 1]);
    let len = n as f64;
    let problem = Problem {
        data,
        lower: Params::new(min, min, 1.0, MIN_WIDTH),
        upper: Params::new(max, max, len, len),
    };

    let half = n / 2;
    let low_mean = sorted[..half].iter().sum::<f64>() / half as f64;
    let high_mean = sorted[n - half..].iter().sum::<f64>() / half as f64;
    let (bottom, top) = if data[n - 1] >= data[0] {
        (low_mean, high_mean)
    } else {
        (high_mean, low_mean)
    };
    let mut p = Params::new(bottom, top, len / 2.0, len / 4.0);
    problem.project(&mut p);

    let mut cost = problem.cost(&p);
    let mut damping = DAMPING_INIT;
    let mut converged = cost == 0.0;
    let mut iterations = 0;
    while !converged && iterations < MAX_ITERATIONS {
        iterations += 1;
        let (jtj, jtr) = problem.normal_equations(&p);
        let mut system = jtj;
        for k in 0..4 {
            system[(k, k)] += damping * (jtj[(k, k)] + 1e-12);
        }
        let Some(cholesky) = system.cholesky() else {
            damping *= DAMPING_DIVERGE;
            if damping > DAMPING_MAX {
                break;
            }
            continue;
        };
        let mut candidate = p - cholesky.solve(&jtr);
        problem.project(&mut candidate);
        let candidate_cost = problem.cost(&candidate);

        if candidate_cost < cost {
            let decrease = (cost - candidate_cost) / cost.max(f64::MIN_POSITIVE);
            let step = (candidate - p).norm();
            p = candidate;
            cost = candidate_cost;
            damping *= DAMPING_CONVERGE;
            converged = decrease < COST_TOLERANCE || step < 1e-12 * (p.norm() + 1e-12) || cost == 0.0;
        } else {
            damping *= DAMPING_DIVERGE;
            if damping > DAMPING_MAX {
                // No descent left at any damping: a (projected) stationary point
                converged = true;
            }
        }
    }
    if !converged {
        tracing::warn!("Sigmoid fit stopped after {} iterations without converging", iterations);
    }

    Ok(SigmoidFit {
        bottom: p[0],
        top: p[1],
        center: p[2],
        width: p[3],
        residual: cost,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_fit_inside_data_range() {
        // The samples stop short of both plateaus, so the amplitude bounds bind.
        let truth = SigmoidFit {
            bottom: 1.0,
            top: 5.0,
            center: 7.5,
            width: 1.5,
            residual: 0.0,
            converged: true,
        };
        let data: Vec<f64> = (1..=15).map(|x| truth.evaluate(x as f64)).collect();
        let (min, max) = (data[0], data[14]);
        let fit = fit_sigmoid(&data).unwrap();
        assert!(fit.converged);
        assert!((fit.bottom - min).abs() < 1e-9 && (fit.top - max).abs() < 1e-9, "{:?}", fit);

        let clamped = SigmoidFit {
            bottom: min,
            top: max,
            ..truth
        };
        let clamped_residual: f64 = data
            .iter()
            .enumerate()
            .map(|(k, y)| (clamped.evaluate((k + 1) as f64) - y).powi(2))
            .sum();
        assert!(fit.residual < clamped_residual, "{} >= {}", fit.residual, clamped_residual);
        assert!((fit.center - 7.5).abs() < 0.05 && (fit.width - 1.5).abs() < 0.1, "{:?}", fit);
        assert_eq!(fit.chosen_index(15), 6);
        assert!(fit.quality(15) >= 0.0);
    }

    #[test]
    fn test_parameters_stay_in_bounds() {
        let data = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        let fit = fit_sigmoid(&data).unwrap();
        assert!(fit.bottom >= 1.0 && fit.bottom <= 9.0);
        assert!(fit.top >= 1.0 && fit.top <= 9.0);
        assert!(fit.center >= 1.0 && fit.center <= 8.0);
        assert!(fit.width >= 0.1 && fit.width <= 8.0);
        let index = fit.chosen_index(data.len());
        assert!((1..=data.len()).contains(&index));
    }

    #[test]
    fn test_too_few_points() {
        let err = fit_sigmoid(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(err.is_precondition());
        assert!(fit_sigmoid(&[1.0, 2.0, 3.0, 4.0]).is_ok());
    }

    #[test]
    fn test_constant_data() {
        let fit = fit_sigmoid(&[2.0; 6]).unwrap();
        assert_eq!(fit.residual, 0.0);
        assert!(fit.converged);
        assert_eq!(fit.quality(6), 0.0);
    }

    #[test]
    fn test_chosen_index_clamps() {
        let mut fit = fit_sigmoid(&[0.0, 0.0, 1.0, 1.0]).unwrap();
        fit.center = 1.0;
        fit.width = 3.0;
        assert_eq!(fit.chosen_index(4), 1);
        fit.center = 10.0;
        fit.width = 0.1;
        assert_eq!(fit.chosen_index(4), 4);
    }
}
