//! Contract between the registration driver and a bound-constrained
//! nonlinear solver.

use serde::{Deserialize, Serialize};
use crate::error::{RegistrationError, Result};
use crate::progress::CancellationToken;

/// Smooth objective over a box, with gradient.
pub trait NlpProblem {
    fn dimension(&self) -> usize;

    fn evaluate_objective(&self, x: &[f64]) -> Result<f64>;

    /// Write `∇f(x)` into `gradient`.
    fn evaluate_gradient(&self, x: &[f64], gradient: &mut [f64]) -> Result<()>;

    /// Objective and gradient together.
    fn evaluate_with_gradient(&self, x: &[f64], gradient: &mut [f64]) -> Result<f64> {
        self.evaluate_gradient(x, gradient)?;
        self.evaluate_objective(x)
    }
}

/// Per-variable box constraints `lower ≤ x ≤ upper`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    /// Each pair needs `lower < upper`; infinite bounds are allowed.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(RegistrationError::dimension_mismatch(format!(
                "{} lower bounds but {} upper bounds",
                lower.len(),
                upper.len()
            )));
        }
        for (i, (lo, hi)) in lower.iter().zip(&upper).enumerate() {
            if lo.is_nan() || hi.is_nan() || lo >= hi {
                return Err(RegistrationError::invalid_configuration(format!(
                    "bounds of variable {} are empty: [{}, {}]",
                    i, lo, hi
                )));
            }
        }
        Ok(Self { lower, upper })
    }

    /// `[-radius_i, radius_i]` for every variable.
    pub fn symmetric(radius: &[f64]) -> Result<Self> {
        Self::new(radius.iter().map(|r| -r).collect(), radius.to_vec())
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.len()
            && x.iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(v, (lo, hi))| v >= lo && v <= hi)
    }

    /// Project `x` into the box.
    pub fn clamp(&self, x: &mut [f64]) {
        for (v, (lo, hi)) in x.iter_mut().zip(self.lower.iter().zip(&self.upper)) {
            *v = v.clamp(*lo, *hi);
        }
    }
}

/// Per-call solver options.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Initial barrier parameter.
    pub barrier_init: f64,
    /// Polled between iterations.
    pub cancel: Option<CancellationToken>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            barrier_init: 0.1,
            cancel: None,
        }
    }
}

impl SolveOptions {
    pub fn with_barrier_init(mut self, barrier_init: f64) -> Self {
        self.barrier_init = barrier_init;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// How a solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    Optimal,
    MaxIterations,
    LineSearchFailed,
    Cancelled,
}

impl SolverStatus {
    pub fn is_optimal(self) -> bool {
        self == SolverStatus::Optimal
    }
}

/// Best point found by a solve.
#[derive(Debug, Clone)]
pub struct NlpSolution {
    pub(crate) solution: Vec<f64>,
    pub(crate) objective: f64,
    pub(crate) status: SolverStatus,
    pub(crate) iterations: usize,
}

impl NlpSolution {
    pub fn new(solution: Vec<f64>, objective: f64, status: SolverStatus, iterations: usize) -> Self {
        Self {
            solution,
            objective,
            status,
            iterations,
        }
    }

    pub fn solution(&self) -> &[f64] {
        &self.solution
    }

    pub fn into_solution(self) -> Vec<f64> {
        self.solution
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }

    pub fn status(&self) -> SolverStatus {
        self.status
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

/// A bound-constrained, gradient-based minimizer.
pub trait NlpSolver {
    /// Minimize `problem` over `bounds` starting from `x0`.
    ///
    /// Non-optimal termination is reported through [`NlpSolution::status`],
    /// not as an error; the best point seen is always returned.
    fn optimize<P>(&self, problem: &P, bounds: &Bounds, x0: &[f64], options: &SolveOptions) -> Result<NlpSolution>
    where
        P: NlpProblem + ?Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_validation() {
        assert!(Bounds::new(vec![0.0], vec![1.0, 2.0]).is_err());
        assert!(Bounds::new(vec![1.0], vec![1.0]).is_err());
        assert!(Bounds::new(vec![f64::NEG_INFINITY], vec![f64::INFINITY]).is_ok());
        let bounds = Bounds::symmetric(&[1.0, 2.0]).unwrap();
        assert_eq!(bounds.lower(), &[-1.0, -2.0]);
        let mut x = vec![5.0, -5.0];
        assert!(!bounds.contains(&x));
        bounds.clamp(&mut x);
        assert_eq!(x, vec![1.0, -2.0]);
        assert!(bounds.contains(&x));
    }

    #[test]
    fn test_options_cancel() {
        let token = CancellationToken::new();
        let options = SolveOptions::default().with_cancel(token.clone());
        assert!(!options.is_cancelled());
        token.cancel();
        assert!(options.is_cancelled());
    }
}
