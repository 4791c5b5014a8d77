//! Log-barrier interior-point solver for box-constrained problems.
//!
//! For a barrier weight `μ` the subproblem
//! `φ_μ(x) = f(x) - μ Σ [ln(x_i - l_i) + ln(u_i - x_i)]`
//! is minimized with L-BFGS and a backtracking Armijo line search whose
//! steps never leave the interior. `μ` then shrinks geometrically until it
//! reaches `barrier_tolerance`. The lowest `f` seen over all iterates is
//! returned, whatever the final status.

use burn::config::Config;
use nalgebra::DVector;
use crate::error::RegistrationError;
use super::lbfgs::LbfgsMemory;
use super::nlp::{Bounds, NlpProblem, NlpSolution, NlpSolver, SolveOptions, SolverStatus};

/// Armijo sufficient-decrease constant.
const ARMIJO_C: f64 = 1e-4;
/// Step halvings before a line search gives up.
const MAX_BACKTRACKS: usize = 40;
/// Relative distance from a finite bound for the starting point.
const INTERIOR_MARGIN: f64 = 1e-4;

/// Interior-point solver configuration.
#[derive(Config, Debug)]
pub struct InteriorPointConfig {
    /// Smallest barrier weight; reaching it ends the solve.
    #[config(default = 1e-8)]
    pub barrier_tolerance: f64,
    /// Factor applied to the barrier weight between subproblems.
    #[config(default = 0.1)]
    pub barrier_decrease: f64,
    /// Cap on accepted steps over all subproblems.
    #[config(default = 3000)]
    pub max_iterations: usize,
    /// Gradient tolerance (max-norm) of the last subproblem.
    #[config(default = 1e-6)]
    pub inner_tolerance: f64,
    /// L-BFGS history size.
    #[config(default = 10)]
    pub history_size: usize,
    /// Largest fraction of the distance to a bound a step may cover.
    #[config(default = 0.995)]
    pub fraction_to_boundary: f64,
}

/// Log-barrier method with an L-BFGS inner minimizer.
#[derive(Debug, Clone)]
pub struct InteriorPointSolver {
    config: InteriorPointConfig,
}

impl Default for InteriorPointSolver {
    fn default() -> Self {
        Self::new(InteriorPointConfig::new())
    }
}

/// Current iterate with its objective, barrier value and both gradients.
struct Iterate {
    x: DVector<f64>,
    f: f64,
    grad_f: DVector<f64>,
    phi: f64,
    grad_phi: DVector<f64>,
}

enum InnerExit {
    Converged,
    Stalled,
    LineSearchFailed,
    MaxIterations,
    Cancelled,
}

impl InteriorPointSolver {
    pub fn new(config: InteriorPointConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InteriorPointConfig {
        &self.config
    }

    fn validate(&self, options: &SolveOptions) -> crate::error::Result<()> {
        let c = &self.config;
        if !(options.barrier_init > 0.0 && options.barrier_init.is_finite()) {
            return Err(RegistrationError::invalid_configuration(format!(
                "barrier_init must be positive, got {}",
                options.barrier_init
            )));
        }
        if !(c.barrier_decrease > 0.0 && c.barrier_decrease < 1.0) {
            return Err(RegistrationError::invalid_configuration("barrier_decrease must lie in (0, 1)"));
        }
        if !(c.fraction_to_boundary > 0.0 && c.fraction_to_boundary < 1.0) {
            return Err(RegistrationError::invalid_configuration("fraction_to_boundary must lie in (0, 1)"));
        }
        if !(c.barrier_tolerance > 0.0) {
            return Err(RegistrationError::invalid_configuration("barrier_tolerance must be positive"));
        }
        Ok(())
    }

    fn evaluate<P: NlpProblem + ?Sized>(
        problem: &P,
        bounds: &Bounds,
        x: DVector<f64>,
        mu: f64,
    ) -> crate::error::Result<Iterate> {
        let mut grad = vec![0.0; x.len()];
        let f = problem.evaluate_with_gradient(x.as_slice(), &mut grad)?;
        let grad_f = DVector::from_vec(grad);
        let (phi, grad_phi) = barrier(&x, f, &grad_f, bounds, mu);
        Ok(Iterate {
            x,
            f,
            grad_f,
            phi,
            grad_phi,
        })
    }

    /// Largest step along `d` that keeps the fraction-to-boundary rule.
    fn max_step(&self, x: &DVector<f64>, d: &DVector<f64>, bounds: &Bounds) -> f64 {
        let mut alpha: f64 = 1.0;
        for i in 0..x.len() {
            let room = if d[i] < 0.0 {
                (x[i] - bounds.lower()[i]) / -d[i]
            } else if d[i] > 0.0 {
                (bounds.upper()[i] - x[i]) / d[i]
            } else {
                f64::INFINITY
            };
            alpha = alpha.min(self.config.fraction_to_boundary * room);
        }
        alpha
    }

    fn line_search<P: NlpProblem + ?Sized>(
        &self,
        problem: &P,
        bounds: &Bounds,
        current: &Iterate,
        d: &DVector<f64>,
        mu: f64,
    ) -> crate::error::Result<Option<Iterate>> {
        let slope = current.grad_phi.dot(d);
        let mut alpha = self.max_step(&current.x, d, bounds);
        for _ in 0..MAX_BACKTRACKS {
            if alpha <= 0.0 {
                break;
            }
            let x = &current.x + d * alpha;
            let candidate = Self::evaluate(problem, bounds, x, mu)?;
            if candidate.phi.is_finite() && candidate.phi <= current.phi + ARMIJO_C * alpha * slope {
                return Ok(Some(candidate));
            }
            alpha *= 0.5;
        }
        Ok(None)
    }

    /// Minimize `φ_μ` from `state` until its gradient is small.
    #[allow(clippy::too_many_arguments)]
    fn minimize_subproblem<P: NlpProblem + ?Sized>(
        &self,
        problem: &P,
        bounds: &Bounds,
        state: &mut Iterate,
        best: &mut (DVector<f64>, f64),
        mu: f64,
        iterations: &mut usize,
        options: &SolveOptions,
    ) -> crate::error::Result<InnerExit> {
        let tolerance = self.config.inner_tolerance.max(10.0 * mu);
        let mut memory = LbfgsMemory::new(self.config.history_size);
        loop {
            if options.is_cancelled() {
                return Ok(InnerExit::Cancelled);
            }
            if state.grad_phi.amax() <= tolerance {
                return Ok(InnerExit::Converged);
            }
            if *iterations >= self.config.max_iterations {
                return Ok(InnerExit::MaxIterations);
            }

            let mut d = memory.direction(&state.grad_phi);
            if !(state.grad_phi.dot(&d) < 0.0) {
                memory.clear();
                d = -&state.grad_phi;
            }
            let next = match self.line_search(problem, bounds, state, &d, mu)? {
                Some(next) => next,
                None if !memory.is_empty() => {
                    memory.clear();
                    continue;
                }
                None => return Ok(InnerExit::LineSearchFailed),
            };
            *iterations += 1;

            memory.push(&next.x - &state.x, &next.grad_phi - &state.grad_phi);
            let decrease = state.phi - next.phi;
            if next.f < best.1 {
                *best = (next.x.clone(), next.f);
            }
            let scale = state.phi.abs().max(1.0);
            *state = next;
            if decrease.is_finite() && decrease <= f64::EPSILON * scale {
                return Ok(InnerExit::Stalled);
            }
        }
    }
}

/// `φ_μ` and its gradient from `f` and `∇f`.
fn barrier(x: &DVector<f64>, f: f64, grad_f: &DVector<f64>, bounds: &Bounds, mu: f64) -> (f64, DVector<f64>) {
    let mut phi = f;
    let mut grad = grad_f.clone();
    for i in 0..x.len() {
        let (lo, hi) = (bounds.lower()[i], bounds.upper()[i]);
        if lo.is_finite() {
            phi -= mu * (x[i] - lo).ln();
            grad[i] -= mu / (x[i] - lo);
        }
        if hi.is_finite() {
            phi -= mu * (hi - x[i]).ln();
            grad[i] += mu / (hi - x[i]);
        }
    }
    (phi, grad)
}

/// Move `x0` strictly inside the box.
fn interior_start(x0: &[f64], bounds: &Bounds) -> DVector<f64> {
    DVector::from_iterator(
        x0.len(),
        x0.iter().zip(bounds.lower().iter().zip(bounds.upper())).map(|(&x, (&lo, &hi))| {
            let margin = if lo.is_finite() && hi.is_finite() {
                INTERIOR_MARGIN * (hi - lo)
            } else {
                INTERIOR_MARGIN
            };
            let x = if lo.is_finite() { x.max(lo + margin) } else { x };
            if hi.is_finite() {
                x.min(hi - margin)
            } else {
                x
            }
        }),
    )
}

impl NlpSolver for InteriorPointSolver {
    fn optimize<P>(&self, problem: &P, bounds: &Bounds, x0: &[f64], options: &SolveOptions) -> crate::error::Result<NlpSolution>
    where
        P: NlpProblem + ?Sized,
    {
        let n = problem.dimension();
        if bounds.len() != n || x0.len() != n {
            return Err(RegistrationError::dimension_mismatch(format!(
                "problem dimension {}, {} bounds, start of length {}",
                n,
                bounds.len(),
                x0.len()
            )));
        }
        self.validate(options)?;

        let mut mu = options.barrier_init;
        let mut state = Self::evaluate(problem, bounds, interior_start(x0, bounds), mu)?;
        let mut best = (state.x.clone(), state.f);
        let mut iterations = 0;

        let status = loop {
            let exit = self.minimize_subproblem(problem, bounds, &mut state, &mut best, mu, &mut iterations, options)?;
            tracing::debug!(
                "Barrier μ = {:.1e}: f = {:.6e}, {} iterations so far",
                mu,
                state.f,
                iterations
            );
            match exit {
                InnerExit::Cancelled => break SolverStatus::Cancelled,
                InnerExit::MaxIterations => break SolverStatus::MaxIterations,
                InnerExit::LineSearchFailed if mu <= self.config.barrier_tolerance => {
                    break SolverStatus::LineSearchFailed
                }
                _ if mu <= self.config.barrier_tolerance => break SolverStatus::Optimal,
                _ => {}
            }
            mu = (mu * self.config.barrier_decrease).max(self.config.barrier_tolerance);
            let (phi, grad_phi) = barrier(&state.x, state.f, &state.grad_f, bounds, mu);
            state.phi = phi;
            state.grad_phi = grad_phi;
        };

        let (x, f) = best;
        Ok(NlpSolution::new(x.as_slice().to_vec(), f, status, iterations))
    }
}
