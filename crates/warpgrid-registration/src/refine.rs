//! Nonlinear refinement of a deformation at a fixed regularization weight.
//!
//! [`DeformableRegistration::optimize`] runs one bound-constrained solve of
//! the total penalty over the displacements of `ϕ`.
//! [`DeformableRegistration::fixed_lambda`] starts from the linear initial
//! guess and retries the solve with a smaller initial barrier until the
//! penalty improves on the clamped start.

use burn::config::Config;
use warpgrid_core::{Compose, GridArray, GridDeformation, Knots, Vector};
use crate::error::RegistrationError;
use crate::initial::{clamp_displacements, initial_deformation};
use crate::mismatch::{BlockMismatch, MismatchFits};
use crate::penalty::{flatten, total_penalty, unflatten, AffinePenalty, PenaltyParts};
use crate::registration::DeformableRegistration;
use crate::solver::{Bounds, NlpProblem, NlpSolver, SolveOptions, SolverStatus};
use crate::validation::validate_fits;

/// Refinement settings.
#[derive(Config, Debug)]
pub struct RefinementConfig {
    /// Box constraints are `±(max_shift - shift_margin)`. Keeps the solution
    /// strictly inside the sampled mismatch surface.
    #[config(default = 0.5001)]
    pub shift_margin: f64,
    /// Initial barrier parameter of the first solve.
    #[config(default = 0.1)]
    pub barrier_init: f64,
    /// Backoff gives up once the barrier drops below this.
    #[config(default = 1e-16)]
    pub barrier_floor: f64,
    /// Barrier divisor between attempts.
    #[config(default = 10.0)]
    pub barrier_backoff: f64,
}

impl RefinementConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(self.shift_margin >= 0.0 && self.shift_margin.is_finite()) {
            return Err(RegistrationError::invalid_configuration(format!(
                "shift_margin must be finite and non-negative, got {}",
                self.shift_margin
            )));
        }
        if !(self.barrier_floor > 0.0 && self.barrier_init >= self.barrier_floor) {
            return Err(RegistrationError::invalid_configuration(format!(
                "need 0 < barrier_floor <= barrier_init, got {} and {}",
                self.barrier_floor, self.barrier_init
            )));
        }
        if !(self.barrier_backoff > 1.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "barrier_backoff must exceed 1, got {}",
                self.barrier_backoff
            )));
        }
        Ok(())
    }
}

/// Per-axis bound `max_shift - margin`, which must stay positive.
pub fn shift_bounds<const D: usize>(max_shift: [usize; D], margin: f64) -> crate::error::Result<[f64; D]> {
    let bound: [f64; D] = std::array::from_fn(|d| max_shift[d] as f64 - margin);
    if bound.iter().any(|&b| !(b > 0.0)) {
        return Err(RegistrationError::invalid_configuration(format!(
            "max_shift {:?} leaves no room inside a margin of {}",
            max_shift, margin
        )));
    }
    Ok(bound)
}

/// Outcome of a refinement.
#[derive(Debug, Clone)]
pub struct Refinement<const D: usize> {
    /// Optimized deformation, in raw mode on the knots of the start.
    pub deformation: GridDeformation<D>,
    /// Penalty of `prior ∘ deformation`.
    pub penalty: PenaltyParts,
    /// Penalty of the clamped start.
    pub initial_penalty: PenaltyParts,
    pub status: SolverStatus,
}

/// Total penalty as a function of the flattened displacements.
struct DeformationProblem<'a, P: ?Sized, M: ?Sized, const D: usize> {
    knots: &'a Knots<D>,
    prior: &'a P,
    penalty: &'a AffinePenalty<D>,
    mismatch: &'a M,
}

impl<'a, P, M, const D: usize> DeformationProblem<'a, P, M, D>
where
    P: Compose<D> + ?Sized,
    M: BlockMismatch<D> + ?Sized,
{
    fn deformation(&self, x: &[f64]) -> crate::error::Result<GridDeformation<D>> {
        Ok(GridDeformation::new(unflatten(self.knots.shape(), x)?, self.knots.clone())?)
    }
}

impl<'a, P, M, const D: usize> NlpProblem for DeformationProblem<'a, P, M, D>
where
    P: Compose<D> + ?Sized,
    M: BlockMismatch<D> + ?Sized,
{
    fn dimension(&self) -> usize {
        self.knots.len() * D
    }

    fn evaluate_objective(&self, x: &[f64]) -> crate::error::Result<f64> {
        let phi = self.deformation(x)?;
        Ok(total_penalty(&phi, self.prior, self.penalty, self.mismatch, None)?.total)
    }

    fn evaluate_gradient(&self, x: &[f64], gradient: &mut [f64]) -> crate::error::Result<()> {
        self.evaluate_with_gradient(x, gradient).map(|_| ())
    }

    fn evaluate_with_gradient(&self, x: &[f64], gradient: &mut [f64]) -> crate::error::Result<f64> {
        if gradient.len() != x.len() {
            return Err(RegistrationError::dimension_mismatch(format!(
                "gradient buffer has {} entries for {} parameters",
                gradient.len(),
                x.len()
            )));
        }
        let phi = self.deformation(x)?;
        let mut g = GridArray::filled(self.knots.shape(), Vector::<D>::zeros());
        let parts = total_penalty(&phi, self.prior, self.penalty, self.mismatch, Some(&mut g))?;
        gradient.copy_from_slice(&flatten(&g));
        Ok(parts.total)
    }
}

impl<S: NlpSolver> DeformableRegistration<S> {
    /// Minimize the penalty of `prior ∘ ϕ` over the displacements of `ϕ`.
    ///
    /// `ϕ` is clamped into the box `±(max_shift - shift_margin)` before the
    /// solve. A non-optimal solver status is logged and the best point is
    /// returned anyway.
    pub fn optimize<P, M, const D: usize>(
        &self,
        phi: &GridDeformation<D>,
        prior: &P,
        penalty: &AffinePenalty<D>,
        mismatch: &M,
        barrier_init: f64,
    ) -> crate::error::Result<Refinement<D>>
    where
        P: Compose<D> + ?Sized,
        M: BlockMismatch<D> + ?Sized,
    {
        self.refinement.validate()?;
        self.cancel.check()?;
        let knots = phi.knots();
        check_grid(knots, penalty, mismatch)?;

        let bound = shift_bounds(mismatch.max_shift(), self.refinement.shift_margin)?;
        let start = phi.with_displacements(clamp_displacements(phi.displacements(), &bound))?;
        let initial_penalty = total_penalty(&start, prior, penalty, mismatch, None)?;

        let radius: Vec<f64> = (0..knots.len()).flat_map(|_| bound.iter().copied()).collect();
        let bounds = Bounds::symmetric(&radius)?;
        let problem = DeformationProblem {
            knots,
            prior,
            penalty,
            mismatch,
        };
        let options = SolveOptions::default()
            .with_barrier_init(barrier_init)
            .with_cancel(self.cancel.clone());
        let solution = self
            .solver
            .optimize(&problem, &bounds, &flatten(start.displacements()), &options)?;

        let status = solution.status();
        if status == SolverStatus::Cancelled {
            return Err(RegistrationError::Cancelled);
        }
        if !status.is_optimal() {
            tracing::warn!(
                "Refinement ended with status {:?} after {} iterations (barrier_init {:.1e})",
                status,
                solution.iterations(),
                barrier_init
            );
        }
        let deformation = problem.deformation(solution.solution())?;
        let parts = total_penalty(&deformation, prior, penalty, mismatch, None)?;
        tracing::debug!(
            "Refinement: penalty {:.6e} -> {:.6e} in {} iterations",
            initial_penalty.total,
            parts.total,
            solution.iterations()
        );
        Ok(Refinement {
            deformation,
            penalty: parts,
            initial_penalty,
            status,
        })
    }

    /// Refine from `start`, backing off the initial barrier until a solve
    /// does not worsen the penalty of the clamped start.
    ///
    /// Falls back to the clamped start when every attempt down to
    /// `barrier_floor` fails to improve, so the returned penalty never
    /// exceeds the starting one.
    pub fn refine_with_backoff<P, M, const D: usize>(
        &self,
        start: &GridDeformation<D>,
        prior: &P,
        penalty: &AffinePenalty<D>,
        mismatch: &M,
    ) -> crate::error::Result<Refinement<D>>
    where
        P: Compose<D> + ?Sized,
        M: BlockMismatch<D> + ?Sized,
    {
        self.refinement.validate()?;
        check_grid(start.knots(), penalty, mismatch)?;
        let bound = shift_bounds(mismatch.max_shift(), self.refinement.shift_margin)?;
        let clamped = start.with_displacements(clamp_displacements(start.displacements(), &bound))?;
        let start_penalty = total_penalty(&clamped, prior, penalty, mismatch, None)?;

        let mut barrier = self.refinement.barrier_init;
        let mut status = SolverStatus::MaxIterations;
        while barrier >= self.refinement.barrier_floor {
            self.cancel.check()?;
            let refinement = self.optimize(&clamped, prior, penalty, mismatch, barrier)?;
            if refinement.penalty.total <= start_penalty.total {
                return Ok(Refinement {
                    initial_penalty: start_penalty,
                    ..refinement
                });
            }
            tracing::debug!(
                "Barrier {:.1e} worsened the penalty ({:.6e} > {:.6e}), backing off",
                barrier,
                refinement.penalty.total,
                start_penalty.total
            );
            status = refinement.status;
            barrier /= self.refinement.barrier_backoff;
        }

        tracing::warn!(
            "No refinement improved on the starting penalty {:.6e}; keeping the start",
            start_penalty.total
        );
        Ok(Refinement {
            deformation: clamped,
            penalty: start_penalty,
            initial_penalty: start_penalty,
            status,
        })
    }

    /// Register at the fixed weight `penalty.lambda()`.
    ///
    /// Solves the quadratic model for an initial guess, clamps it into the
    /// shift box and refines it against `mismatch` with barrier backoff.
    pub fn fixed_lambda<P, M, const D: usize>(
        &self,
        fits: &MismatchFits<D>,
        knots: &Knots<D>,
        penalty: &AffinePenalty<D>,
        mismatch: &M,
        prior: &P,
    ) -> crate::error::Result<Refinement<D>>
    where
        P: Compose<D> + ?Sized,
        M: BlockMismatch<D> + ?Sized,
    {
        validate_fits(fits, knots.shape())?;
        let guess = initial_deformation(penalty, fits, &self.cg)?;
        let start = GridDeformation::new(guess.displacements, knots.clone())?;
        self.refine_with_backoff(&start, prior, penalty, mismatch)
    }
}

fn check_grid<M, const D: usize>(knots: &Knots<D>, penalty: &AffinePenalty<D>, mismatch: &M) -> crate::error::Result<()>
where
    M: BlockMismatch<D> + ?Sized,
{
    if penalty.grid_shape() != knots.shape() {
        return Err(RegistrationError::shape_mismatch(&knots.shape(), &penalty.grid_shape()));
    }
    if mismatch.grid_shape() != knots.shape() {
        return Err(RegistrationError::shape_mismatch(&knots.shape(), &mismatch.grid_shape()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warpgrid_core::spatial::{Matrix2, Vector2};
    use warpgrid_core::IdentityTransform;
    use crate::mismatch::InterpolatedMismatch;
    use crate::progress::CancellationToken;

    fn setup(lambda: f64) -> (Knots<2>, AffinePenalty<2>, MismatchFits<2>, InterpolatedMismatch<2>) {
        let knots = Knots::from_image_size([40, 40], [3, 3]).unwrap();
        let penalty = AffinePenalty::new(&knots, lambda).unwrap();
        let cs = GridArray::from_fn([3, 3], |[i, j]| {
            Vector2::new(0.5 * i as f64 - 0.3, if (i + j) % 2 == 0 { 0.8 } else { -0.6 })
        });
        let qs = GridArray::filled([3, 3], Matrix2::new(2.0, 0.3, 0.3, 1.0));
        let fits = MismatchFits::new(cs, qs, [3, 3]).unwrap();
        let mismatch = InterpolatedMismatch::from_fits(&fits).unwrap();
        (knots, penalty, fits, mismatch)
    }

    #[test]
    fn test_shift_bounds() {
        assert_eq!(shift_bounds([3, 2], 0.5).unwrap(), [2.5, 1.5]);
        assert!(shift_bounds([3, 0], 0.5).is_err());
        assert!(shift_bounds::<1>([1], 1.0).is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(RefinementConfig::new().validate().is_ok());
        assert!(RefinementConfig::new().with_barrier_backoff(1.0).validate().is_err());
        assert!(RefinementConfig::new().with_barrier_floor(0.0).validate().is_err());
        assert!(RefinementConfig::new().with_shift_margin(-0.1).validate().is_err());
    }

    #[test]
    fn test_optimize_stays_in_box() {
        let (knots, penalty, _, mismatch) = setup(0.1);
        let registration = DeformableRegistration::default();
        let u = GridArray::filled([3, 3], Vector2::new(5.0, -5.0));
        let phi = GridDeformation::new(u, knots).unwrap();
        let result = registration
            .optimize(&phi, &IdentityTransform, &penalty, &mismatch, 0.1)
            .unwrap();
        for v in result.deformation.displacements().iter() {
            assert!(v.x.abs() <= 2.4999 + 1e-12 && v.y.abs() <= 2.4999 + 1e-12);
        }
        assert!(result.penalty.total <= result.initial_penalty.total);
        assert!(!result.deformation.is_interpolating());
    }

    #[test]
    fn test_fixed_lambda_improves_on_start() {
        let (knots, penalty, fits, mismatch) = setup(1.0);
        let registration = DeformableRegistration::default();
        let result = registration
            .fixed_lambda(&fits, &knots, &penalty, &mismatch, &IdentityTransform)
            .unwrap();
        assert!(result.penalty.total <= result.initial_penalty.total);
        assert!((result.penalty.total - result.penalty.affine - result.penalty.data).abs() < 1e-12);
    }

    #[test]
    fn test_grid_mismatch_is_shape_error() {
        let (_, penalty, fits, mismatch) = setup(1.0);
        let other = Knots::from_image_size([40, 40], [4, 3]).unwrap();
        let registration = DeformableRegistration::default();
        let err = registration
            .fixed_lambda(&fits, &other, &penalty, &mismatch, &IdentityTransform)
            .unwrap_err();
        assert!(err.is_shape_error());
    }

    #[test]
    fn test_cancelled_before_start() {
        let (knots, penalty, fits, mismatch) = setup(1.0);
        let token = CancellationToken::new();
        token.cancel();
        let registration = DeformableRegistration::default().with_cancellation(token);
        let err = registration
            .fixed_lambda(&fits, &knots, &penalty, &mismatch, &IdentityTransform)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Cancelled));
    }
}
