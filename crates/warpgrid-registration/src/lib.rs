//! Affine-regularized deformable registration on a knot grid.
//!
//! The pipeline consumes per-block mismatch data and produces a
//! [`GridDeformation`](warpgrid_core::GridDeformation):
//!
//! 1. [`initial::initial_deformation`] solves the quadratic model of the
//!    mismatch plus the affine penalty with conjugate gradients.
//! 2. [`DeformableRegistration::fixed_lambda`] refines that guess against the
//!    interpolated mismatch with a bound-constrained solver.
//! 3. [`DeformableRegistration::auto_lambda`] sweeps the regularization weight
//!    and picks it from a sigmoid fit of the data penalty.
//!
//! [`rigid::optimize_rigid`] provides a rigid pre-alignment with gradients
//! from burn autodiff.

pub mod error;
pub mod progress;
pub mod validation;
pub mod mismatch;
pub mod penalty;
pub mod solver;
pub mod gradient;
pub mod initial;
pub mod registration;
pub mod refine;
pub mod sigmoid;
pub mod auto_lambda;
pub mod rigid;

pub use error::{RegistrationError, Result};
pub use progress::{CancellationToken, ConsoleProgressCallback, HistoryCallback, ProgressCallback, ProgressInfo};
pub use mismatch::{BlockMismatch, InterpolatedMismatch, MismatchFits};
pub use penalty::{total_penalty, AffinePenalty, PenaltyParts};
pub use solver::{
    Bounds, CgConfig, InteriorPointConfig, InteriorPointSolver, NlpProblem, NlpSolution, NlpSolver,
    SolveOptions, SolverStatus,
};
pub use gradient::{AutodiffGradient, GradientProblem, GradientProvider};
pub use initial::{initial_deformation, AffineQHessian, InitialGuess};
pub use registration::DeformableRegistration;
pub use refine::{Refinement, RefinementConfig};
pub use sigmoid::{fit_sigmoid, SigmoidFit};
pub use auto_lambda::{AutoLambdaConfig, LambdaSweep};
pub use rigid::{optimize_rigid, RigidConfig, RigidRegistration};
