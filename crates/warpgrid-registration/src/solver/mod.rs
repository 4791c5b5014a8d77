//! Linear and nonlinear solvers.
//!
//! * [`linear`]: conjugate gradients over a [`LinearOperator`]
//! * [`nlp`]: the bound-constrained solver contract
//! * [`interior_point`]: a log-barrier implementation of that contract

pub mod interior_point;
pub mod lbfgs;
pub mod linear;
pub mod nlp;

pub use interior_point::{InteriorPointConfig, InteriorPointSolver};
pub use lbfgs::LbfgsMemory;
pub use linear::{conjugate_gradient, CgConfig, CgOutcome, LinearOperator};
pub use nlp::{Bounds, NlpProblem, NlpSolution, NlpSolver, SolveOptions, SolverStatus};
