//! Interpolation on knot grids, pixel arrays and tensors.

pub mod bspline;
pub mod linear;
pub mod sampler;
pub mod trait_;

pub use bspline::{knot_coordinates, Interpolant, QuadraticBSpline};
pub use linear::LinearInterpolator;
pub use sampler::{ContinuousSampler, LinearSampler};
pub use trait_::Interpolator;
