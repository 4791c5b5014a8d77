//! Core types for deformable registration on a grid of control points.
//!
//! * [`image::GridArray`]: dense row-major N-d storage for images and fields
//! * [`transform::Knots`] / [`transform::GridDeformation`]: displacement fields
//!   sampled at knots, with interpolation and composition
//! * [`filter::WarpedArray`]: lazy `source[x + u(x)]` views and warping
//! * tensor-side [`transform::RigidTransform`] and
//!   [`interpolation::LinearInterpolator`] for differentiable objectives

pub mod error;
pub mod spatial;
pub mod image;
pub mod interpolation;
pub mod transform;
pub mod filter;

pub use error::{CoreError, Result};
pub use image::GridArray;
pub use spatial::{Matrix, Point, Vector};
pub use transform::{Compose, GridDeformation, IdentityTransform, Knots};
pub use filter::{warp, warp_frames, warp_into, WarpedArray};
