//! Knot grids, grid deformations and their composition, plus the tensor-side
//! rigid transform.

pub mod compose;
pub mod deformation;
pub mod knots;
pub mod rigid;
pub mod trait_;

pub use compose::{Compose, IdentityTransform};
pub use deformation::{DisplacementField, GridDeformation, InterpolatedField};
pub use knots::Knots;
pub use rigid::RigidTransform;
pub use trait_::Transform;
