//! Array storage and pixel-grid helpers.

pub mod array;
pub mod grid;

pub use array::{grid_indices, GridArray};
