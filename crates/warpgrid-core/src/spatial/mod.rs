//! Spatial types for coordinates, displacements and per-point linear maps.
//!
//! All types are nalgebra fixed-size types, so the usual nalgebra
//! arithmetic is available on them directly.

use nalgebra::{SMatrix, SVector};

/// A coordinate in D-dimensional index space.
pub type Point<const D: usize> = SVector<f64, D>;
/// A displacement in D-dimensional index space.
pub type Vector<const D: usize> = SVector<f64, D>;
/// A D×D matrix (mismatch curvature, Jacobian).
pub type Matrix<const D: usize> = SMatrix<f64, D, D>;

pub type Point2 = Point<2>;
pub type Point3 = Point<3>;
pub type Vector2 = Vector<2>;
pub type Vector3 = Vector<3>;
pub type Matrix2 = Matrix<2>;
pub type Matrix3 = Matrix<3>;

/// Convert an integer grid index into a continuous coordinate.
pub fn index_to_point<const D: usize>(index: [usize; D]) -> Point<D> {
    Point::<D>::from_fn(|d, _| index[d] as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_to_point() {
        let p = index_to_point([2, 5, 7]);
        assert_eq!(p, Point3::new(2.0, 5.0, 7.0));
    }
}
