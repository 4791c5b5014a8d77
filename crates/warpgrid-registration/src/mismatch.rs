//! Per-block mismatch inputs.
//!
//! The mismatch between fixed and moving image is supplied from outside as
//! one cost surface per grid block, a function of the block's shift. Two
//! forms are consumed: quadratic fits `(u - c)ᵀ Q (u - c)`, used for the
//! initial guess, and cost arrays sampled on integer shifts, used for
//! refinement. The sampled arrays are read through quadratic B-splines, whose
//! minima fall between samples.

use warpgrid_core::interpolation::QuadraticBSpline;
use warpgrid_core::{GridArray, Matrix, Vector};
use crate::error::{RegistrationError, Result};

/// Cost of shifting a grid block, with its gradient.
pub trait BlockMismatch<const D: usize> {
    /// Shape of the block grid.
    fn grid_shape(&self) -> [usize; D];

    /// Largest admissible shift along each axis.
    fn max_shift(&self) -> [usize; D];

    /// Cost and gradient for block `block` (row-major linear index) at `shift`.
    fn value_and_gradient(&self, block: usize, shift: &Vector<D>) -> (f64, Vector<D>);
}

/// Quadratic mismatch fits, one centre and curvature matrix per block.
#[derive(Debug, Clone, PartialEq)]
pub struct MismatchFits<const D: usize> {
    cs: GridArray<Vector<D>, D>,
    qs: GridArray<Matrix<D>, D>,
    max_shift: [usize; D],
}

impl<const D: usize> MismatchFits<D> {
    pub fn new(cs: GridArray<Vector<D>, D>, qs: GridArray<Matrix<D>, D>, max_shift: [usize; D]) -> Result<Self> {
        if cs.shape() != qs.shape() {
            return Err(RegistrationError::shape_mismatch(&cs.shape(), &qs.shape()));
        }
        Ok(Self { cs, qs, max_shift })
    }

    /// Block centres: the per-block minimizers.
    pub fn cs(&self) -> &GridArray<Vector<D>, D> {
        &self.cs
    }

    /// Block curvature matrices.
    pub fn qs(&self) -> &GridArray<Matrix<D>, D> {
        &self.qs
    }
}

impl<const D: usize> BlockMismatch<D> for MismatchFits<D> {
    fn grid_shape(&self) -> [usize; D] {
        self.cs.shape()
    }

    fn max_shift(&self) -> [usize; D] {
        self.max_shift
    }

    fn value_and_gradient(&self, block: usize, shift: &Vector<D>) -> (f64, Vector<D>) {
        let q = &self.qs[block];
        let r = shift - self.cs[block];
        let value = r.dot(&(q * r));
        let gradient = (q + q.transpose()) * r;
        (value, gradient)
    }
}

/// Cost arrays sampled at integer shifts `-max_shift..=max_shift`, evaluated
/// between samples by quadratic B-spline interpolation.
#[derive(Debug, Clone)]
pub struct InterpolatedMismatch<const D: usize> {
    blocks: GridArray<GridArray<f64, D>, D>,
    surfaces: GridArray<QuadraticBSpline<f64, D>, D>,
    max_shift: [usize; D],
}

impl<const D: usize> InterpolatedMismatch<D> {
    /// Every block must have shape `2 max_shift + 1` with `max_shift >= 1`
    /// and hold only finite values.
    pub fn new(blocks: GridArray<GridArray<f64, D>, D>, max_shift: [usize; D]) -> Result<Self> {
        if max_shift.iter().any(|&m| m == 0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "max_shift must be at least 1 on every axis, got {:?}",
                max_shift
            )));
        }
        let expected: [usize; D] = std::array::from_fn(|d| 2 * max_shift[d] + 1);
        for block in blocks.iter() {
            if block.shape() != expected {
                return Err(RegistrationError::shape_mismatch(&expected, &block.shape()));
            }
            if block.iter().any(|v| !v.is_finite()) {
                return Err(RegistrationError::numerical_instability(
                    "mismatch arrays must be finite",
                ));
            }
        }
        let surfaces = blocks.map(QuadraticBSpline::new);
        Ok(Self {
            blocks,
            surfaces,
            max_shift,
        })
    }

    /// Sample each quadratic fit on the integer shift grid.
    pub fn from_fits(fits: &MismatchFits<D>) -> Result<Self> {
        let max_shift = fits.max_shift;
        let shape: [usize; D] = std::array::from_fn(|d| 2 * max_shift[d] + 1);
        let blocks = GridArray::from_fn(fits.grid_shape(), |index| {
            let block = fits.cs.linear_index(index);
            GridArray::from_fn(shape, |k| {
                let shift = Vector::<D>::from_fn(|d, _| k[d] as f64 - max_shift[d] as f64);
                fits.value_and_gradient(block, &shift).0
            })
        });
        Self::new(blocks, max_shift)
    }

    pub fn blocks(&self) -> &GridArray<GridArray<f64, D>, D> {
        &self.blocks
    }
}

impl<const D: usize> BlockMismatch<D> for InterpolatedMismatch<D> {
    fn grid_shape(&self) -> [usize; D] {
        self.blocks.shape()
    }

    fn max_shift(&self) -> [usize; D] {
        self.max_shift
    }

    fn value_and_gradient(&self, block: usize, shift: &Vector<D>) -> (f64, Vector<D>) {
        let surface = &self.surfaces[block];
        let s: [f64; D] = std::array::from_fn(|d| shift[d] + self.max_shift[d] as f64);
        let partials = surface.gradient(&s);
        (surface.value(&s), Vector::<D>::from_fn(|d, _| partials[d]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warpgrid_core::spatial::{Matrix2, Vector2};

    fn fits() -> MismatchFits<2> {
        let cs = GridArray::from_fn([2, 2], |[i, j]| Vector2::new(i as f64 * 0.5, -(j as f64)));
        let qs = GridArray::filled([2, 2], Matrix2::new(2.0, 0.5, 0.5, 1.0));
        MismatchFits::new(cs, qs, [2, 2]).unwrap()
    }

    #[test]
    fn test_fits_shape_check() {
        let cs = GridArray::filled([2, 3], Vector2::zeros());
        let qs = GridArray::filled([3, 2], Matrix2::identity());
        assert!(MismatchFits::new(cs, qs, [1, 1]).unwrap_err().is_shape_error());
    }

    #[test]
    fn test_quadratic_minimum_at_centre() {
        let fits = fits();
        let (value, gradient) = fits.value_and_gradient(3, &Vector2::new(0.5, -1.0));
        assert_eq!(value, 0.0);
        assert_eq!(gradient, Vector2::zeros());
        let (value, gradient) = fits.value_and_gradient(0, &Vector2::new(1.0, 0.0));
        assert!((value - 2.0).abs() < 1e-12);
        assert!((gradient - Vector2::new(4.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_sampled_surface_matches_at_integer_shifts() {
        let fits = fits();
        let sampled = InterpolatedMismatch::from_fits(&fits).unwrap();
        let shift = Vector2::new(-1.0, 2.0);
        for block in 0..4 {
            let exact = fits.value_and_gradient(block, &shift).0;
            let (value, _) = sampled.value_and_gradient(block, &shift);
            assert!((exact - value).abs() < 1e-12);
        }
    }

    #[test]
    fn test_sampled_quadratic_is_exact_between_samples() {
        let fits = fits();
        let sampled = InterpolatedMismatch::from_fits(&fits).unwrap();
        for shift in [Vector2::new(0.5, -1.0), Vector2::new(0.3, 0.7), Vector2::new(-1.45, 1.9)] {
            for block in 0..4 {
                let (exact, exact_gradient) = fits.value_and_gradient(block, &shift);
                let (value, gradient) = sampled.value_and_gradient(block, &shift);
                assert!((exact - value).abs() < 1e-10, "{} vs {}", exact, value);
                assert!((exact_gradient - gradient).norm() < 1e-10);
            }
        }
    }

    #[test]
    fn test_rejects_bad_blocks() {
        let blocks = GridArray::filled([1, 1], GridArray::filled([3, 4], 0.0));
        assert!(InterpolatedMismatch::new(blocks, [1, 1]).is_err());
        let blocks = GridArray::filled([1, 1], GridArray::filled([1, 1], 0.0));
        assert!(InterpolatedMismatch::new(blocks, [0, 0]).is_err());
        let blocks = GridArray::filled([1, 1], GridArray::filled([3, 3], f64::NAN));
        assert!(InterpolatedMismatch::new(blocks, [1, 1]).is_err());
    }
}
