//! Knot grids: per-axis control-point coordinates.

use crate::error::{CoreError, Result};
use crate::image::grid_indices;
use crate::spatial::Point;

/// Tensor-product grid of control points.
///
/// Every axis holds at least two strictly increasing, finite coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Knots<const D: usize> {
    axes: [Vec<f64>; D],
}

impl<const D: usize> Knots<D> {
    /// Validate and wrap explicit per-axis coordinates.
    pub fn new(axes: [Vec<f64>; D]) -> Result<Self> {
        for (d, axis) in axes.iter().enumerate() {
            if axis.len() < 2 {
                return Err(CoreError::shape(format!(
                    "knot axis {} has {} entries, at least 2 required",
                    d,
                    axis.len()
                )));
            }
            if axis.iter().any(|v| !v.is_finite()) {
                return Err(CoreError::shape(format!("knot axis {} contains non-finite values", d)));
            }
            if axis.windows(2).any(|w| w[1] <= w[0]) {
                return Err(CoreError::shape(format!("knot axis {} is not strictly increasing", d)));
            }
        }
        Ok(Self { axes })
    }

    /// Evenly spaced knots spanning the first to the last pixel of an image,
    /// both corners included.
    pub fn from_image_size(image_size: [usize; D], grid_shape: [usize; D]) -> Result<Self> {
        let mut axes: [Vec<f64>; D] = std::array::from_fn(|_| Vec::new());
        for d in 0..D {
            let (size, n) = (image_size[d], grid_shape[d]);
            if size < 2 || n < 2 {
                return Err(CoreError::shape(format!(
                    "axis {}: image size {} and grid size {} must both be at least 2",
                    d, size, n
                )));
            }
            let last = (size - 1) as f64;
            axes[d] = (0..n).map(|i| last * i as f64 / (n - 1) as f64).collect();
        }
        Self::new(axes)
    }

    /// Number of knots along each axis.
    pub fn shape(&self) -> [usize; D] {
        std::array::from_fn(|d| self.axes[d].len())
    }

    /// Total number of knots.
    pub fn len(&self) -> usize {
        self.axes.iter().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn axis(&self, d: usize) -> &[f64] {
        &self.axes[d]
    }

    pub fn axes(&self) -> &[Vec<f64>; D] {
        &self.axes
    }

    /// Coordinate of the knot at a multi-index.
    pub fn point(&self, index: [usize; D]) -> Point<D> {
        Point::<D>::from_fn(|d, _| self.axes[d][index[d]])
    }

    /// All knot coordinates in storage order.
    pub fn points(&self) -> Vec<Point<D>> {
        grid_indices(self.shape()).map(|index| self.point(index)).collect()
    }

    /// Cell containing `x` along axis `d` and the fractional position within it.
    ///
    /// Outside the axis the boundary cell is returned and the fraction falls
    /// outside `[0, 1]`, which makes interpolation extrapolate linearly.
    pub fn locate(&self, d: usize, x: f64) -> (usize, f64) {
        let axis = &self.axes[d];
        let cell = axis
            .partition_point(|&k| k <= x)
            .saturating_sub(1)
            .min(axis.len() - 2);
        let t = (x - axis[cell]) / (axis[cell + 1] - axis[cell]);
        (cell, t)
    }

    /// Bounding box of the grid, first and last knot per axis.
    pub fn extent(&self) -> (Point<D>, Point<D>) {
        let lo = Point::<D>::from_fn(|d, _| self.axes[d][0]);
        let hi = Point::<D>::from_fn(|d, _| self.axes[d][self.axes[d].len() - 1]);
        (lo, hi)
    }
}
