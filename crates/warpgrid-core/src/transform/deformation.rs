//! Displacement fields sampled on a knot grid.
//!
//! A [`GridDeformation`] maps `x ↦ x + u(x)`. The displacement array is
//! either held raw, usable only at the knots themselves, or wrapped for
//! continuous evaluation between and beyond the knots. Operations that need
//! continuous evaluation check the mode and fail with
//! [`CoreError::InvalidState`] otherwise.

use crate::error::{CoreError, Result};
use crate::image::GridArray;
use crate::interpolation::{knot_coordinates, QuadraticBSpline};
use crate::spatial::{Matrix, Point, Vector};
use super::knots::Knots;

/// Displacements prepared for continuous evaluation by a quadratic B-spline
/// through the knot values.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedField<const D: usize> {
    values: GridArray<Vector<D>, D>,
    spline: QuadraticBSpline<Vector<D>, D>,
}

impl<const D: usize> InterpolatedField<D> {
    fn new(values: GridArray<Vector<D>, D>) -> Self {
        let spline = QuadraticBSpline::new(&values);
        Self { values, spline }
    }

    pub fn values(&self) -> &GridArray<Vector<D>, D> {
        &self.values
    }

    /// Displacement at `x`.
    pub fn displacement(&self, knots: &Knots<D>, x: &Point<D>) -> Vector<D> {
        let (s, _) = knot_coordinates(knots, x);
        self.spline.value(&s)
    }

    /// `∂u_i/∂x_j` at `x`.
    pub fn gradient(&self, knots: &Knots<D>, x: &Point<D>) -> Matrix<D> {
        let (s, scale) = knot_coordinates(knots, x);
        let columns = self.spline.gradient(&s);
        Matrix::<D>::from_fn(|i, j| columns[j][i] * scale[j])
    }
}

/// Storage mode of a [`GridDeformation`].
#[derive(Debug, Clone, PartialEq)]
pub enum DisplacementField<const D: usize> {
    /// Raw per-knot displacements.
    Grid(GridArray<Vector<D>, D>),
    /// Continuously evaluable displacements.
    Interpolated(InterpolatedField<D>),
}

impl<const D: usize> DisplacementField<D> {
    pub fn values(&self) -> &GridArray<Vector<D>, D> {
        match self {
            Self::Grid(values) => values,
            Self::Interpolated(field) => &field.values,
        }
    }

    fn into_values(self) -> GridArray<Vector<D>, D> {
        match self {
            Self::Grid(values) => values,
            Self::Interpolated(field) => field.values,
        }
    }
}

/// Deformation `ϕ(x) = x + u(x)` with `u` sampled at knot coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDeformation<const D: usize> {
    field: DisplacementField<D>,
    knots: Knots<D>,
}

impl<const D: usize> GridDeformation<D> {
    /// Raw deformation from one displacement vector per knot.
    pub fn new(u: GridArray<Vector<D>, D>, knots: Knots<D>) -> Result<Self> {
        let expected = knots.shape();
        if u.shape() != expected {
            return Err(CoreError::shape_mismatch(&expected, &u.shape()));
        }
        Ok(Self {
            field: DisplacementField::Grid(u),
            knots,
        })
    }

    /// Knots spread evenly over an image of the given size, one per element of `u`.
    pub fn with_image_size(u: GridArray<Vector<D>, D>, image_size: [usize; D]) -> Result<Self> {
        let knots = Knots::from_image_size(image_size, u.shape())?;
        Self::new(u, knots)
    }

    /// Build from a flat planar buffer whose leading axis holds the `D` components.
    ///
    /// `dims` is `[D, n_0, .., n_{D-1}]` and `data` is row-major over `dims`.
    pub fn from_flat(dims: &[usize], data: &[f64], knots: Knots<D>) -> Result<Self> {
        let shape = knots.shape();
        let mut expected = Vec::with_capacity(D + 1);
        expected.push(D);
        expected.extend_from_slice(&shape);
        if dims != expected.as_slice() {
            return Err(CoreError::shape_mismatch(&expected, dims));
        }
        let n: usize = shape.iter().product();
        if data.len() != D * n {
            return Err(CoreError::shape_mismatch(&[D * n], &[data.len()]));
        }
        let mut linear = 0;
        let u = GridArray::from_fn(shape, |_| {
            let v = Vector::<D>::from_fn(|c, _| data[c * n + linear]);
            linear += 1;
            v
        });
        Self::new(u, knots)
    }

    /// Build from one scalar array per component.
    pub fn from_components(components: [GridArray<f64, D>; D], knots: Knots<D>) -> Result<Self> {
        let shape = knots.shape();
        for component in &components {
            if component.shape() != shape {
                return Err(CoreError::shape_mismatch(&shape, &component.shape()));
            }
        }
        let n: usize = shape.iter().product();
        let data: Vec<Vector<D>> = (0..n)
            .map(|i| Vector::<D>::from_fn(|c, _| components[c][i]))
            .collect();
        Self::new(GridArray::new(shape, data)?, knots)
    }

    /// Zero displacement on the given knots, raw mode.
    pub fn identity(knots: Knots<D>) -> Self {
        let u = GridArray::filled(knots.shape(), Vector::<D>::zeros());
        Self {
            field: DisplacementField::Grid(u),
            knots,
        }
    }

    /// Switch to interpolating mode. A no-op if already interpolating.
    pub fn interpolate(self) -> Self {
        match self.field {
            DisplacementField::Interpolated(_) => self,
            DisplacementField::Grid(values) => Self {
                field: DisplacementField::Interpolated(InterpolatedField::new(values)),
                knots: self.knots,
            },
        }
    }

    pub fn is_interpolating(&self) -> bool {
        matches!(self.field, DisplacementField::Interpolated(_))
    }

    pub fn knots(&self) -> &Knots<D> {
        &self.knots
    }

    pub fn field(&self) -> &DisplacementField<D> {
        &self.field
    }

    /// Per-knot displacements, regardless of mode.
    pub fn displacements(&self) -> &GridArray<Vector<D>, D> {
        self.field.values()
    }

    pub fn into_displacements(self) -> GridArray<Vector<D>, D> {
        self.field.into_values()
    }

    /// Same knots, new displacements, raw mode.
    pub fn with_displacements(&self, u: GridArray<Vector<D>, D>) -> Result<Self> {
        Self::new(u, self.knots.clone())
    }

    /// Interpolating view of the field, or `InvalidState` in raw mode.
    pub fn interpolated(&self) -> Result<&InterpolatedField<D>> {
        match &self.field {
            DisplacementField::Interpolated(field) => Ok(field),
            DisplacementField::Grid(_) => Err(CoreError::invalid_state(
                "continuous evaluation requires an interpolating deformation",
            )),
        }
    }

    /// `u(x)` at an arbitrary point.
    pub fn displacement_at(&self, x: &Point<D>) -> Result<Vector<D>> {
        Ok(self.interpolated()?.displacement(&self.knots, x))
    }

    /// `∂u_i/∂x_j` at an arbitrary point.
    pub fn displacement_gradient_at(&self, x: &Point<D>) -> Result<Matrix<D>> {
        Ok(self.interpolated()?.gradient(&self.knots, x))
    }

    /// `ϕ(x) = x + u(x)`.
    pub fn evaluate(&self, x: &Point<D>) -> Result<Point<D>> {
        Ok(x + self.displacement_at(x)?)
    }

    /// `ϕ` at a knot, available in both modes.
    pub fn evaluate_on_grid(&self, index: [usize; D]) -> Result<Point<D>> {
        let u = self.displacements().get(index).ok_or_else(|| {
            CoreError::shape(format!("knot index {:?} outside grid {:?}", index, self.knots.shape()))
        })?;
        Ok(self.knots.point(index) + u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Point2, Vector2};

    fn knots() -> Knots<2> {
        Knots::new([vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 2.0]]).unwrap()
    }

    #[test]
    fn test_new_checks_shape() {
        let u = GridArray::filled([3, 2], Vector2::zeros());
        let err = GridDeformation::new(u, knots()).unwrap_err();
        assert!(err.is_shape_error());
    }

    #[test]
    fn test_raw_mode_rejects_point_evaluation() {
        let phi = GridDeformation::identity(knots());
        assert!(!phi.is_interpolating());
        let err = phi.evaluate(&Point2::new(0.5, 0.5)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert_eq!(phi.evaluate_on_grid([1, 2]).unwrap(), Point2::new(1.0, 2.0));
    }

    #[test]
    fn test_zero_field_is_identity() {
        let phi = GridDeformation::identity(knots()).interpolate();
        for x in [Point2::new(0.0, 0.0), Point2::new(1.3, 0.2), Point2::new(-2.0, 7.5)] {
            assert_eq!(phi.evaluate(&x).unwrap(), x);
        }
    }

    #[test]
    fn test_from_flat_planar_layout() {
        let knots = Knots::new([vec![0.0, 1.0], vec![0.0, 1.0, 2.0]]).unwrap();
        let data: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let phi = GridDeformation::from_flat(&[2, 2, 3], &data, knots.clone()).unwrap();
        assert_eq!(phi.displacements()[[0, 0]], Vector2::new(0.0, 6.0));
        assert_eq!(phi.displacements()[[1, 2]], Vector2::new(5.0, 11.0));
        assert!(GridDeformation::from_flat(&[2, 3, 2], &data, knots.clone()).is_err());
        assert!(GridDeformation::from_flat(&[2, 2, 3], &data[..11], knots).is_err());
    }

    #[test]
    fn test_from_components() {
        let shape = [3, 3];
        let ux = GridArray::filled(shape, 1.0);
        let uy = GridArray::from_fn(shape, |[i, _]| i as f64);
        let phi = GridDeformation::from_components([ux, uy], knots()).unwrap();
        assert_eq!(phi.displacements()[[2, 0]], Vector2::new(1.0, 2.0));

        let bad = [GridArray::filled([3, 3], 0.0), GridArray::filled([2, 3], 0.0)];
        assert!(GridDeformation::from_components(bad, knots()).is_err());
    }

    #[test]
    fn test_gradient_of_affine_field() {
        let knots = knots();
        let a = Matrix::<2>::new(0.1, -0.2, 0.3, 0.05);
        let u = GridArray::from_fn(knots.shape(), |index| a * knots.point(index));
        let phi = GridDeformation::new(u, knots).unwrap().interpolate();
        let g = phi.displacement_gradient_at(&Point2::new(0.7, 1.4)).unwrap();
        assert!((g - a).norm() < 1e-12);
    }
}
