//! Composition of deformations.
//!
//! `old.compose(new)` is `ϕ_old ∘ ϕ_new` sampled on the knots of `ϕ_old`:
//! with `dx = u_new(x)`, the composed displacement is `dx + u_old(x + dx)`.

use crate::error::{CoreError, Result};
use crate::image::{grid_indices, GridArray};
use crate::spatial::Matrix;
use super::deformation::GridDeformation;

/// Deformations that can be composed with a [`GridDeformation`].
pub trait Compose<const D: usize> {
    /// Compose `self ∘ new` and return the per-knot Jacobian of the composed
    /// displacement with respect to the displacements of `new`.
    fn compose_with_jacobian(
        &self,
        new: &GridDeformation<D>,
    ) -> Result<(GridDeformation<D>, GridArray<Matrix<D>, D>)>;

    /// Compose `self ∘ new`.
    fn compose(&self, new: &GridDeformation<D>) -> Result<GridDeformation<D>> {
        Ok(self.compose_with_jacobian(new)?.0)
    }
}

/// The identity map, neutral under composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityTransform;

impl<const D: usize> Compose<D> for IdentityTransform {
    fn compose_with_jacobian(
        &self,
        new: &GridDeformation<D>,
    ) -> Result<(GridDeformation<D>, GridArray<Matrix<D>, D>)> {
        let jacobian = GridArray::filled(new.knots().shape(), Matrix::<D>::identity());
        Ok((new.clone(), jacobian))
    }
}

impl<const D: usize> Compose<D> for GridDeformation<D> {
    fn compose_with_jacobian(
        &self,
        new: &GridDeformation<D>,
    ) -> Result<(GridDeformation<D>, GridArray<Matrix<D>, D>)> {
        let old = self.interpolated().map_err(|_| {
            CoreError::invalid_state("the outer deformation of a composition must be interpolating")
        })?;
        let knots = self.knots();
        let shared_grid = new.knots() == knots;
        if !shared_grid && !new.is_interpolating() {
            return Err(CoreError::invalid_state(
                "the inner deformation must be interpolating when the knot grids differ",
            ));
        }

        let shape = knots.shape();
        let n: usize = shape.iter().product();
        let mut displacements = Vec::with_capacity(n);
        let mut jacobians = Vec::with_capacity(n);
        for index in grid_indices(shape) {
            let x = knots.point(index);
            let dx = if shared_grid {
                new.displacements()[index]
            } else {
                new.displacement_at(&x)?
            };
            let y = x + dx;
            displacements.push(dx + old.displacement(knots, &y));
            jacobians.push(Matrix::<D>::identity() + old.gradient(knots, &y));
        }

        let composed = GridDeformation::new(GridArray::new(shape, displacements)?, knots.clone())?;
        Ok((composed, GridArray::new(shape, jacobians)?))
    }
}
