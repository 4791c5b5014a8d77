//! Regularization and data penalties, and their combination through a
//! prior deformation.

pub mod affine;
pub mod data;

pub use affine::AffinePenalty;
pub use data::data_penalty;

use serde::{Deserialize, Serialize};
use warpgrid_core::{Compose, GridArray, GridDeformation, Vector};
use crate::error::{RegistrationError, Result};
use crate::mismatch::BlockMismatch;

/// Penalty broken into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyParts {
    pub affine: f64,
    pub data: f64,
    pub total: f64,
}

/// Block-major flattening, `x[i D + d] = u[i][d]`.
pub fn flatten<const D: usize>(u: &GridArray<Vector<D>, D>) -> Vec<f64> {
    u.iter().flat_map(|v| v.iter().copied()).collect()
}

/// Inverse of [`flatten`].
pub fn unflatten<const D: usize>(shape: [usize; D], x: &[f64]) -> Result<GridArray<Vector<D>, D>> {
    let n: usize = shape.iter().product();
    if x.len() != n * D {
        return Err(RegistrationError::shape_mismatch(&[n * D], &[x.len()]));
    }
    let data = x.chunks_exact(D).map(Vector::<D>::from_column_slice).collect();
    Ok(GridArray::new(shape, data)?)
}

/// Penalty of `prior ∘ ϕ`.
///
/// When `gradient` is given it receives the gradient with respect to the
/// displacements of `ϕ`, chained through the composition Jacobian. This
/// requires `prior` to produce its result on the knots of `ϕ`.
pub fn total_penalty<P, M, const D: usize>(
    phi: &GridDeformation<D>,
    prior: &P,
    penalty: &AffinePenalty<D>,
    mismatch: &M,
    gradient: Option<&mut GridArray<Vector<D>, D>>,
) -> Result<PenaltyParts>
where
    P: Compose<D> + ?Sized,
    M: BlockMismatch<D> + ?Sized,
{
    let (composed, jacobian) = prior.compose_with_jacobian(phi)?;
    let u = composed.displacements();

    let Some(gradient) = gradient else {
        let affine = penalty.evaluate(u)?;
        let data = data_penalty(u, mismatch, None)?;
        return Ok(PenaltyParts {
            affine,
            data,
            total: affine + data,
        });
    };

    if composed.knots() != phi.knots() {
        return Err(RegistrationError::precondition(
            "the prior must share the knot grid of the deformation being optimized",
        ));
    }
    let mut affine_gradient = GridArray::filled(u.shape(), Vector::<D>::zeros());
    let affine = penalty.evaluate_with_gradient(u, &mut affine_gradient)?;
    let mut data_gradient = affine_gradient.clone();
    let data = data_penalty(u, mismatch, Some(&mut data_gradient))?;
    if gradient.shape() != u.shape() {
        return Err(RegistrationError::shape_mismatch(&u.shape(), &gradient.shape()));
    }
    for (i, g) in gradient.iter_mut().enumerate() {
        *g = jacobian[i].transpose() * (affine_gradient[i] + data_gradient[i]);
    }
    Ok(PenaltyParts {
        affine,
        data,
        total: affine + data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use warpgrid_core::spatial::{Matrix2, Vector2};
    use warpgrid_core::{IdentityTransform, Knots};
    use crate::mismatch::MismatchFits;

    fn setup() -> (Knots<2>, AffinePenalty<2>, MismatchFits<2>) {
        let knots = Knots::new([vec![0.0, 2.0, 4.0], vec![0.0, 2.0, 4.0]]).unwrap();
        let penalty = AffinePenalty::new(&knots, 0.7).unwrap();
        let cs = GridArray::from_fn([3, 3], |[i, j]| Vector2::new((i + j) as f64 * 0.2, (i * j) as f64 * 0.1));
        let qs = GridArray::filled([3, 3], Matrix2::new(1.0, 0.2, 0.2, 0.5));
        (knots, penalty, MismatchFits::new(cs, qs, [2, 2]).unwrap())
    }

    #[test]
    fn test_flatten_round_trip() {
        let u = GridArray::from_fn([2, 3], |[i, j]| Vector2::new(i as f64, j as f64));
        let x = flatten(&u);
        assert_eq!(&x[..4], &[0.0, 0.0, 0.0, 1.0]);
        assert_eq!(unflatten([2, 3], &x).unwrap(), u);
        assert!(unflatten([2, 2], &x).is_err());
    }

    #[test]
    fn test_identity_prior_parts() {
        let (knots, penalty, fits) = setup();
        let u = GridArray::from_fn([3, 3], |[i, j]| Vector2::new(i as f64 * 0.3, -(j as f64) * 0.1));
        let phi = GridDeformation::new(u.clone(), knots).unwrap();
        let parts = total_penalty(&phi, &IdentityTransform, &penalty, &fits, None).unwrap();
        assert!((parts.affine - penalty.evaluate(&u).unwrap()).abs() < 1e-12);
        assert!((parts.data - data_penalty(&u, &fits, None).unwrap()).abs() < 1e-12);
        assert_eq!(parts.total, parts.affine + parts.data);
    }

    #[test]
    fn test_gradient_through_prior_matches_finite_differences() {
        let (knots, penalty, fits) = setup();
        let prior_u = GridArray::from_fn([3, 3], |[i, j]| Vector2::new(0.1 * (i * j) as f64, 0.2 - 0.05 * i as f64));
        let prior = GridDeformation::new(prior_u, knots.clone()).unwrap().interpolate();
        let u = GridArray::from_fn([3, 3], |[i, j]| Vector2::new(0.3 + 0.1 * j as f64, -0.25 + 0.07 * i as f64));
        let phi = GridDeformation::new(u.clone(), knots).unwrap();

        let mut g = GridArray::filled([3, 3], Vector2::zeros());
        total_penalty(&phi, &prior, &penalty, &fits, Some(&mut g)).unwrap();

        let h = 1e-6;
        for index in [[0, 0], [1, 1], [2, 1]] {
            for d in 0..2 {
                let mut plus = u.clone();
                plus[index][d] += h;
                let mut minus = u.clone();
                minus[index][d] -= h;
                let f = |v: GridArray<Vector2, 2>| {
                    let phi = phi.with_displacements(v).unwrap();
                    total_penalty(&phi, &prior, &penalty, &fits, None).unwrap().total
                };
                let fd = (f(plus) - f(minus)) / (2.0 * h);
                assert!((fd - g[index][d]).abs() < 1e-5, "{} vs {}", fd, g[index][d]);
            }
        }
    }
}
