//! Globally optimal initial guess from the quadratic mismatch fits.
//!
//! Minimizing `λ · affine-penalty(u) + Σ_i (u_i - c_i)ᵀ Q_i (u_i - c_i)` is a
//! linear problem `H u = b` with `b_i = Q_i c_i`. [`AffineQHessian`] applies
//! `H` without forming it, and conjugate gradients solve the system.

use nalgebra::DVector;
use warpgrid_core::{GridArray, Matrix, Vector};
use crate::error::{RegistrationError, Result};
use crate::mismatch::{BlockMismatch, MismatchFits};
use crate::penalty::{flatten, unflatten, AffinePenalty};
use crate::solver::{conjugate_gradient, CgConfig, LinearOperator};

/// Relative diagonal shift `cbrt(ε)`, also the absolute shift when every fit
/// matrix is zero.
pub fn stabilizer_scale() -> f64 {
    f64::EPSILON.cbrt()
}

/// Matrix-free `λ (I - P) + blockdiag(Q_i) + δ I`.
///
/// `δ = cbrt(ε) · trace(Σ_i Q_i) / n` keeps the operator positive definite
/// when `λ` and the fits are degenerate.
#[derive(Debug, Clone, Copy)]
pub struct AffineQHessian<'a, const D: usize> {
    penalty: &'a AffinePenalty<D>,
    qs: &'a GridArray<Matrix<D>, D>,
    stabilizer: f64,
}

impl<'a, const D: usize> AffineQHessian<'a, D> {
    pub fn new(penalty: &'a AffinePenalty<D>, qs: &'a GridArray<Matrix<D>, D>) -> Result<Self> {
        if qs.shape() != penalty.grid_shape() {
            return Err(RegistrationError::shape_mismatch(&penalty.grid_shape(), &qs.shape()));
        }
        let trace: f64 = qs.iter().map(|q| q.trace()).sum();
        let stabilizer = if trace > 0.0 {
            stabilizer_scale() * trace / qs.len() as f64
        } else {
            stabilizer_scale()
        };
        Ok(Self {
            penalty,
            qs,
            stabilizer,
        })
    }

    pub fn stabilizer(&self) -> f64 {
        self.stabilizer
    }
}

impl<'a, const D: usize> LinearOperator for AffineQHessian<'a, D> {
    fn dimension(&self) -> usize {
        self.qs.len() * D
    }

    fn apply(&self, x: &DVector<f64>) -> DVector<f64> {
        // Gradient of the penalty at weight λ n / 2 is λ (x - P x)
        let residual = self.penalty.residual(x.as_slice());
        let lambda = self.penalty.lambda();
        let mut y = DVector::zeros(x.len());
        for (i, q) in self.qs.iter().enumerate() {
            let xi = Vector::<D>::from_fn(|d, _| x[i * D + d]);
            let qx = q * xi;
            for d in 0..D {
                y[i * D + d] = lambda * residual[(i, d)] + qx[d] + self.stabilizer * xi[d];
            }
        }
        y
    }
}

/// Solution of the initial-guess system.
#[derive(Debug, Clone)]
pub struct InitialGuess<const D: usize> {
    pub displacements: GridArray<Vector<D>, D>,
    pub converged: bool,
    pub iterations: usize,
}

/// Solve `H u = b` for the displacements minimizing the quadratic model.
///
/// Non-convergence is logged and the last iterate returned.
pub fn initial_deformation<const D: usize>(
    penalty: &AffinePenalty<D>,
    fits: &MismatchFits<D>,
    config: &CgConfig,
) -> Result<InitialGuess<D>> {
    let hessian = AffineQHessian::new(penalty, fits.qs())?;
    if fits.grid_shape() != penalty.grid_shape() {
        return Err(RegistrationError::shape_mismatch(&penalty.grid_shape(), &fits.grid_shape()));
    }
    let b: GridArray<Vector<D>, D> = GridArray::new(
        fits.grid_shape(),
        fits.qs().iter().zip(fits.cs().iter()).map(|(q, c)| q * c).collect(),
    )?;
    let outcome = conjugate_gradient(&hessian, &DVector::from_vec(flatten(&b)), None, config)?;
    if !outcome.converged {
        tracing::warn!(
            "Initial guess did not converge after {} CG iterations (residual {:.3e})",
            outcome.iterations,
            outcome.residual_norm
        );
    }
    Ok(InitialGuess {
        displacements: unflatten(fits.grid_shape(), outcome.solution.as_slice())?,
        converged: outcome.converged,
        iterations: outcome.iterations,
    })
}

/// Clamp every component into `[-bound_d, bound_d]`.
pub fn clamp_displacements<const D: usize>(u: &GridArray<Vector<D>, D>, bound: &[f64; D]) -> GridArray<Vector<D>, D> {
    u.map(|v| Vector::<D>::from_fn(|d, _| v[d].clamp(-bound[d], bound[d])))
}
