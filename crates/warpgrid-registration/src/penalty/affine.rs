//! Affine-deviation penalty.
//!
//! Measures how far a displacement field is from the best-fitting single
//! affine map of the knot coordinates. The affine functions on the knot grid
//! span the columns of `[x_0 .. x_{D-1}, 1]`; an orthonormal basis `F` of
//! that span is computed once by QR, and the projection is `P = F Fᵀ`.
//!
//! Value `λ/n Σ_i ‖u_i - (P u)_i‖²`, gradient `2λ/n (u - P u)`.

use nalgebra::DMatrix;
use warpgrid_core::{GridArray, Knots, Vector};
use crate::error::{RegistrationError, Result};

/// Affine-deviation regularizer with weight `λ`.
///
/// Evaluation never mutates the penalty, so one instance can be shared by
/// concurrent readers; use [`AffinePenalty::with_lambda`] for per-task weights.
#[derive(Debug, Clone)]
pub struct AffinePenalty<const D: usize> {
    lambda: f64,
    basis: DMatrix<f64>,
    shape: [usize; D],
}

impl<const D: usize> AffinePenalty<D> {
    pub fn new(knots: &Knots<D>, lambda: f64) -> Result<Self> {
        if !(lambda.is_finite() && lambda >= 0.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "λ must be finite and non-negative, got {}",
                lambda
            )));
        }
        let points = knots.points();
        let n = points.len();
        let design = DMatrix::<f64>::from_fn(n, D + 1, |i, j| if j < D { points[i][j] } else { 1.0 });
        let basis = design.qr().q();
        Ok(Self {
            lambda,
            basis,
            shape: knots.shape(),
        })
    }

    /// Get the regularization weight.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Set the regularization weight.
    pub fn set_lambda(&mut self, lambda: f64) {
        self.lambda = lambda;
    }

    /// Copy with a different weight.
    pub fn with_lambda(&self, lambda: f64) -> Self {
        Self {
            lambda,
            ..self.clone()
        }
    }

    /// Knot-grid shape the penalty was built for.
    pub fn grid_shape(&self) -> [usize; D] {
        self.shape
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.basis.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.basis.nrows() == 0
    }

    /// `x - P x` for a block-major flattened field `x[i D + d]`.
    pub fn residual(&self, x: &[f64]) -> DMatrix<f64> {
        let u = DMatrix::<f64>::from_row_slice(self.len(), D, x);
        let fitted = &self.basis * (self.basis.transpose() * &u);
        u - fitted
    }

    pub fn evaluate(&self, u: &GridArray<Vector<D>, D>) -> Result<f64> {
        self.penalty_with_lambda(u, self.lambda, None)
    }

    /// Value, writing the gradient into `gradient`.
    pub fn evaluate_with_gradient(
        &self,
        u: &GridArray<Vector<D>, D>,
        gradient: &mut GridArray<Vector<D>, D>,
    ) -> Result<f64> {
        self.penalty_with_lambda(u, self.lambda, Some(gradient))
    }

    /// Penalty at an explicit weight, leaving `self` untouched.
    pub fn penalty_with_lambda(
        &self,
        u: &GridArray<Vector<D>, D>,
        lambda: f64,
        gradient: Option<&mut GridArray<Vector<D>, D>>,
    ) -> Result<f64> {
        if u.shape() != self.shape {
            return Err(RegistrationError::shape_mismatch(&self.shape, &u.shape()));
        }
        let x = super::flatten(u);
        let residual = self.residual(&x);
        let n = self.len() as f64;
        if let Some(gradient) = gradient {
            if gradient.shape() != self.shape {
                return Err(RegistrationError::shape_mismatch(&self.shape, &gradient.shape()));
            }
            let scale = 2.0 * lambda / n;
            for (i, g) in gradient.iter_mut().enumerate() {
                *g = Vector::<D>::from_fn(|d, _| scale * residual[(i, d)]);
            }
        }
        Ok(lambda / n * residual.norm_squared())
    }
}
