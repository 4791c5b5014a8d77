//! Conjugate gradients over a matrix-free operator.

use burn::config::Config;
use nalgebra::DVector;
use crate::error::RegistrationError;

/// Symmetric positive-definite operator known only through its action.
pub trait LinearOperator {
    fn dimension(&self) -> usize;

    /// `A x`.
    fn apply(&self, x: &DVector<f64>) -> DVector<f64>;
}

/// Conjugate-gradient configuration.
#[derive(Config, Debug)]
pub struct CgConfig {
    /// Relative residual tolerance `‖r‖ / ‖b‖` (square root of machine epsilon).
    #[config(default = 1.49e-8)]
    pub tolerance: f64,
    /// Iteration cap; 0 means the problem dimension.
    #[config(default = 0)]
    pub max_iterations: usize,
}

/// Result of a conjugate-gradient solve.
#[derive(Debug, Clone)]
pub struct CgOutcome {
    pub solution: DVector<f64>,
    pub converged: bool,
    pub iterations: usize,
    /// Final `‖b - A x‖`.
    pub residual_norm: f64,
}

/// Solve `A x = b` starting from `x0` (zero when `None`).
pub fn conjugate_gradient<A>(
    operator: &A,
    b: &DVector<f64>,
    x0: Option<DVector<f64>>,
    config: &CgConfig,
) -> crate::error::Result<CgOutcome>
where
    A: LinearOperator + ?Sized,
{
    let n = operator.dimension();
    if b.len() != n {
        return Err(RegistrationError::dimension_mismatch(format!(
            "right-hand side has {} entries, operator dimension is {}",
            b.len(),
            n
        )));
    }
    let mut x = match x0 {
        Some(x0) if x0.len() != n => {
            return Err(RegistrationError::dimension_mismatch(format!(
                "initial guess has {} entries, operator dimension is {}",
                x0.len(),
                n
            )))
        }
        Some(x0) => x0,
        None => DVector::zeros(n),
    };
    let max_iterations = if config.max_iterations == 0 { n } else { config.max_iterations };

    let b_norm = b.norm();
    if b_norm == 0.0 {
        return Ok(CgOutcome {
            solution: DVector::zeros(n),
            converged: true,
            iterations: 0,
            residual_norm: 0.0,
        });
    }
    let threshold = config.tolerance * b_norm;

    let mut r = b - operator.apply(&x);
    let mut p = r.clone();
    let mut rs_old = r.norm_squared();
    let mut iterations = 0;

    while rs_old.sqrt() > threshold && iterations < max_iterations {
        let ap = operator.apply(&p);
        let curvature = p.dot(&ap);
        if !(curvature > 0.0) {
            tracing::warn!("CG met non-positive curvature {:.3e} at iteration {}", curvature, iterations);
            break;
        }
        let alpha = rs_old / curvature;
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &ap, 1.0);
        let rs_new = r.norm_squared();
        p = &r + (rs_new / rs_old) * p;
        rs_old = rs_new;
        iterations += 1;
    }

    let residual_norm = rs_old.sqrt();
    let converged = residual_norm <= threshold;
    tracing::debug!("CG finished after {} iterations, residual {:.3e}", iterations, residual_norm);
    Ok(CgOutcome {
        solution: x,
        converged,
        iterations,
        residual_norm,
    })
}
