//! Validation utilities for registration inputs.
//!
//! These checks run at the entry points and turn malformed inputs into
//! errors before any solve starts.

use warpgrid_core::GridArray;
use crate::error::{RegistrationError, Result};
use crate::mismatch::{BlockMismatch, MismatchFits};

/// Relative tolerance of the symmetry check on fit matrices.
const SYMMETRY_TOLERANCE: f64 = 1e-8;

/// Validate a regularization weight range `0 < λmin <= λmax < ∞`.
pub fn validate_lambda_range(lambda_min: f64, lambda_max: f64) -> Result<()> {
    if !(lambda_min > 0.0 && lambda_min.is_finite()) {
        return Err(RegistrationError::invalid_configuration(format!(
            "λmin must be positive and finite, got {}",
            lambda_min
        )));
    }
    if !(lambda_max >= lambda_min && lambda_max.is_finite()) {
        return Err(RegistrationError::invalid_configuration(format!(
            "λmax must be finite and at least λmin = {}, got {}",
            lambda_min, lambda_max
        )));
    }
    Ok(())
}

/// Validate per-axis shift limits.
pub fn validate_max_shift<const D: usize>(max_shift: &[usize; D]) -> Result<()> {
    if max_shift.iter().any(|&m| m == 0) {
        return Err(RegistrationError::invalid_configuration(format!(
            "max_shift must be at least 1 on every axis, got {:?}",
            max_shift
        )));
    }
    Ok(())
}

/// Validate mismatch fits against the knot grid shape.
///
/// Centres must be finite; matrices must be finite, symmetric and have a
/// non-negative diagonal.
pub fn validate_fits<const D: usize>(fits: &MismatchFits<D>, grid_shape: [usize; D]) -> Result<()> {
    if fits.grid_shape() != grid_shape {
        return Err(RegistrationError::shape_mismatch(&grid_shape, &fits.grid_shape()));
    }
    validate_max_shift(&fits.max_shift())?;

    if let Some(block) = fits.cs().iter().position(|c| c.iter().any(|v| !v.is_finite())) {
        return Err(RegistrationError::numerical_instability(format!(
            "fit centre of block {} is not finite",
            block
        )));
    }
    for (block, q) in fits.qs().iter().enumerate() {
        if q.iter().any(|v| !v.is_finite()) {
            return Err(RegistrationError::numerical_instability(format!(
                "fit matrix of block {} is not finite",
                block
            )));
        }
        let scale = q.amax().max(1.0);
        if (q - q.transpose()).amax() > SYMMETRY_TOLERANCE * scale {
            return Err(RegistrationError::invalid_configuration(format!(
                "fit matrix of block {} is not symmetric",
                block
            )));
        }
        if q.diagonal().iter().any(|&v| v < 0.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "fit matrix of block {} has a negative diagonal entry",
                block
            )));
        }
    }
    Ok(())
}

/// Validate that two images have the same shape.
pub fn validate_image_shapes<const D: usize>(fixed: &GridArray<f64, D>, moving: &GridArray<f64, D>) -> Result<()> {
    if fixed.shape() != moving.shape() {
        return Err(RegistrationError::shape_mismatch(&fixed.shape(), &moving.shape()));
    }
    if fixed.iter().chain(moving.iter()).any(|v| !v.is_finite()) {
        return Err(RegistrationError::numerical_instability("images must hold finite intensities"));
    }
    Ok(())
}
