//! Rigid transform built from a flat parameter vector.
//!
//! Parameters are the rotation angles followed by the translation:
//! `[θ, t0, t1]` in 2-D and `[α, β, γ, t0, t1, t2]` in 3-D. Angles `α, β, γ`
//! rotate about axes 0, 1 and 2 and combine as `R = R2(γ) R1(β) R0(α)`.
//! Points map as `T(x) = R(x - c) + c + t` around a fixed centre `c`.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use crate::error::{CoreError, Result};
use crate::spatial::Matrix;
use super::trait_::Transform;

/// Number of rotation angles for a dimensionality, if rigid transforms exist for it.
pub fn rotation_count(dim: usize) -> Option<usize> {
    match dim {
        2 => Some(1),
        3 => Some(3),
        _ => None,
    }
}

/// Total parameter count (angles then translation).
pub fn parameter_count<const D: usize>() -> Result<usize> {
    rotation_count(D)
        .map(|r| r + D)
        .ok_or_else(|| CoreError::precondition(format!("rigid transforms need 2 or 3 dimensions, got {}", D)))
}

/// Rotation matrix for the given angles, evaluated in `f64`.
pub fn rotation_matrix<const D: usize>(angles: &[f64]) -> Result<Matrix<D>> {
    let count = rotation_count(D)
        .ok_or_else(|| CoreError::precondition(format!("rigid transforms need 2 or 3 dimensions, got {}", D)))?;
    if angles.len() != count {
        return Err(CoreError::shape_mismatch(&[count], &[angles.len()]));
    }
    let rows: Vec<f64> = if D == 2 {
        let (s, c) = angles[0].sin_cos();
        vec![c, -s, s, c]
    } else {
        let (sx, cx) = angles[0].sin_cos();
        let (sy, cy) = angles[1].sin_cos();
        let (sz, cz) = angles[2].sin_cos();
        vec![
            cz * cy,
            cz * sy * sx - sz * cx,
            cz * sy * cx + sz * sx,
            sz * cy,
            sz * sy * sx + cz * cx,
            sz * sy * cx - cz * sx,
            -sy,
            cy * sx,
            cy * cx,
        ]
    };
    Ok(Matrix::<D>::from_row_slice(&rows))
}

/// Rigid Transform (Rotation + Translation) over tensors.
#[derive(Debug, Clone)]
pub struct RigidTransform<B: Backend, const D: usize> {
    rotation: Tensor<B, 2>,
    translation: Tensor<B, 1>,
    center: Tensor<B, 1>,
}

impl<B: Backend, const D: usize> RigidTransform<B, D> {
    /// Create a transform from a parameter tensor and rotation centre.
    ///
    /// # Arguments
    /// * `parameters` - Tensor of shape `[3]` (2-D) or `[6]` (3-D)
    /// * `center` - Tensor of shape `[D]`
    pub fn from_parameters(parameters: Tensor<B, 1>, center: Tensor<B, 1>) -> Result<Self> {
        let expected = parameter_count::<D>()?;
        let [len] = parameters.dims();
        if len != expected {
            return Err(CoreError::shape_mismatch(&[expected], &[len]));
        }
        let angles = rotation_count(D).unwrap_or(0);
        let rotation = Self::build_rotation_matrix(parameters.clone().slice([0..angles]));
        let translation = parameters.slice([angles..expected]);
        Ok(Self {
            rotation,
            translation,
            center,
        })
    }

    /// The `[D, D]` rotation matrix.
    pub fn rotation(&self) -> Tensor<B, 2> {
        self.rotation.clone()
    }

    pub fn translation(&self) -> Tensor<B, 1> {
        self.translation.clone()
    }

    pub fn center(&self) -> Tensor<B, 1> {
        self.center.clone()
    }

    fn build_rotation_matrix(r: Tensor<B, 1>) -> Tensor<B, 2> {
        if D == 3 {
            let alpha = r.clone().slice([0..1]);
            let beta = r.clone().slice([1..2]);
            let gamma = r.slice([2..3]);

            let cx = alpha.clone().cos();
            let sx = alpha.sin();
            let cy = beta.clone().cos();
            let sy = beta.sin();
            let cz = gamma.clone().cos();
            let sz = gamma.sin();

            let r11 = cz.clone().mul(cy.clone());
            let r12 = cz.clone().mul(sy.clone()).mul(sx.clone()).sub(sz.clone().mul(cx.clone()));
            let r13 = cz.clone().mul(sy.clone()).mul(cx.clone()).add(sz.clone().mul(sx.clone()));

            let r21 = sz.clone().mul(cy.clone());
            let r22 = sz.clone().mul(sy.clone()).mul(sx.clone()).add(cz.clone().mul(cx.clone()));
            let r23 = sz.mul(sy.clone()).mul(cx.clone()).sub(cz.mul(sx.clone()));

            let r31 = sy.neg();
            let r32 = cy.clone().mul(sx);
            let r33 = cy.mul(cx);

            let row1 = Tensor::cat(vec![r11, r12, r13], 0).reshape([1, 3]);
            let row2 = Tensor::cat(vec![r21, r22, r23], 0).reshape([1, 3]);
            let row3 = Tensor::cat(vec![r31, r32, r33], 0).reshape([1, 3]);
            Tensor::cat(vec![row1, row2, row3], 0)
        } else {
            let theta = r.slice([0..1]);
            let c = theta.clone().cos();
            let s = theta.sin();

            let row1 = Tensor::cat(vec![c.clone(), s.clone().neg()], 0).reshape([1, 2]);
            let row2 = Tensor::cat(vec![s, c], 0).reshape([1, 2]);
            Tensor::cat(vec![row1, row2], 0)
        }
    }
}

impl<B: Backend, const D: usize> Transform<B, D> for RigidTransform<B, D> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // Row vectors: y = (x - c) R^T + c + t
        let t = self.translation.clone().reshape([1, D]);
        let c = self.center.clone().reshape([1, D]);
        let centered = points - c.clone();
        centered.matmul(self.rotation.clone().transpose()) + c + t
    }
}
