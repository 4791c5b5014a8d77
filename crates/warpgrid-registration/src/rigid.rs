//! Rigid pre-registration.
//!
//! Finds the rotation and translation `T` minimizing the normalized
//! intensity mismatch
//!
//! ```text
//! Σ_overlap (f - m∘T)² / Σ_overlap (f² + (m∘T)²)
//! ```
//!
//! where the overlap is the set of fixed pixels whose image under `T` lands
//! inside the moving array. The objective is written as burn tensor code and
//! differentiated with autodiff; the parameters are solved for with the same
//! bound-constrained solver as the deformable refinement.

use burn::config::Config;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use warpgrid_core::image::grid::grid_coordinates;
use warpgrid_core::interpolation::{Interpolator, LinearInterpolator};
use warpgrid_core::transform::rigid::{parameter_count, rotation_count, rotation_matrix};
use warpgrid_core::transform::{RigidTransform, Transform};
use warpgrid_core::{GridArray, Matrix, Vector};
use crate::error::RegistrationError;
use crate::gradient::{backward_gradient, params_tensor, GradientProblem, GradientProvider};
use crate::solver::{Bounds, NlpSolver, SolveOptions, SolverStatus};
use crate::validation::validate_image_shapes;

/// Rigid pre-registration settings.
#[derive(Config, Debug)]
pub struct RigidConfig {
    /// Transforms whose overlap energy, as a fraction of the energy of both
    /// images, falls below this get an infinite penalty.
    #[config(default = 0.0)]
    pub overlap_threshold: f64,
}

/// Result of [`optimize_rigid`].
#[derive(Debug, Clone)]
pub struct RigidRegistration<const D: usize> {
    /// Angles followed by the translation.
    pub parameters: Vec<f64>,
    pub rotation: Matrix<D>,
    pub translation: Vector<D>,
    /// Objective value at `parameters`.
    pub penalty: f64,
    pub status: SolverStatus,
}

/// Normalized mismatch between a fixed image and a rigidly moved image.
pub struct RigidObjective<B: AutodiffBackend, const D: usize> {
    fixed: Tensor<B, 1>,
    moving: Tensor<B, D>,
    coordinates: Tensor<B, 2>,
    center: Tensor<B, 1>,
    shape: [usize; D],
    total_energy: f64,
    overlap_threshold: f64,
    device: B::Device,
}

impl<B: AutodiffBackend, const D: usize> RigidObjective<B, D> {
    /// Rotations are about the array centre `(n - 1) / 2`.
    pub fn new(
        fixed: &GridArray<f64, D>,
        moving: &GridArray<f64, D>,
        overlap_threshold: f64,
        device: &B::Device,
    ) -> crate::error::Result<Self> {
        parameter_count::<D>()?;
        validate_image_shapes(fixed, moving)?;
        if !(0.0..=1.0).contains(&overlap_threshold) {
            return Err(RegistrationError::invalid_configuration(format!(
                "overlap_threshold must lie in [0, 1], got {}",
                overlap_threshold
            )));
        }
        let total_energy: f64 = fixed.iter().chain(moving.iter()).map(|v| v * v).sum();
        if !(total_energy > 0.0) {
            return Err(RegistrationError::precondition("rigid registration of two all-zero images"));
        }

        let shape = fixed.shape();
        let n = fixed.len();
        let center: Vec<f64> = shape.iter().map(|&s| (s as f64 - 1.0) / 2.0).collect();
        Ok(Self {
            fixed: Tensor::from_data(TensorData::new(fixed.as_slice().to_vec(), [n]), device),
            moving: Tensor::<B, 1>::from_data(TensorData::new(moving.as_slice().to_vec(), [n]), device).reshape(shape),
            coordinates: grid_coordinates::<B, D>(shape, device),
            center: Tensor::from_data(TensorData::new(center, [D]), device),
            shape,
            total_energy,
            overlap_threshold,
            device: device.clone(),
        })
    }

    /// 1 where the mapped coordinate lies inside the moving array.
    fn overlap_mask(&self, mapped: &Tensor<B, 2>) -> Tensor<B, 1> {
        let [n, _] = mapped.dims();
        let mut mask = Tensor::<B, 1>::ones([n], &self.device);
        for d in 0..D {
            let x = mapped.clone().narrow(1, d, 1).squeeze::<1>(1);
            let upper = (self.shape[d] - 1) as f64;
            mask = mask
                * x.clone().greater_equal_elem(0.0).float()
                * x.lower_equal_elem(upper).float();
        }
        mask
    }
}

impl<B: AutodiffBackend, const D: usize> GradientProvider for RigidObjective<B, D> {
    fn dimension(&self) -> usize {
        rotation_count(D).map_or(0, |r| r + D)
    }

    fn value_and_gradient(&self, x: &[f64]) -> crate::error::Result<(f64, Vec<f64>)> {
        let params = params_tensor::<B>(x, &self.device);
        let transform = RigidTransform::<B, D>::from_parameters(params.clone(), self.center.clone())?;
        let mapped = transform.transform_points(self.coordinates.clone());
        let mask = self.overlap_mask(&mapped);
        let warped = LinearInterpolator::new().interpolate(&self.moving, mapped);

        let diff = self.fixed.clone() - warped.clone();
        let energy = (mask.clone() * (self.fixed.clone().powf_scalar(2.0) + warped.powf_scalar(2.0))).sum();
        let overlap = energy.clone().into_scalar().elem::<f64>();
        if !(overlap > 0.0) || overlap / self.total_energy < self.overlap_threshold {
            return Ok((f64::INFINITY, vec![0.0; x.len()]));
        }
        let mismatch = (mask * diff.powf_scalar(2.0)).sum();
        backward_gradient(mismatch / energy, &params)
    }
}

/// Rigidly align `moving` to `fixed`.
///
/// Angles are bounded by ±π and translations by `±max_shift`. The search
/// starts at the identity.
pub fn optimize_rigid<B, S, const D: usize>(
    fixed: &GridArray<f64, D>,
    moving: &GridArray<f64, D>,
    max_shift: [f64; D],
    solver: &S,
    config: &RigidConfig,
    device: &B::Device,
) -> crate::error::Result<RigidRegistration<D>>
where
    B: AutodiffBackend,
    S: NlpSolver,
{
    if max_shift.iter().any(|&m| !(m > 0.0 && m.is_finite())) {
        return Err(RegistrationError::invalid_configuration(format!(
            "max_shift must be positive and finite, got {:?}",
            max_shift
        )));
    }
    let objective = RigidObjective::<B, D>::new(fixed, moving, config.overlap_threshold, device)?;
    let angles = objective.dimension() - D;
    let radius: Vec<f64> = std::iter::repeat(std::f64::consts::PI)
        .take(angles)
        .chain(max_shift.iter().copied())
        .collect();
    let bounds = Bounds::symmetric(&radius)?;
    let x0 = vec![0.0; radius.len()];

    let problem = GradientProblem::new(objective);
    let solution = solver.optimize(&problem, &bounds, &x0, &SolveOptions::default())?;
    if !solution.status().is_optimal() {
        tracing::warn!(
            "Rigid registration ended with status {:?} after {} iterations",
            solution.status(),
            solution.iterations()
        );
    }
    let parameters = solution.solution().to_vec();
    let rotation = rotation_matrix::<D>(&parameters[..angles])?;
    let translation = Vector::<D>::from_column_slice(&parameters[angles..]);
    tracing::info!(
        "Rigid registration: penalty {:.6e}, translation {:?}",
        solution.objective(),
        translation.as_slice()
    );
    Ok(RigidRegistration {
        parameters,
        rotation,
        translation,
        penalty: solution.objective(),
        status: solution.status(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    type B = Autodiff<NdArray<f32>>;

    fn blob(shape: [usize; 2], center: [f64; 2], sigma: f64) -> GridArray<f64, 2> {
        GridArray::from_fn(shape, |[i, j]| {
            let r2 = (i as f64 - center[0]).powi(2) + (j as f64 - center[1]).powi(2);
            (-r2 / (2.0 * sigma * sigma)).exp()
        })
    }

    #[test]
    fn test_identity_has_zero_penalty() {
        let image = blob([15, 15], [7.0, 7.0], 2.5);
        let objective = RigidObjective::<B, 2>::new(&image, &image, 0.0, &Default::default()).unwrap();
        let (value, gradient) = objective.value_and_gradient(&[0.0, 0.0, 0.0]).unwrap();
        assert!(value.abs() < 1e-6);
        assert!(gradient.iter().all(|g| g.abs() < 1e-3));
    }

    #[test]
    fn test_no_overlap_is_infinite() {
        let image = blob([9, 9], [4.0, 4.0], 2.0);
        let objective = RigidObjective::<B, 2>::new(&image, &image, 0.0, &Default::default()).unwrap();
        let (value, gradient) = objective.value_and_gradient(&[0.0, 50.0, 50.0]).unwrap();
        assert!(value.is_infinite());
        assert_eq!(gradient, vec![0.0; 3]);

        let strict = RigidObjective::<B, 2>::new(&image, &image, 0.95, &Default::default()).unwrap();
        assert!(strict.value_and_gradient(&[0.0, 3.0, 0.0]).unwrap().0.is_infinite());
    }

    #[test]
    fn test_rejects_bad_input() {
        let a = blob([9, 9], [4.0, 4.0], 2.0);
        let b = blob([9, 8], [4.0, 4.0], 2.0);
        let device = Default::default();
        assert!(RigidObjective::<B, 2>::new(&a, &b, 0.0, &device).is_err());
        assert!(RigidObjective::<B, 2>::new(&a, &a, 1.5, &device).is_err());
        let zero = GridArray::filled([4, 4], 0.0);
        assert!(matches!(
            RigidObjective::<B, 2>::new(&zero, &zero, 0.0, &device),
            Err(err) if err.is_precondition()
        ));
        let line = GridArray::filled([4], 1.0);
        assert!(matches!(
            RigidObjective::<B, 1>::new(&line, &line, 0.0, &device),
            Err(err) if err.is_precondition()
        ));
    }
}
