//! Tensor interpolation trait used by differentiable objectives.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Samples a tensor at continuous coordinates.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Interpolator<B: Backend> {
    /// Interpolate values of `data` at `points`.
    ///
    /// # Arguments
    /// * `data` - The sampled array, axis `d` matching coordinate column `d`
    /// * `points` - Continuous coordinates `[Batch, D]`
    ///
    /// # Returns
    /// Tensor of sampled values `[Batch]`
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, points: Tensor<B, 2>) -> Tensor<B, 1>;
}
