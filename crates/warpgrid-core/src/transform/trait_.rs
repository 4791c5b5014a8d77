//! Transform trait for tensor-side coordinate mappings.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Maps batches of points, differentiably when `B` is an autodiff backend.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `D` - The spatial dimensionality
pub trait Transform<B: Backend, const D: usize> {
    /// Apply transform to a batch of points.
    ///
    /// # Arguments
    /// * `points` - Tensor of shape `[Batch, D]` containing the input points
    ///
    /// # Returns
    /// Tensor of shape `[Batch, D]` containing the transformed points
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}
