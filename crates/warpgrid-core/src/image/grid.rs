use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use super::array::grid_indices;

/// Generate the pixel coordinates of an array shape as a tensor.
///
/// Returns a tensor of shape `[N, D]` where N is the number of pixels. Rows
/// follow `GridArray` storage order and column `d` holds the coordinate along
/// axis `d`, so a flattened image tensor lines up row for row.
///
/// # Arguments
/// * `shape` - The array shape `[n0, n1, ...]`
/// * `device` - The device to create the tensor on
pub fn grid_coordinates<B, const D: usize>(
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, 2>
where
    B: Backend,
{
    let total: usize = shape.iter().product();

    let grid: Vec<f32> = grid_indices(shape)
        .flat_map(|index| index.map(|i| i as f32))
        .collect();

    Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([total * D])), device)
        .reshape([total, D])
}
