//! Multilinear tensor interpolation.
//!
//! Works for any rank: the `2^D` corner values are gathered from the
//! flattened data and blended with weights derived from the fractional
//! coordinates, so gradients flow back to the sampling points.

use burn::tensor::{Int, Tensor};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use super::trait_::Interpolator;

/// Linear Interpolator.
///
/// Coordinates outside the array are clamped to the border.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    /// Create a new linear interpolator.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, points: Tensor<B, 2>) -> Tensor<B, 1> {
        let dims = data.dims();
        let batch_size = points.dims()[0];
        let device = points.device();

        // Row-major strides, last axis fastest
        let mut strides = [1i32; D];
        for d in (0..D.saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * dims[d + 1] as i32;
        }
        let total: usize = dims.iter().product();
        let flat_data = data.clone().reshape([total]);

        let mut lower: Vec<Tensor<B, 1, Int>> = Vec::with_capacity(D);
        let mut upper: Vec<Tensor<B, 1, Int>> = Vec::with_capacity(D);
        let mut weights: Vec<Tensor<B, 1>> = Vec::with_capacity(D);
        for d in 0..D {
            let x = points.clone().narrow(1, d, 1).squeeze::<1>(1);
            let x0 = x.clone().floor();
            let upper_bound = (dims[d] - 1) as f64;
            weights.push(x - x0.clone());
            upper.push((x0.clone() + 1.0).clamp(0.0, upper_bound).int());
            lower.push(x0.clamp(0.0, upper_bound).int());
        }

        let one = Tensor::<B, 1>::ones([batch_size], &device);
        let mut result = Tensor::<B, 1>::zeros([batch_size], &device);
        for corner in 0..(1usize << D) {
            let mut idx = Tensor::<B, 1, Int>::zeros([batch_size], &device);
            let mut weight = one.clone();
            for d in 0..D {
                if (corner >> d) & 1 == 1 {
                    idx = idx + upper[d].clone() * strides[d];
                    weight = weight * weights[d].clone();
                } else {
                    idx = idx + lower[d].clone() * strides[d];
                    weight = weight * (one.clone() - weights[d].clone());
                }
            }
            result = result + flat_data.clone().gather(0, idx) * weight;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_linear_interpolation_2d() {
        let device = Default::default();
        // data[i][j] = 10 i + j
        let data = Tensor::<B, 2>::from_data(
            TensorData::new(vec![0.0, 1.0, 10.0, 11.0], [2, 2]),
            &device,
        );
        let points = Tensor::<B, 2>::from_data(
            TensorData::new(vec![0.0, 0.0, 1.0, 0.0, 0.5, 0.5], [3, 2]),
            &device,
        );

        let result = LinearInterpolator::new().interpolate(&data, points);
        let values = result.into_data();
        let values = values.as_slice::<f32>().unwrap();

        assert!((values[0] - 0.0).abs() < 1e-5);
        assert!((values[1] - 10.0).abs() < 1e-5);
        assert!((values[2] - 5.5).abs() < 1e-5);
    }

    #[test]
    fn test_linear_interpolation_3d_axis_order() {
        let device = Default::default();
        // data[i][j][k] = 100 i + 10 j + k on a 2x2x2 cube
        let mut raw = Vec::new();
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    raw.push((100 * i + 10 * j + k) as f32);
                }
            }
        }
        let data = Tensor::<B, 3>::from_data(TensorData::new(raw, [2, 2, 2]), &device);
        let points = Tensor::<B, 2>::from_data(
            TensorData::new(vec![1.0f32, 0.0, 0.0, 0.5, 0.5, 0.5], [2, 3]),
            &device,
        );

        let result = LinearInterpolator::new().interpolate(&data, points);
        let values = result.into_data();
        let values = values.as_slice::<f32>().unwrap();

        assert!((values[0] - 100.0).abs() < 1e-4);
        assert!((values[1] - 55.5).abs() < 1e-4);
    }
}
