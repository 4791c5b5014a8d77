//! Continuous samplers over pixel arrays.

use crate::image::GridArray;
use crate::spatial::Point;

/// Answers intensity queries at fractional pixel coordinates.
///
/// Queries outside the domain return `f64::NAN` rather than failing.
pub trait ContinuousSampler<const D: usize> {
    /// Shape of the sampled domain.
    fn shape(&self) -> [usize; D];

    /// Intensity at `x`, or `NaN` when `x` lies outside the domain.
    fn sample(&self, x: &Point<D>) -> f64;
}

/// Multilinear sampler over a pixel array with unit spacing.
#[derive(Debug, Clone, Copy)]
pub struct LinearSampler<'a, const D: usize> {
    image: &'a GridArray<f64, D>,
}

impl<'a, const D: usize> LinearSampler<'a, D> {
    pub fn new(image: &'a GridArray<f64, D>) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &'a GridArray<f64, D> {
        self.image
    }
}

impl<'a, const D: usize> ContinuousSampler<D> for LinearSampler<'a, D> {
    fn shape(&self) -> [usize; D] {
        self.image.shape()
    }

    fn sample(&self, x: &Point<D>) -> f64 {
        let shape = self.image.shape();
        let mut base = [0usize; D];
        let mut frac = [0.0f64; D];
        for d in 0..D {
            let upper = shape[d] as f64 - 1.0;
            // Also rejects NaN coordinates
            if !(x[d] >= 0.0 && x[d] <= upper) {
                return f64::NAN;
            }
            if shape[d] == 1 {
                continue;
            }
            let cell = (x[d].floor() as usize).min(shape[d] - 2);
            base[d] = cell;
            frac[d] = x[d] - cell as f64;
        }

        let mut acc = 0.0;
        for corner in 0..(1usize << D) {
            let mut weight = 1.0;
            let mut index = base;
            for d in 0..D {
                if (corner >> d) & 1 == 1 {
                    weight *= frac[d];
                    index[d] += 1;
                } else {
                    weight *= 1.0 - frac[d];
                }
            }
            if weight != 0.0 {
                acc += weight * self.image[index];
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Point2;

    #[test]
    fn test_exact_at_integer_coordinates() {
        let image = GridArray::from_fn([3, 4], |[i, j]| (i * 7 + j * j) as f64);
        let sampler = LinearSampler::new(&image);
        for index in image.indices() {
            let x = Point2::new(index[0] as f64, index[1] as f64);
            assert_eq!(sampler.sample(&x), image[index]);
        }
    }

    #[test]
    fn test_outside_domain_is_nan() {
        let image = GridArray::filled([3, 3], 1.0);
        let sampler = LinearSampler::new(&image);
        assert!(sampler.sample(&Point2::new(-0.01, 1.0)).is_nan());
        assert!(sampler.sample(&Point2::new(1.0, 2.01)).is_nan());
        assert!(sampler.sample(&Point2::new(f64::NAN, 1.0)).is_nan());
        assert_eq!(sampler.sample(&Point2::new(2.0, 2.0)), 1.0);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let image = GridArray::new([2, 2], vec![0.0, 1.0, 10.0, 11.0]).unwrap();
        let sampler = LinearSampler::new(&image);
        let v = sampler.sample(&Point2::new(0.5, 0.5));
        assert!((v - 5.5).abs() < 1e-12);
    }
}
