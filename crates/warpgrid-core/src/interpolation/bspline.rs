//! Interpolating quadratic B-splines on knot grids.
//!
//! Samples are prefiltered once into B-spline coefficients so that the spline
//! passes through every sample. The interpolant is continuously
//! differentiable, which keeps gradient-based refinement from stalling on the
//! cell edges of a piecewise-linear surface.
//!
//! Along each axis the coefficients satisfy a vanishing third difference at
//! both ends, so polynomials up to degree two are reproduced exactly. Axes
//! with two samples fall back to linear interpolation and single-sample axes
//! are constant. Beyond the first and last sample the spline is continued
//! along its boundary tangent.
//!
//! Evaluation works in sample-index coordinates. [`Knots`] map physical
//! coordinates to index coordinates through their cells, so on evenly spaced
//! knots the interpolant is C¹ in physical space as well.

use std::ops::{Add, Mul};
use ndarray::{ArrayD, Axis, IxDyn, Zip};
use crate::image::GridArray;
use crate::spatial::Point;
use crate::transform::Knots;

/// Values that can be blended linearly.
pub trait Interpolant: Copy + Add<Output = Self> + Mul<f64, Output = Self> {
    fn zero() -> Self;
}

impl Interpolant for f64 {
    fn zero() -> Self {
        0.0
    }
}

impl<const N: usize> Interpolant for nalgebra::SVector<f64, N> {
    fn zero() -> Self {
        Self::zeros()
    }
}

/// Prefiltered quadratic B-spline over a `D`-dimensional sample array.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticBSpline<T, const D: usize> {
    /// Coefficients, padded by one on both ends of every axis.
    coefficients: GridArray<T, D>,
    shape: [usize; D],
}

/// First padded coefficient and the three value and slope weights along one axis.
struct AxisWeights {
    start: usize,
    value: [f64; 3],
    slope: [f64; 3],
}

fn axis_weights(s: f64, n: usize) -> AxisWeights {
    let clamped = s.clamp(0.0, n.saturating_sub(1) as f64);
    let center = clamped.round();
    let t = clamped - center;
    let slope = [t - 0.5, -2.0 * t, t + 0.5];
    let base = [0.5 * (0.5 - t).powi(2), 0.75 - t * t, 0.5 * (0.5 + t).powi(2)];
    let beyond = s - clamped;
    AxisWeights {
        start: center as usize,
        value: std::array::from_fn(|k| base[k] + beyond * slope[k]),
        slope,
    }
}

/// Thomas algorithm for a tridiagonal system with scalar bands.
fn solve_tridiagonal<T: Interpolant>(lower: &[f64], diag: &[f64], upper: &[f64], mut rhs: Vec<T>) -> Vec<T> {
    let n = rhs.len();
    let mut pivots = diag.to_vec();
    for i in 1..n {
        let w = lower[i] / pivots[i - 1];
        pivots[i] -= w * upper[i - 1];
        rhs[i] = rhs[i] + rhs[i - 1] * -w;
    }
    for i in (0..n).rev() {
        let mut value = rhs[i];
        if i + 1 < n {
            value = value + rhs[i + 1] * -upper[i];
        }
        rhs[i] = value * (1.0 / pivots[i]);
    }
    rhs
}

/// Padded coefficients `c_{-1} ..= c_n` of one line of samples.
fn line_coefficients<T: Interpolant>(samples: &[T]) -> Vec<T> {
    let n = samples.len();
    match n {
        0 => return Vec::new(),
        1 => return vec![samples[0]; 3],
        2 => {
            let (a, b) = (samples[0], samples[1]);
            return vec![a * 2.0 + b * -1.0, a, b, b * 2.0 + a * -1.0];
        }
        _ => {}
    }

    // Rows 1..n-1 interpolate: c_{j-1} + 6 c_j + c_{j+1} = 8 y_j. The end rows
    // combine interpolation with the vanishing third difference.
    let mut lower = vec![1.0; n];
    let mut diag = vec![6.0; n];
    let mut upper = vec![1.0; n];
    let mut rhs: Vec<T> = samples.iter().map(|&y| y * 8.0).collect();
    diag[0] = -1.0;
    upper[0] = 1.0;
    rhs[0] = samples[1] + samples[0] * -1.0;
    lower[n - 1] = -1.0;
    diag[n - 1] = 1.0;
    rhs[n - 1] = samples[n - 1] + samples[n - 2] * -1.0;

    let interior = solve_tridiagonal(&lower, &diag, &upper, rhs);
    let mut padded = Vec::with_capacity(n + 2);
    padded.push(samples[0] * 8.0 + interior[0] * -6.0 + interior[1] * -1.0);
    padded.extend_from_slice(&interior);
    padded.push(samples[n - 1] * 8.0 + interior[n - 1] * -6.0 + interior[n - 2] * -1.0);
    padded
}

/// Prefilter every line of `input` along `axis`.
fn prefilter_axis<T: Interpolant>(input: &ArrayD<T>, axis: usize) -> ArrayD<T> {
    let mut shape = input.shape().to_vec();
    shape[axis] += 2;
    let mut output = ArrayD::from_elem(IxDyn(&shape), T::zero());
    Zip::from(input.lanes(Axis(axis)))
        .and(output.lanes_mut(Axis(axis)))
        .for_each(|samples, mut coefficients| {
            let samples: Vec<T> = samples.iter().copied().collect();
            for (dst, src) in coefficients.iter_mut().zip(line_coefficients(&samples)) {
                *dst = src;
            }
        });
    output
}

impl<T: Interpolant, const D: usize> QuadraticBSpline<T, D> {
    /// Prefilter `samples` into spline coefficients.
    pub fn new(samples: &GridArray<T, D>) -> Self {
        let mut coefficients = samples.as_ndarray().clone();
        for axis in 0..D {
            coefficients = prefilter_axis(&coefficients, axis);
        }
        let coefficients = GridArray::from_ndarray(coefficients)
            .unwrap_or_else(|_| GridArray::filled([0; D], T::zero()));
        Self {
            coefficients,
            shape: samples.shape(),
        }
    }

    /// Number of samples along each axis.
    pub fn shape(&self) -> [usize; D] {
        self.shape
    }

    /// Spline value at sample-index coordinates `s`.
    pub fn value(&self, s: &[f64; D]) -> T {
        let axes: [AxisWeights; D] = std::array::from_fn(|d| axis_weights(s[d], self.shape[d]));
        let mut acc = T::zero();
        for corner in 0..3usize.pow(D as u32) {
            let (index, weight) = self.corner(&axes, corner, None);
            if weight != 0.0 {
                acc = acc + self.coefficients[index] * weight;
            }
        }
        acc
    }

    /// Partial derivatives along each index axis at `s`.
    pub fn gradient(&self, s: &[f64; D]) -> [T; D] {
        let axes: [AxisWeights; D] = std::array::from_fn(|d| axis_weights(s[d], self.shape[d]));
        let mut grad = [T::zero(); D];
        for corner in 0..3usize.pow(D as u32) {
            for (j, g) in grad.iter_mut().enumerate() {
                let (index, weight) = self.corner(&axes, corner, Some(j));
                if weight != 0.0 {
                    *g = *g + self.coefficients[index] * weight;
                }
            }
        }
        grad
    }

    /// Coefficient index and weight of one of the `3^D` neighbours; axis
    /// `differentiate` uses slope weights.
    fn corner(&self, axes: &[AxisWeights; D], corner: usize, differentiate: Option<usize>) -> ([usize; D], f64) {
        let mut rest = corner;
        let mut index = [0usize; D];
        let mut weight = 1.0;
        for (d, axis) in axes.iter().enumerate() {
            let k = rest % 3;
            rest /= 3;
            index[d] = axis.start + k;
            weight *= if differentiate == Some(d) {
                axis.slope[k]
            } else {
                axis.value[k]
            };
        }
        (index, weight)
    }
}

/// Sample-index coordinates of `x` on `knots`, with `ds/dx` per axis.
pub fn knot_coordinates<const D: usize>(knots: &Knots<D>, x: &Point<D>) -> ([f64; D], [f64; D]) {
    let mut s = [0.0; D];
    let mut scale = [1.0; D];
    for d in 0..D {
        let (cell, t) = knots.locate(d, x[d]);
        let axis = knots.axis(d);
        s[d] = cell as f64 + t;
        scale[d] = 1.0 / (axis[cell + 1] - axis[cell]);
    }
    (s, scale)
}
