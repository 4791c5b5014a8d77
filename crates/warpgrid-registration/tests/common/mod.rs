#![allow(dead_code)]

use warpgrid_core::spatial::{Matrix2, Vector2};
use warpgrid_core::{GridArray, Knots};
use warpgrid_registration::{InterpolatedMismatch, MismatchFits};

pub const MAX_SHIFT: [usize; 2] = [3, 3];

/// Fits on a 4x4 grid: an affine shift plus a checkerboard that the affine
/// penalty suppresses as λ grows.
pub fn synthetic_problem() -> (Knots<2>, MismatchFits<2>, InterpolatedMismatch<2>) {
    let knots = Knots::from_image_size([64, 64], [4, 4]).unwrap();
    let cs = GridArray::from_fn([4, 4], |[i, j]| {
        let checker = if (i + j) % 2 == 0 { 0.9 } else { -0.9 };
        Vector2::new(0.2 * i as f64 - 0.3 + checker, -0.1 * j as f64 + 0.4 - 0.5 * checker)
    });
    let qs = GridArray::from_fn([4, 4], |[i, _]| Matrix2::new(1.0 + 0.1 * i as f64, 0.2, 0.2, 0.8));
    let fits = MismatchFits::new(cs, qs, MAX_SHIFT).unwrap();
    let mismatch = InterpolatedMismatch::from_fits(&fits).unwrap();
    (knots, fits, mismatch)
}

pub fn gaussian_blob(shape: [usize; 2], center: [f64; 2], sigma: f64) -> GridArray<f64, 2> {
    GridArray::from_fn(shape, |[i, j]| {
        let r2 = (i as f64 - center[0]).powi(2) + (j as f64 - center[1]).powi(2);
        (-r2 / (2.0 * sigma * sigma)).exp()
    })
}
