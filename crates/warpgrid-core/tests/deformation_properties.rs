use proptest::prelude::*;
use warpgrid_core::spatial::{Matrix2, Point2, Vector2};
use warpgrid_core::{Compose, GridArray, GridDeformation, IdentityTransform, Knots};

fn axis(len: usize, step: f64) -> Vec<f64> {
    (0..len).map(|i| i as f64 * step).collect()
}

fn affine_field(knots: &Knots<2>, a: Matrix2, b: Vector2) -> GridDeformation<2> {
    let u = GridArray::from_fn(knots.shape(), |index| a * knots.point(index) + b);
    GridDeformation::new(u, knots.clone()).unwrap().interpolate()
}

fn wave_field(knots: &Knots<2>, amplitude: f64, frequency: [f64; 2], phase: f64) -> GridDeformation<2> {
    let u = GridArray::from_fn(knots.shape(), |index| {
        let p = knots.point(index);
        Vector2::new(
            amplitude * (frequency[0] * p[0] + frequency[1] * p[1] + phase).sin(),
            amplitude * (frequency[1] * p[0] - frequency[0] * p[1] + phase).cos(),
        )
    });
    GridDeformation::new(u, knots.clone()).unwrap().interpolate()
}

proptest! {
    #[test]
    fn test_construction_succeeds_iff_shapes_match(
        k0 in 2usize..6, k1 in 2usize..6,
        n0 in 1usize..7, n1 in 1usize..7,
    ) {
        let knots = Knots::new([axis(k0, 1.0), axis(k1, 2.0)]).unwrap();
        let u = GridArray::filled([n0, n1], Vector2::zeros());
        let result = GridDeformation::new(u, knots);
        if n0 == k0 && n1 == k1 {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.unwrap_err().is_shape_error());
        }
    }

    #[test]
    fn test_identity_composition_is_noop(
        values in proptest::collection::vec(-2.0f64..2.0, 18),
    ) {
        let knots = Knots::new([axis(3, 2.0), axis(3, 1.5)]).unwrap();
        let phi = GridDeformation::from_flat(&[2, 3, 3], &values, knots).unwrap().interpolate();
        let (composed, jacobian) = IdentityTransform.compose_with_jacobian(&phi).unwrap();
        prop_assert_eq!(&composed, &phi);
        prop_assert!(jacobian.iter().all(|j| *j == Matrix2::identity()));
    }

    #[test]
    fn test_composition_matches_sequential_evaluation(
        a in proptest::array::uniform4(-0.2f64..0.2),
        b in proptest::array::uniform2(-1.0f64..1.0),
        c in proptest::array::uniform4(-0.2f64..0.2),
        d in proptest::array::uniform2(-1.0f64..1.0),
        x0 in -1.0f64..9.0, x1 in -1.0f64..9.0,
    ) {
        // Affine fields are reproduced exactly by the interpolant, so
        // composition agrees with sequential evaluation everywhere.
        let knots = Knots::new([axis(5, 2.0), axis(4, 8.0 / 3.0)]).unwrap();
        let phi1 = affine_field(&knots, Matrix2::from_row_slice(&a), Vector2::from_row_slice(&b));
        let phi2 = affine_field(&knots, Matrix2::from_row_slice(&c), Vector2::from_row_slice(&d));

        let composed = phi1.compose(&phi2).unwrap().interpolate();
        let x = Point2::new(x0, x1);
        let expected = phi1.evaluate(&phi2.evaluate(&x).unwrap()).unwrap();
        let actual = composed.evaluate(&x).unwrap();
        prop_assert!((expected - actual).norm() < 1e-9, "{} vs {}", expected, actual);
    }

    #[test]
    fn test_smooth_composition_matches_sequential_evaluation(
        a1 in -0.3f64..0.3, f1 in proptest::array::uniform2(0.0f64..0.3), p1 in 0.0f64..6.3,
        a2 in -0.3f64..0.3, f2 in proptest::array::uniform2(0.0f64..0.3), p2 in 0.0f64..6.3,
    ) {
        let knots = Knots::new([axis(6, 2.0), axis(6, 2.0)]).unwrap();
        let phi1 = wave_field(&knots, a1, f1, p1);
        let phi2 = wave_field(&knots, a2, f2, p2);
        let composed = phi1.compose(&phi2).unwrap().interpolate();

        for index in composed.displacements().indices() {
            let x = knots.point(index);
            let expected = phi1.evaluate(&phi2.evaluate(&x).unwrap()).unwrap();
            let actual = composed.evaluate(&x).unwrap();
            prop_assert!((expected - actual).amax() < 1e-9, "knot {:?}: {} vs {}", index, expected, actual);
        }
        // Cell midpoints carry the interpolation error of the composed field.
        for i in 0..5 {
            for j in 0..5 {
                let x = Point2::new(2.0 * i as f64 + 1.0, 2.0 * j as f64 + 1.0);
                let expected = phi1.evaluate(&phi2.evaluate(&x).unwrap()).unwrap();
                let actual = composed.evaluate(&x).unwrap();
                prop_assert!((expected - actual).amax() < 1e-2, "{} vs {}", expected, actual);
            }
        }
    }
}

#[test]
fn test_composition_jacobian_matches_finite_differences() {
    let knots = Knots::new([axis(4, 1.0), axis(4, 1.0)]).unwrap();
    let old = GridArray::from_fn(knots.shape(), |[i, j]| {
        Vector2::new(((i * j) as f64).sin() * 0.3, (i as f64 - j as f64) * 0.1)
    });
    let old = GridDeformation::new(old, knots.clone()).unwrap().interpolate();
    let new = GridDeformation::new(GridArray::filled(knots.shape(), Vector2::new(0.25, 0.4)), knots.clone()).unwrap();

    let (base, jacobian) = old.compose_with_jacobian(&new).unwrap();
    let h = 1e-6;
    let index = [1, 2];
    for k in 0..2 {
        let mut shifted = new.displacements().clone();
        shifted[index][k] += h;
        let shifted = new.with_displacements(shifted).unwrap();
        let moved = old.compose(&shifted).unwrap();
        let column = (moved.displacements()[index] - base.displacements()[index]) / h;
        for i in 0..2 {
            assert!((column[i] - jacobian[index][(i, k)]).abs() < 1e-5);
        }
    }
}

#[test]
fn test_zero_field_on_three_by_three() {
    let knots = Knots::new([vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 2.0]]).unwrap();
    let phi = GridDeformation::identity(knots).interpolate();
    for index in [[0, 0], [1, 2], [2, 1]] {
        let x = Point2::new(index[0] as f64, index[1] as f64);
        assert_eq!(phi.evaluate(&x).unwrap(), x);
        assert_eq!(phi.evaluate_on_grid(index).unwrap(), x);
    }
}
