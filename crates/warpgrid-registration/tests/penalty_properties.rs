use proptest::prelude::*;
use warpgrid_core::spatial::{Matrix2, Vector2};
use warpgrid_core::{GridArray, Knots};
use warpgrid_registration::auto_lambda::lambda_schedule;
use warpgrid_registration::{fit_sigmoid, AffinePenalty, SigmoidFit};

fn knots(nx: usize, ny: usize) -> Knots<2> {
    Knots::from_image_size([32, 40], [nx, ny]).unwrap()
}

proptest! {
    #[test]
    fn affine_fields_cost_nothing(
        nx in 2usize..6,
        ny in 2usize..6,
        a in prop::array::uniform4(-2.0f64..2.0),
        t in prop::array::uniform2(-3.0f64..3.0),
        lambda in 0.0f64..100.0,
    ) {
        let knots = knots(nx, ny);
        let penalty = AffinePenalty::new(&knots, lambda).unwrap();
        let m = Matrix2::new(a[0], a[1], a[2], a[3]) * 0.05;
        let shift = Vector2::new(t[0], t[1]);
        let u = GridArray::from_fn(knots.shape(), |index| m * knots.point(index) + shift);
        let value = penalty.evaluate(&u).unwrap();
        prop_assert!(value.abs() < 1e-9, "value {}", value);
    }

    #[test]
    fn penalty_is_linear_in_lambda(
        values in prop::collection::vec(-2.0f64..2.0, 18),
        lambda in 0.0f64..50.0,
    ) {
        let knots = knots(3, 3);
        let penalty = AffinePenalty::new(&knots, 1.0).unwrap();
        let u = GridArray::from_fn([3, 3], |[i, j]| {
            let k = 2 * (3 * i + j);
            Vector2::new(values[k], values[k + 1])
        });
        let unit = penalty.evaluate(&u).unwrap();
        let scaled = penalty.penalty_with_lambda(&u, lambda, None).unwrap();
        prop_assert!((scaled - lambda * unit).abs() <= 1e-9 * (1.0 + scaled.abs()));
        prop_assert!(unit >= 0.0);
        prop_assert_eq!(penalty.lambda(), 1.0);
    }

    #[test]
    fn schedule_stays_in_range(min in 1e-6f64..10.0, span in 1.0f64..1e4, growth in 1.1f64..8.0) {
        let max = min * span;
        let lambdas = lambda_schedule(min, max, growth).unwrap();
        prop_assert_eq!(lambdas[0], min);
        prop_assert_eq!(*lambdas.last().unwrap(), max);
        prop_assert!(lambdas.iter().all(|&l| l >= min && l <= max));
        prop_assert!(lambdas.windows(2).all(|w| w[1] > w[0] || w[1] == max));
    }

    #[test]
    fn sigmoid_fit_respects_bounds(data in prop::collection::vec(-5.0f64..5.0, 4..20)) {
        let fit: SigmoidFit = fit_sigmoid(&data).unwrap();
        let n = data.len();
        let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(fit.bottom >= min && fit.bottom <= max);
        prop_assert!(fit.top >= min && fit.top <= max);
        prop_assert!(fit.center >= 1.0 && fit.center <= n as f64);
        prop_assert!(fit.width >= 0.1 && fit.width <= n as f64);
        prop_assert!(fit.residual >= 0.0);
        prop_assert!(fit.quality(n) >= 0.0);
        let index = fit.chosen_index(n);
        prop_assert!(index >= 1 && index <= n);
    }
}
