//! Data-mismatch penalty: the sum of per-block costs.

use warpgrid_core::{GridArray, Vector};
use crate::error::{RegistrationError, Result};
use crate::mismatch::BlockMismatch;

/// `Σ_i cost_i(u_i)`, optionally writing `∂/∂u_i` into `gradient`.
pub fn data_penalty<M, const D: usize>(
    u: &GridArray<Vector<D>, D>,
    mismatch: &M,
    gradient: Option<&mut GridArray<Vector<D>, D>>,
) -> Result<f64>
where
    M: BlockMismatch<D> + ?Sized,
{
    let shape = mismatch.grid_shape();
    if u.shape() != shape {
        return Err(RegistrationError::shape_mismatch(&shape, &u.shape()));
    }
    match gradient {
        Some(gradient) => {
            if gradient.shape() != shape {
                return Err(RegistrationError::shape_mismatch(&shape, &gradient.shape()));
            }
            let mut total = 0.0;
            for (block, (shift, g)) in u.iter().zip(gradient.iter_mut()).enumerate() {
                let (value, partials) = mismatch.value_and_gradient(block, shift);
                total += value;
                *g = partials;
            }
            Ok(total)
        }
        None => Ok(u
            .iter()
            .enumerate()
            .map(|(block, shift)| mismatch.value_and_gradient(block, shift).0)
            .sum()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warpgrid_core::spatial::{Matrix2, Vector2};
    use crate::mismatch::MismatchFits;

    #[test]
    fn test_sum_of_blocks() {
        let cs = GridArray::filled([2, 2], Vector2::new(1.0, 0.0));
        let qs = GridArray::filled([2, 2], Matrix2::identity());
        let fits = MismatchFits::new(cs, qs, [2, 2]).unwrap();
        let u = GridArray::filled([2, 2], Vector2::zeros());
        let mut g = u.clone();
        let value = data_penalty(&u, &fits, Some(&mut g)).unwrap();
        assert!((value - 4.0).abs() < 1e-12);
        assert!(g.iter().all(|v| *v == Vector2::new(-2.0, 0.0)));
        assert_eq!(data_penalty(&u, &fits, None).unwrap(), value);
        let wrong = GridArray::filled([1, 2], Vector2::zeros());
        assert!(data_penalty(&wrong, &fits, None).is_err());
    }
}
