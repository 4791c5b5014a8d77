//! Automatic choice of the regularization weight.
//!
//! λ is swept geometrically from `λmin` to `λmax`. Each round registers at
//! the current λ twice, warm-started from the previous winner and cold from
//! the linear initial guess, and keeps the better result. The data-only
//! penalty of the winners traces a sigmoid in the round index; the round at
//! `center - width` of the fitted curve, where the data term starts to rise,
//! is selected.

use std::time::Instant;
use burn::config::Config;
use warpgrid_core::{GridDeformation, IdentityTransform, Knots};
use crate::error::RegistrationError;
use crate::mismatch::{BlockMismatch, MismatchFits};
use crate::penalty::{AffinePenalty, PenaltyParts};
use crate::progress::ProgressInfo;
use crate::refine::Refinement;
use crate::registration::DeformableRegistration;
use crate::sigmoid::{fit_sigmoid, SigmoidFit, MIN_SIGMOID_POINTS};
use crate::solver::NlpSolver;
use crate::validation::validate_lambda_range;

/// λ-sweep settings.
#[derive(Config, Debug)]
pub struct AutoLambdaConfig {
    /// Factor between consecutive weights.
    #[config(default = 2.0)]
    pub lambda_growth: f64,
}

/// Weights `λmin, g λmin, g² λmin, …`, capped at and ending with `λmax`.
pub fn lambda_schedule(lambda_min: f64, lambda_max: f64, growth: f64) -> crate::error::Result<Vec<f64>> {
    validate_lambda_range(lambda_min, lambda_max)?;
    if !(growth > 1.0 && growth.is_finite()) {
        return Err(RegistrationError::invalid_configuration(format!(
            "lambda_growth must exceed 1, got {}",
            growth
        )));
    }
    let mut lambdas = vec![lambda_min];
    let mut lambda = lambda_min;
    while lambda < lambda_max {
        lambda = (lambda * growth).min(lambda_max);
        lambdas.push(lambda);
    }
    Ok(lambdas)
}

/// Result of a λ sweep.
#[derive(Debug, Clone)]
pub struct LambdaSweep<const D: usize> {
    /// Deformation of the selected round.
    pub deformation: GridDeformation<D>,
    pub penalty: PenaltyParts,
    /// Weight of the selected round.
    pub lambda: f64,
    /// Every weight tried, in order.
    pub lambdas: Vec<f64>,
    /// Data-only penalty of each round's winner.
    pub data_penalties: Vec<f64>,
    pub fit: SigmoidFit,
    /// `residual / (top - bottom)² / n`; smaller is a cleaner sigmoid.
    pub quality: f64,
    /// Selected round, 1-based.
    pub index: usize,
}

impl<S: NlpSolver> DeformableRegistration<S> {
    /// Sweep λ over `[lambda_min, lambda_max]` and pick the weight at the
    /// knee of the data-penalty curve.
    ///
    /// Fails with a precondition error, before any registration runs, when
    /// the range yields fewer than four weights.
    pub fn auto_lambda<M, const D: usize>(
        &self,
        fits: &MismatchFits<D>,
        knots: &Knots<D>,
        mismatch: &M,
        lambda_range: (f64, f64),
    ) -> crate::error::Result<LambdaSweep<D>>
    where
        M: BlockMismatch<D> + ?Sized,
    {
        let result = self.run_sweep(fits, knots, mismatch, lambda_range);
        if let (Err(error), Some(progress)) = (&result, &self.progress) {
            progress.on_error(&error.to_string());
        }
        result
    }

    fn run_sweep<M, const D: usize>(
        &self,
        fits: &MismatchFits<D>,
        knots: &Knots<D>,
        mismatch: &M,
        (lambda_min, lambda_max): (f64, f64),
    ) -> crate::error::Result<LambdaSweep<D>>
    where
        M: BlockMismatch<D> + ?Sized,
    {
        let lambdas = lambda_schedule(lambda_min, lambda_max, self.sweep.lambda_growth)?;
        let n = lambdas.len();
        if n < MIN_SIGMOID_POINTS {
            return Err(RegistrationError::precondition(format!(
                "λ range [{:e}, {:e}] gives {} rounds, at least {} are needed to fit the sigmoid",
                lambda_min, lambda_max, n, MIN_SIGMOID_POINTS
            )));
        }

        let base = AffinePenalty::new(knots, lambda_min)?;
        let started = Instant::now();
        if let Some(progress) = &self.progress {
            progress.on_start();
        }

        let mut winners: Vec<Refinement<D>> = Vec::with_capacity(n);
        let mut data_penalties = Vec::with_capacity(n);
        for (round, &lambda) in lambdas.iter().enumerate() {
            self.cancel.check()?;
            let penalty = base.with_lambda(lambda);
            let cold = self.fixed_lambda(fits, knots, &penalty, mismatch, &IdentityTransform)?;
            let winner = match winners.last() {
                Some(previous) => {
                    let warm = self.refine_with_backoff(&previous.deformation, &IdentityTransform, &penalty, mismatch)?;
                    if warm.penalty.total < cold.penalty.total {
                        warm
                    } else {
                        cold
                    }
                }
                None => cold,
            };

            tracing::info!(
                "λ round {}/{}: λ = {:.3e}, penalty {:.6e} (data {:.6e})",
                round + 1,
                n,
                lambda,
                winner.penalty.total,
                winner.penalty.data
            );
            data_penalties.push(winner.penalty.data);
            if let Some(progress) = &self.progress {
                progress.on_progress(&ProgressInfo {
                    round: round + 1,
                    total_rounds: Some(n),
                    lambda,
                    penalty: winner.penalty.total,
                    data_penalty: winner.penalty.data,
                    elapsed: started.elapsed(),
                });
            }
            winners.push(winner);
        }

        let fit = fit_sigmoid(&data_penalties)?;
        let index = fit.chosen_index(n);
        let quality = fit.quality(n);
        let lambda = lambdas[index - 1];
        let chosen = winners.swap_remove(index - 1);
        tracing::info!(
            "Selected round {} of {} (λ = {:.3e}), sigmoid quality {:.3e}",
            index,
            n,
            lambda,
            quality
        );
        if let Some(progress) = &self.progress {
            progress.on_complete(&ProgressInfo {
                round: index,
                total_rounds: Some(n),
                lambda,
                penalty: chosen.penalty.total,
                data_penalty: chosen.penalty.data,
                elapsed: started.elapsed(),
            });
        }

        Ok(LambdaSweep {
            deformation: chosen.deformation,
            penalty: chosen.penalty,
            lambda,
            lambdas,
            data_penalties,
            fit,
            quality,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_doubles_and_caps() {
        assert_eq!(lambda_schedule(1.0, 8.0, 2.0).unwrap(), vec![1.0, 2.0, 4.0, 8.0]);
        assert_eq!(lambda_schedule(1.0, 5.0, 2.0).unwrap(), vec![1.0, 2.0, 4.0, 5.0]);
        assert_eq!(lambda_schedule(3.0, 3.0, 2.0).unwrap(), vec![3.0]);
    }

    #[test]
    fn test_schedule_rejects_bad_input() {
        assert!(lambda_schedule(0.0, 1.0, 2.0).is_err());
        assert!(lambda_schedule(2.0, 1.0, 2.0).is_err());
        assert!(lambda_schedule(1.0, 2.0, 1.0).is_err());
        assert!(lambda_schedule(1.0, f64::INFINITY, 2.0).is_err());
    }

    #[test]
    fn test_schedule_length_for_wide_range() {
        let lambdas = lambda_schedule(1e-6, 100.0, 2.0).unwrap();
        assert_eq!(lambdas.first(), Some(&1e-6));
        assert_eq!(lambdas.last(), Some(&100.0));
        assert!(lambdas.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(lambdas.len(), 28);
    }
}
