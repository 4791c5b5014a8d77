//! Deformable registration driver.
//!
//! [`DeformableRegistration`] owns the NLP solver and every tuning knob of
//! the refinement stages. The stages themselves live in [`crate::refine`]
//! (`optimize`, `fixed_lambda`) and [`crate::auto_lambda`] (`auto_lambda`).

use std::sync::Arc;
use crate::auto_lambda::AutoLambdaConfig;
use crate::progress::{CancellationToken, ProgressCallback};
use crate::refine::RefinementConfig;
use crate::solver::{CgConfig, InteriorPointSolver, NlpSolver};

pub struct DeformableRegistration<S = InteriorPointSolver> {
    pub(crate) solver: S,
    pub(crate) cg: CgConfig,
    pub(crate) refinement: RefinementConfig,
    pub(crate) sweep: AutoLambdaConfig,
    pub(crate) cancel: CancellationToken,
    pub(crate) progress: Option<Arc<dyn ProgressCallback>>,
}

impl<S: NlpSolver> DeformableRegistration<S> {
    pub fn new(solver: S) -> Self {
        Self {
            solver,
            cg: CgConfig::new(),
            refinement: RefinementConfig::new(),
            sweep: AutoLambdaConfig::new(),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Settings of the initial-guess linear solve.
    pub fn with_cg_config(mut self, config: CgConfig) -> Self {
        self.cg = config;
        self
    }

    pub fn with_refinement_config(mut self, config: RefinementConfig) -> Self {
        self.refinement = config;
        self
    }

    pub fn with_sweep_config(mut self, config: AutoLambdaConfig) -> Self {
        self.sweep = config;
        self
    }

    /// Share a cancellation token. Cancelling any clone stops the next
    /// solver iteration, backoff attempt or sweep round.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Observe λ-sweep rounds.
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn cg_config(&self) -> &CgConfig {
        &self.cg
    }

    pub fn refinement_config(&self) -> &RefinementConfig {
        &self.refinement
    }

    pub fn sweep_config(&self) -> &AutoLambdaConfig {
        &self.sweep
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Default for DeformableRegistration<InteriorPointSolver> {
    fn default() -> Self {
        Self::new(InteriorPointSolver::default())
    }
}
