//! Gradient providers.
//!
//! A [`GradientProvider`] turns a scalar function of a parameter vector into
//! value and gradient callbacks. [`AutodiffGradient`] obtains the gradient by
//! reverse-mode differentiation of a burn tensor expression;
//! [`GradientProblem`] adapts any provider to the [`NlpProblem`] contract.

use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use crate::error::{RegistrationError, Result};
use crate::solver::NlpProblem;

/// Scalar function with gradient.
pub trait GradientProvider {
    fn dimension(&self) -> usize;

    fn value(&self, x: &[f64]) -> Result<f64> {
        Ok(self.value_and_gradient(x)?.0)
    }

    fn value_and_gradient(&self, x: &[f64]) -> Result<(f64, Vec<f64>)>;
}

/// Parameter tensor tracked by autodiff.
pub fn params_tensor<B: AutodiffBackend>(x: &[f64], device: &B::Device) -> Tensor<B, 1> {
    Tensor::<B, 1>::from_data(TensorData::new(x.to_vec(), [x.len()]), device).require_grad()
}

/// Backpropagate a scalar `output` and read the gradient of `params`.
///
/// Parameters that do not influence `output` get a zero gradient.
pub fn backward_gradient<B: AutodiffBackend>(output: Tensor<B, 1>, params: &Tensor<B, 1>) -> Result<(f64, Vec<f64>)> {
    let [len] = params.dims();
    let value = output.clone().into_scalar().elem::<f64>();
    let grads = output.backward();
    let gradient = match params.grad(&grads) {
        Some(grad) => grad.into_data().iter::<f64>().collect::<Vec<_>>(),
        None => vec![0.0; len],
    };
    if gradient.len() != len {
        return Err(RegistrationError::dimension_mismatch(format!(
            "gradient has {} entries for {} parameters",
            gradient.len(),
            len
        )));
    }
    Ok((value, gradient))
}

/// Differentiates `f: Tensor[n] -> Tensor[1]` with burn autodiff.
pub struct AutodiffGradient<B: AutodiffBackend, F> {
    function: F,
    dimension: usize,
    device: B::Device,
}

impl<B, F> AutodiffGradient<B, F>
where
    B: AutodiffBackend,
    F: Fn(Tensor<B, 1>) -> Tensor<B, 1>,
{
    pub fn new(function: F, dimension: usize, device: B::Device) -> Self {
        Self {
            function,
            dimension,
            device,
        }
    }
}

impl<B, F> GradientProvider for AutodiffGradient<B, F>
where
    B: AutodiffBackend,
    F: Fn(Tensor<B, 1>) -> Tensor<B, 1>,
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn value(&self, x: &[f64]) -> Result<f64> {
        let params = Tensor::<B, 1>::from_data(TensorData::new(x.to_vec(), [x.len()]), &self.device);
        Ok((self.function)(params).into_scalar().elem::<f64>())
    }

    fn value_and_gradient(&self, x: &[f64]) -> Result<(f64, Vec<f64>)> {
        if x.len() != self.dimension {
            return Err(RegistrationError::dimension_mismatch(format!(
                "expected {} parameters, got {}",
                self.dimension,
                x.len()
            )));
        }
        let params = params_tensor::<B>(x, &self.device);
        let output = (self.function)(params.clone());
        backward_gradient(output, &params)
    }
}

/// Exposes a [`GradientProvider`] as an [`NlpProblem`].
pub struct GradientProblem<G> {
    provider: G,
}

impl<G: GradientProvider> GradientProblem<G> {
    pub fn new(provider: G) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &G {
        &self.provider
    }
}

impl<G: GradientProvider> NlpProblem for GradientProblem<G> {
    fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    fn evaluate_objective(&self, x: &[f64]) -> Result<f64> {
        self.provider.value(x)
    }

    fn evaluate_gradient(&self, x: &[f64], gradient: &mut [f64]) -> Result<()> {
        self.evaluate_with_gradient(x, gradient).map(|_| ())
    }

    fn evaluate_with_gradient(&self, x: &[f64], gradient: &mut [f64]) -> Result<f64> {
        let (value, g) = self.provider.value_and_gradient(x)?;
        if g.len() != gradient.len() {
            return Err(RegistrationError::dimension_mismatch(format!(
                "gradient buffer has {} entries, provider returned {}",
                gradient.len(),
                g.len()
            )));
        }
        gradient.copy_from_slice(&g);
        Ok(value)
    }
}
