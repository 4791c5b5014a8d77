//! Limited-memory BFGS direction.
//!
//! Standard two-loop recursion over the last `history_size` curvature pairs.

use std::collections::VecDeque;
use nalgebra::DVector;

/// Curvature pairs below this `yᵀs` are skipped.
const CURVATURE_EPSILON: f64 = 1e-10;

/// L-BFGS history of `s = x_{k+1} - x_k`, `y = g_{k+1} - g_k`, `ρ = 1 / yᵀs`.
#[derive(Debug, Clone)]
pub struct LbfgsMemory {
    history_size: usize,
    s_history: VecDeque<DVector<f64>>,
    y_history: VecDeque<DVector<f64>>,
    rho_history: VecDeque<f64>,
}

impl LbfgsMemory {
    pub fn new(history_size: usize) -> Self {
        Self {
            history_size: history_size.max(1),
            s_history: VecDeque::new(),
            y_history: VecDeque::new(),
            rho_history: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.s_history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s_history.is_empty()
    }

    pub fn clear(&mut self) {
        self.s_history.clear();
        self.y_history.clear();
        self.rho_history.clear();
    }

    /// Record a step. Returns `false` when the curvature condition fails and
    /// the pair is dropped.
    pub fn push(&mut self, s: DVector<f64>, y: DVector<f64>) -> bool {
        let ys = y.dot(&s);
        if !(ys > CURVATURE_EPSILON) {
            return false;
        }
        if self.s_history.len() >= self.history_size {
            self.s_history.pop_front();
            self.y_history.pop_front();
            self.rho_history.pop_front();
        }
        self.s_history.push_back(s);
        self.y_history.push_back(y);
        self.rho_history.push_back(1.0 / ys);
        true
    }

    /// Descent direction `-H g`.
    pub fn direction(&self, gradient: &DVector<f64>) -> DVector<f64> {
        let len = self.len();
        let mut q = gradient.clone();
        let mut alphas = vec![0.0; len];

        // First loop (backward)
        for i in (0..len).rev() {
            let alpha = self.rho_history[i] * self.s_history[i].dot(&q);
            alphas[i] = alpha;
            q.axpy(-alpha, &self.y_history[i], 1.0);
        }

        // Initial Hessian scaling gamma = sᵀy / yᵀy
        if let (Some(s), Some(y)) = (self.s_history.back(), self.y_history.back()) {
            let yy = y.norm_squared();
            if yy > 0.0 {
                q *= s.dot(y) / yy;
            }
        }

        // Second loop (forward)
        for i in 0..len {
            let beta = self.rho_history[i] * self.y_history[i].dot(&q);
            q.axpy(alphas[i] - beta, &self.s_history[i], 1.0);
        }
        -q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_memory_is_steepest_descent() {
        let memory = LbfgsMemory::new(5);
        let g = DVector::from_vec(vec![1.0, -2.0]);
        assert_eq!(memory.direction(&g), -g);
    }

    #[test]
    fn test_recovers_newton_step_on_quadratic() {
        // f = ½ xᵀ diag(1, 4) x, exact pairs along both axes
        let mut memory = LbfgsMemory::new(5);
        assert!(memory.push(DVector::from_vec(vec![1.0, 0.0]), DVector::from_vec(vec![1.0, 0.0])));
        assert!(memory.push(DVector::from_vec(vec![0.0, 1.0]), DVector::from_vec(vec![0.0, 4.0])));
        let g = DVector::from_vec(vec![2.0, 8.0]);
        let d = memory.direction(&g);
        assert!((d - DVector::from_vec(vec![-2.0, -2.0])).norm() < 1e-12);
    }

    #[test]
    fn test_history_is_bounded_and_filters_curvature() {
        let mut memory = LbfgsMemory::new(2);
        assert!(!memory.push(DVector::from_vec(vec![1.0]), DVector::from_vec(vec![-1.0])));
        for _ in 0..4 {
            memory.push(DVector::from_vec(vec![1.0]), DVector::from_vec(vec![2.0]));
        }
        assert_eq!(memory.len(), 2);
        memory.clear();
        assert!(memory.is_empty());
    }
}
