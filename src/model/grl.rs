//! Gradient reversal
//!
//! Identity on the forward pass, multiplies the incoming gradient by `-coeff`
//! on the backward pass. The coefficient warms up from `lo` to `hi` along a
//! sigmoid in the iteration count.

use burn::tensor::{backend::Backend, Tensor};

/// Identity in value, gradient scaled by `-coeff`.
///
/// `(1 + c)·x` is detached, so only the `-c·x` term carries gradient;
/// the two terms sum back to `x`.
pub fn reverse_gradient<B: Backend, const D: usize>(x: Tensor<B, D>, coeff: f64) -> Tensor<B, D> {
    x.clone().mul_scalar(1.0 + coeff).detach() + x.mul_scalar(-coeff)
}

/// Warm-start coefficient schedule for the reversal layer
#[derive(Debug, Clone, PartialEq)]
pub struct GradientReverseSchedule {
    pub alpha: f64,
    pub lo: f64,
    pub hi: f64,
    pub max_iters: usize,
    iter: usize,
}

impl Default for GradientReverseSchedule {
    fn default() -> Self {
        Self::new(1.0, 0.0, 1.0, 1000)
    }
}

impl GradientReverseSchedule {
    pub fn new(alpha: f64, lo: f64, hi: f64, max_iters: usize) -> Self {
        Self {
            alpha,
            lo,
            hi,
            max_iters: max_iters.max(1),
            iter: 0,
        }
    }

    /// `2(hi - lo) / (1 + exp(-alpha·i/max_iters)) - (hi - lo) + lo`
    pub fn coeff(&self) -> f64 {
        let progress = self.iter as f64 / self.max_iters as f64;
        let span = self.hi - self.lo;
        2.0 * span / (1.0 + (-self.alpha * progress).exp()) - span + self.lo
    }

    pub fn step(&mut self) {
        self.iter += 1;
    }

    /// Current coefficient, then advance
    pub fn next_coeff(&mut self) -> f64 {
        let coeff = self.coeff();
        self.step();
        coeff
    }

    pub fn iteration(&self) -> usize {
        self.iter
    }
}
