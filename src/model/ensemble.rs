//! Auxiliary classifier ensemble
//!
//! `ENSEMBLE_SIZE` independent linear heads on the bottleneck features. Each
//! head is trained on its own bootstrap view of the source data; their
//! disagreement on a target sample is the uncertainty signal.

use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use crate::ENSEMBLE_SIZE;

#[derive(Module, Debug)]
pub struct Ensemble<B: Backend> {
    pub heads: Vec<Linear<B>>,
}

impl<B: Backend> Ensemble<B> {
    pub fn new(in_features: usize, num_classes: usize, device: &B::Device) -> Self {
        let heads = (0..ENSEMBLE_SIZE)
            .map(|_| LinearConfig::new(in_features, num_classes).init(device))
            .collect();
        Self { heads }
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Logits of head `index`
    pub fn forward_head(&self, index: usize, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.heads[index].forward(features)
    }

    /// Softmax output of every head
    pub fn forward_all(&self, features: Tensor<B, 2>) -> Vec<Tensor<B, 2>> {
        self.heads
            .iter()
            .map(|head| softmax(head.forward(features.clone()), 1))
            .collect()
    }
}
