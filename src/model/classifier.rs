//! Image classifier for the source label space
//!
//! Backbone → bottleneck (Linear → BatchNorm → ReLU) → linear head.
//! `forward` returns both the logits and the bottleneck features; the
//! features feed the domain discriminator and the ensemble.

use burn::{
    config::Config,
    module::Module,
    nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig, Relu},
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use super::backbone::{Backbone, BackboneConfig};
use super::batch_norm_1d;

#[derive(Config, Debug)]
pub struct ImageClassifierConfig {
    pub num_classes: usize,
    pub backbone: BackboneConfig,
    #[config(default = "256")]
    pub bottleneck_dim: usize,
}

impl ImageClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImageClassifier<B> {
        let backbone = self.backbone.init(device);
        let bottleneck = Bottleneck {
            fc: LinearConfig::new(backbone.out_features(), self.bottleneck_dim).init(device),
            bn: BatchNormConfig::new(self.bottleneck_dim).init(device),
            relu: Relu::new(),
        };
        let head = LinearConfig::new(self.bottleneck_dim, self.num_classes).init(device);

        ImageClassifier {
            backbone,
            bottleneck,
            head,
            num_classes: self.num_classes,
        }
    }
}

/// Linear → BatchNorm → ReLU projection of backbone features
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    pub fc: Linear<B>,
    pub bn: BatchNorm<B>,
    pub relu: Relu,
}

impl<B: Backend> Bottleneck<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc.forward(x);
        let x = batch_norm_1d(&self.bn, x);
        self.relu.forward(x)
    }

    pub fn out_features(&self) -> usize {
        self.fc.weight.val().dims()[1]
    }
}

#[derive(Module, Debug)]
pub struct ImageClassifier<B: Backend> {
    pub backbone: Backbone<B>,
    pub bottleneck: Bottleneck<B>,
    pub head: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> ImageClassifier<B> {
    /// Returns `(logits [N, num_classes], features [N, bottleneck_dim])`
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let features = self.features(x);
        let logits = self.head.forward(features.clone());
        (logits, features)
    }

    pub fn features(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.bottleneck.forward(self.backbone.forward(x))
    }

    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let (logits, _) = self.forward(x);
        softmax(logits, 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn features_dim(&self) -> usize {
        self.bottleneck.out_features()
    }
}
