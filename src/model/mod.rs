//! Model Module
//!
//! - `backbone`: convolutional feature extractor
//! - `classifier`: backbone + bottleneck + source-class head
//! - `discriminator`: domain discriminator and the weighted adversarial loss
//! - `grl`: gradient reversal with a warm-start coefficient
//! - `ensemble`: auxiliary heads used as an uncertainty estimator

pub mod backbone;
pub mod classifier;
pub mod discriminator;
pub mod ensemble;
pub mod grl;

pub use backbone::{Backbone, BackboneArch, BackboneConfig};
pub use classifier::{Bottleneck, ImageClassifier, ImageClassifierConfig};
pub use discriminator::{DomainAdversarialLoss, DomainDiscriminator, DomainDiscriminatorConfig};
pub use ensemble::Ensemble;
pub use grl::{reverse_gradient, GradientReverseSchedule};

use burn::nn::BatchNorm;
use burn::tensor::{backend::Backend, Tensor};

/// Batch-normalize `[N, C]` features (BatchNorm expects a spatial dim)
pub(crate) fn batch_norm_1d<B: Backend>(bn: &BatchNorm<B>, x: Tensor<B, 2>) -> Tensor<B, 2> {
    let [n, c] = x.dims();
    bn.forward(x.reshape([n, c, 1])).reshape([n, c])
}
