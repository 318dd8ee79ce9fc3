//! Domain discriminator and the weighted domain-adversarial loss
//!
//! The discriminator predicts P(source) for a feature vector. Features reach
//! it through a gradient reversal layer, so minimizing its loss trains the
//! discriminator while pushing the feature extractor toward domain-invariant
//! features. Per-sample weights let the training loop down-weight source
//! classes absent from the target and target samples that look private.

use burn::{
    config::Config,
    module::Module,
    nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig, Relu},
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};

use super::batch_norm_1d;
use super::grl::{reverse_gradient, GradientReverseSchedule};

/// Lower clamp on probabilities inside the BCE logs
const BCE_EPS: f64 = 1e-7;

#[derive(Config, Debug)]
pub struct DomainDiscriminatorConfig {
    pub in_features: usize,
    #[config(default = "1024")]
    pub hidden_size: usize,
}

impl DomainDiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DomainDiscriminator<B> {
        DomainDiscriminator {
            fc1: LinearConfig::new(self.in_features, self.hidden_size).init(device),
            bn1: BatchNormConfig::new(self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            bn2: BatchNormConfig::new(self.hidden_size).init(device),
            fc3: LinearConfig::new(self.hidden_size, 1).init(device),
            relu: Relu::new(),
        }
    }
}

/// Linear → BN → ReLU → Linear → BN → ReLU → Linear → Sigmoid
#[derive(Module, Debug)]
pub struct DomainDiscriminator<B: Backend> {
    pub fc1: Linear<B>,
    pub bn1: BatchNorm<B>,
    pub fc2: Linear<B>,
    pub bn2: BatchNorm<B>,
    pub fc3: Linear<B>,
    pub relu: Relu,
}

impl<B: Backend> DomainDiscriminator<B> {
    /// `[N, F]` → P(source) with shape `[N, 1]`
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.relu.forward(batch_norm_1d(&self.bn1, self.fc1.forward(x)));
        let x = self.relu.forward(batch_norm_1d(&self.bn2, self.fc2.forward(x)));
        sigmoid(self.fc3.forward(x))
    }
}

/// Fraction of predictions on the correct side of 0.5
pub fn binary_accuracy(probs: &[f32], is_source: bool) -> f64 {
    if probs.is_empty() {
        return 0.0;
    }
    let correct = probs
        .iter()
        .filter(|&&p| (p >= 0.5) == is_source)
        .count();
    correct as f64 / probs.len() as f64
}

/// Weighted domain-adversarial loss with a warm-start reversal layer
#[derive(Debug, Clone, Default)]
pub struct DomainAdversarialLoss {
    pub grl: GradientReverseSchedule,
    /// Discriminator accuracy of the last call, in [0, 1]
    pub domain_accuracy: f64,
}

impl DomainAdversarialLoss {
    pub fn new(grl: GradientReverseSchedule) -> Self {
        Self {
            grl,
            domain_accuracy: 0.0,
        }
    }

    /// `0.5 · (mean(w_s · BCE(d_s, 1)) + mean(w_t · BCE(d_t, 0)))`.
    ///
    /// Steps the reversal schedule and records the discriminator accuracy.
    pub fn forward<B: Backend>(
        &mut self,
        discriminator: &DomainDiscriminator<B>,
        f_s: Tensor<B, 2>,
        f_t: Tensor<B, 2>,
        w_s: Tensor<B, 1>,
        w_t: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        let n_s = f_s.dims()[0];
        let n_t = f_t.dims()[0];

        let coeff = self.grl.next_coeff();
        let f = reverse_gradient(Tensor::cat(vec![f_s, f_t], 0), coeff);
        let d = discriminator.forward(f);

        let d_s = d.clone().slice([0..n_s, 0..1]).reshape([n_s]);
        let d_t = d.slice([n_s..n_s + n_t, 0..1]).reshape([n_t]);

        let acc_s = d_s.clone().into_data().convert::<f32>().to_vec::<f32>().unwrap_or_default();
        let acc_t = d_t.clone().into_data().convert::<f32>().to_vec::<f32>().unwrap_or_default();
        self.domain_accuracy = 0.5 * (binary_accuracy(&acc_s, true) + binary_accuracy(&acc_t, false));

        let bce_s = d_s.clamp(BCE_EPS, 1.0).log().neg();
        let bce_t = d_t.neg().add_scalar(1.0).clamp(BCE_EPS, 1.0).log().neg();

        (bce_s.mul(w_s).mean() + bce_t.mul(w_t).mean()).mul_scalar(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn discriminator<B: Backend>(device: &B::Device) -> DomainDiscriminator<B> {
        DomainDiscriminatorConfig::new(6).with_hidden_size(8).init(device)
    }

    #[test]
    fn test_discriminator_outputs_probabilities() {
        let device = Default::default();
        let d = discriminator::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 2>::random(
            [5, 6],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let p: Vec<f32> = d.forward(x).into_data().to_vec().unwrap();
        assert_eq!(p.len(), 5);
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_binary_accuracy() {
        assert_eq!(binary_accuracy(&[0.9, 0.6, 0.2, 0.5], true), 0.75);
        assert_eq!(binary_accuracy(&[0.9, 0.6, 0.2, 0.5], false), 0.25);
        assert_eq!(binary_accuracy(&[], true), 0.0);
    }

    #[test]
    fn test_loss_is_finite_and_weighted() {
        let device = Default::default();
        let d = discriminator::<TestBackend>(&device);
        let mut loss_fn = DomainAdversarialLoss::default();

        let f_s = Tensor::<TestBackend, 2>::random([4, 6], burn::tensor::Distribution::Default, &device);
        let f_t = Tensor::<TestBackend, 2>::random([4, 6], burn::tensor::Distribution::Default, &device);
        let ones = Tensor::<TestBackend, 1>::ones([4], &device);
        let zeros = Tensor::<TestBackend, 1>::zeros([4], &device);

        let loss: f32 = loss_fn
            .forward(&d, f_s.clone(), f_t.clone(), ones.clone(), ones.clone())
            .into_scalar();
        assert!(loss.is_finite() && loss > 0.0);
        assert!((0.0..=1.0).contains(&loss_fn.domain_accuracy));
        assert_eq!(loss_fn.grl.iteration(), 1);

        let zero_loss: f32 = loss_fn.forward(&d, f_s, f_t, zeros.clone(), zeros).into_scalar();
        assert_eq!(zero_loss, 0.0);
    }

    #[test]
    fn test_feature_gradient_is_negated_by_reversal() {
        type AdBackend = Autodiff<NdArray>;
        let device = Default::default();
        let d = discriminator::<AdBackend>(&device);
        let mut loss_fn = DomainAdversarialLoss::new(GradientReverseSchedule::new(1.0, 1.0, 1.0, 1000));

        let source_data = TensorData::new((0..12).map(|i| i as f32 / 12.0).collect::<Vec<_>>(), [2, 6]);
        let target_data = TensorData::new((0..12).map(|i| 1.0 - i as f32 / 7.0).collect::<Vec<_>>(), [2, 6]);
        let leaf = |data: &TensorData| Tensor::<AdBackend, 2>::from_data(data.clone(), &device).require_grad();
        let w = Tensor::<AdBackend, 1>::ones([2], &device);

        // coefficient 1: the reversed pass sees exactly the negated gradient
        let f_s = leaf(&source_data);
        let loss = loss_fn.forward(&d, f_s.clone(), leaf(&target_data), w.clone(), w);
        let reversed: Vec<f32> = f_s.grad(&loss.backward()).unwrap().into_data().to_vec().unwrap();

        let plain_s = leaf(&source_data);
        let p = d.forward(Tensor::cat(vec![plain_s.clone(), leaf(&target_data)], 0));
        let p_s = p.clone().slice([0..2, 0..1]).reshape([2]);
        let p_t = p.slice([2..4, 0..1]).reshape([2]);
        let plain_loss = (p_s.clamp(BCE_EPS, 1.0).log().neg().mean()
            + p_t.neg().add_scalar(1.0).clamp(BCE_EPS, 1.0).log().neg().mean())
        .mul_scalar(0.5);
        let plain: Vec<f32> = plain_s.grad(&plain_loss.backward()).unwrap().into_data().to_vec().unwrap();

        assert!(plain.iter().any(|g| g.abs() > 1e-8));
        for (r, g) in reversed.iter().zip(&plain) {
            assert!((r + g).abs() <= 1e-6 + 1e-4 * g.abs(), "{r} vs {g}");
        }
    }
}
