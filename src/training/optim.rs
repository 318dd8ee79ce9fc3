//! Per-module SGD
//!
//! Each trainable part (backbone, bottleneck, head, discriminator, every
//! ensemble head) gets its own SGD optimizer, learning-rate multiplier and
//! schedule, so parts can be stepped independently.

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{GradientsParams, Optimizer, Sgd, SgdConfig};
use burn::tensor::backend::AutodiffBackend;

use super::config::ExperimentConfig;
use super::scheduler::{LRScheduler, StepwiseLr};

/// Nesterov SGD with weight decay, as used for every parameter group
pub fn sgd_config(momentum: f64, weight_decay: f64) -> SgdConfig {
    SgdConfig::new()
        .with_momentum(Some(
            MomentumConfig::new()
                .with_momentum(momentum)
                .with_dampening(0.0)
                .with_nesterov(true),
        ))
        .with_weight_decay(Some(WeightDecayConfig::new(weight_decay as f32)))
}

/// One module's optimizer with its learning-rate multiplier and schedule
pub struct SgdGroup<B: AutodiffBackend, M: AutodiffModule<B>> {
    optimizer: OptimizerAdaptor<Sgd<B::InnerBackend>, M, B>,
    schedule: StepwiseLr,
    lr_mult: f64,
}

impl<B: AutodiffBackend, M: AutodiffModule<B>> SgdGroup<B, M> {
    pub fn new(scheduler: LRScheduler, lr_mult: f64, momentum: f64, weight_decay: f64) -> Self {
        Self {
            optimizer: sgd_config(momentum, weight_decay).init(),
            schedule: StepwiseLr::new(scheduler),
            lr_mult,
        }
    }

    /// Group on the inverse-decay schedule of `config`
    pub fn from_config(config: &ExperimentConfig, lr_mult: f64) -> Self {
        Self::new(
            LRScheduler::inverse_decay(config.lr),
            lr_mult,
            config.momentum,
            config.weight_decay,
        )
    }

    /// Apply `grads` to `module` at the scheduled rate and advance the schedule
    pub fn step(&mut self, module: M, grads: GradientsParams) -> M {
        let lr = self.schedule.next_lr() * self.lr_mult;
        self.optimizer.step(lr, module, grads)
    }

    pub fn current_lr(&self) -> f64 {
        self.schedule.current_lr() * self.lr_mult
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::nn::{Linear, LinearConfig};
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_group_steps_module_and_schedule() {
        let device = Default::default();
        let linear: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
        let before: Vec<f32> = linear.weight.val().into_data().to_vec().unwrap();

        let mut group = SgdGroup::<TestBackend, Linear<TestBackend>>::new(
            LRScheduler::inverse_decay(0.1),
            0.1,
            0.9,
            1e-3,
        );
        assert!((group.current_lr() - 0.01).abs() < 1e-12);

        let x = Tensor::<TestBackend, 2>::ones([4, 3], &device);
        let loss = linear.forward(x).sum();
        let mut grads = loss.backward();
        let grads = GradientsParams::from_module(&mut grads, &linear);

        let linear = group.step(linear, grads);
        let after: Vec<f32> = linear.weight.val().into_data().to_vec().unwrap();

        assert_ne!(before, after);
        assert!(group.current_lr() < 0.01);
    }
}
