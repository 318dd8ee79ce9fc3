//! Adaptation training loop
//!
//! One epoch runs four phases in order:
//!
//! 1. main adversarial training, with target samples weighted by the frozen
//!    ensemble and source samples by the class mask
//! 2. training of every ensemble head on its own bootstrap view of the source
//! 3. a validation pass that rebuilds the class mask
//! 4. open-set validation, snapshotting the model when mean accuracy improves
//!
//! After the last epoch the best snapshot (classifier and ensemble of the
//! best validation epoch, kept in memory and mirrored to disk) is evaluated
//! on the test split.

use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::Linear;
use burn::optim::GradientsParams;
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor, TensorData};
use colored::Colorize;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::checkpoint::{best_paths, CheckpointBundle, CheckpointMeta};
use super::config::ExperimentConfig;
use super::optim::SgdGroup;
use super::scheduler::LRScheduler;
use super::weighting::{AdaptiveBounds, ClassWeights};
use crate::dataset::{DomainSplits, ForeverBatches, ImageBatch, ImageBatcher, ImageItem};
use crate::inference::diagnostics::{domain_name, write_diagnostics, DiagnosticsReport};
use crate::inference::evaluate::{collect_outputs, evaluate_source_common, to_vec, validate, PassOutputs};
use crate::inference::open_set::OpenSetMetrics;
use crate::inference::uncertainty::{entropy, marginal_confidence, open_set_score};
use crate::model::{
    Backbone, Bottleneck, DomainAdversarialLoss, DomainDiscriminator, DomainDiscriminatorConfig,
    Ensemble, ImageClassifier, ImageClassifierConfig,
};
use crate::utils::error::{ensure_finite, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::meters::{AverageMeter, ProgressMeter};

/// Learning-rate multiplier of the pretrained backbone
const BACKBONE_LR_MULT: f64 = 0.1;
/// Offset between the data-stream seeds of one run
const TARGET_SEED_OFFSET: u64 = 1;
const ENSEMBLE_SEED_OFFSET: u64 = 100;

/// Statistics of one main training iteration
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IterationStats {
    pub loss: f64,
    /// Source classification accuracy in [0, 1]
    pub cls_acc: f64,
    /// Discriminator accuracy in [0, 1]
    pub domain_acc: f64,
    pub score_upper: f32,
    pub score_lower: f32,
}

/// State carried from one epoch to the next
#[derive(Debug, Clone)]
pub struct EpochState {
    pub bounds: AdaptiveBounds,
    pub class_weights: ClassWeights,
    pub best_accuracy: f64,
    pub best_epoch: Option<usize>,
}

impl EpochState {
    pub fn new(num_source_classes: usize) -> Self {
        Self {
            bounds: AdaptiveBounds::new(),
            class_weights: ClassWeights::ones(num_source_classes),
            best_accuracy: f64::NEG_INFINITY,
            best_epoch: None,
        }
    }

    /// Record `accuracy` for `epoch`; true when it strictly beats the best so far
    pub fn observe(&mut self, epoch: usize, accuracy: f64) -> bool {
        if accuracy > self.best_accuracy {
            self.best_accuracy = accuracy;
            self.best_epoch = Some(epoch);
            true
        } else {
            false
        }
    }
}

/// Summary of one epoch
#[derive(Debug, Clone, Serialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f64,
    pub domain_accuracy: f64,
    pub enabled_classes: usize,
    pub mean_accuracy: f64,
    pub h_score: f64,
}

/// Result of a full run
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub best_epoch: Option<usize>,
    pub best_mean_accuracy: f64,
    pub test: OpenSetMetrics,
    pub history: Vec<EpochRecord>,
    pub diagnostics: Option<DiagnosticsReport>,
}

/// Models, optimizers and batchers of one adaptation run
pub struct Trainer<B: AutodiffBackend> {
    config: ExperimentConfig,
    device: B::Device,
    pub classifier: ImageClassifier<B>,
    pub discriminator: DomainDiscriminator<B>,
    pub ensemble: Ensemble<B>,
    domain_adv: DomainAdversarialLoss,
    backbone_opt: SgdGroup<B, Backbone<B>>,
    bottleneck_opt: SgdGroup<B, Bottleneck<B>>,
    head_opt: SgdGroup<B, Linear<B>>,
    discriminator_opt: SgdGroup<B, DomainDiscriminator<B>>,
    ensemble_opts: Vec<SgdGroup<B, Linear<B>>>,
    train_batcher: ImageBatcher,
    eval_batcher: ImageBatcher,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: ExperimentConfig, device: B::Device) -> Result<Self> {
        config.validate()?;
        let seed = config.effective_seed();
        B::seed(&device, seed);

        let num_classes = config.partition.num_source_classes();
        let mut classifier = ImageClassifierConfig::new(num_classes, config.arch.config())
            .with_bottleneck_dim(config.bottleneck_dim)
            .init::<B>(&device);
        if let Some(weights) = &config.backbone_weights {
            classifier.backbone = classifier.backbone.load_pretrained(weights, &device)?;
        }

        let features_dim = classifier.features_dim();
        let discriminator = DomainDiscriminatorConfig::new(features_dim)
            .with_hidden_size(config.discriminator_hidden)
            .init(&device);
        let ensemble = Ensemble::new(features_dim, num_classes, &device);
        let ensemble_opts = (0..ensemble.len())
            .map(|_| SgdGroup::from_config(&config, 1.0))
            .collect();

        info!(
            "{} (backbone x{})",
            LRScheduler::inverse_decay(config.lr).description(),
            BACKBONE_LR_MULT
        );
        info!(
            "Model: {} backbone, {} source classes, {}-d features, {} ensemble heads",
            config.arch,
            num_classes,
            features_dim,
            ensemble.len()
        );

        Ok(Self {
            backbone_opt: SgdGroup::from_config(&config, BACKBONE_LR_MULT),
            bottleneck_opt: SgdGroup::from_config(&config, 1.0),
            head_opt: SgdGroup::from_config(&config, 1.0),
            discriminator_opt: SgdGroup::from_config(&config, 1.0),
            ensemble_opts,
            train_batcher: ImageBatcher::train(config.crop_size, seed),
            eval_batcher: ImageBatcher::eval(config.crop_size),
            domain_adv: DomainAdversarialLoss::default(),
            classifier,
            discriminator,
            ensemble,
            config,
            device,
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    fn weight_tensor(&self, weights: Vec<f32>) -> Tensor<B, 1> {
        let n = weights.len();
        Tensor::from_floats(TensorData::new(weights, [n]), &self.device)
    }

    /// Source cross-entropy, weighted by the class mask when enabled.
    ///
    /// Falls back to the plain mean when the batch holds no enabled class.
    fn classification_loss(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>, weights: &[f32]) -> Tensor<B, 1> {
        let [n, _] = logits.dims();
        let per_sample = log_softmax(logits, 1)
            .gather(1, targets.reshape([n, 1]))
            .reshape([n])
            .neg();

        let total: f32 = weights.iter().sum();
        if !self.config.mask_classification_loss || total <= 0.0 {
            return per_sample.mean();
        }
        (per_sample * self.weight_tensor(weights.to_vec()))
            .sum()
            .div_scalar(total)
    }

    /// Apply one backward pass to the backbone, bottleneck and head
    fn step_classifier(&mut self, grads: &mut B::Gradients) {
        let backbone = self.classifier.backbone.clone();
        let backbone_grads = GradientsParams::from_module(grads, &backbone);
        self.classifier.backbone = self.backbone_opt.step(backbone, backbone_grads);

        let bottleneck = self.classifier.bottleneck.clone();
        let bottleneck_grads = GradientsParams::from_module(grads, &bottleneck);
        self.classifier.bottleneck = self.bottleneck_opt.step(bottleneck, bottleneck_grads);

        let head = self.classifier.head.clone();
        let head_grads = GradientsParams::from_module(grads, &head);
        self.classifier.head = self.head_opt.step(head, head_grads);
    }

    /// Source-only warm-up of the classifier
    pub fn pretrain(&mut self, source: &mut ForeverBatches) -> Result<()> {
        let iters = self.config.iters_per_epoch;
        for epoch in 0..self.config.pretrain_epochs {
            let mut losses = AverageMeter::new("Loss", 2);
            let mut cls_accs = AverageMeter::new("Cls Acc", 1);
            let progress = ProgressMeter::new(iters, format!("Pretrain: [{}]", epoch));

            for i in 0..iters {
                let batch: ImageBatch<B> = source.next_batch(&self.train_batcher, &self.device)?;
                let n = batch.len();
                let (logits, _) = self.classifier.forward(batch.images);
                let loss = self.classification_loss(logits.clone(), batch.targets.clone(), &[]);
                let loss_value = ensure_finite(loss.clone().into_scalar().elem::<f64>(), "pretraining loss")?;

                losses.update(loss_value, n);
                cls_accs.update(batch_accuracy(logits, batch.targets) * 100.0, n);

                let mut grads = loss.backward();
                self.step_classifier(&mut grads);

                if i % self.config.print_freq == 0 {
                    progress.display(i, &[&losses, &cls_accs]);
                }
            }
        }
        Ok(())
    }

    /// Adversarial training for `iters_per_epoch` iterations
    pub fn train_main(
        &mut self,
        epoch: usize,
        source: &mut ForeverBatches,
        target: &mut ForeverBatches,
        state: &mut EpochState,
    ) -> Result<Vec<IterationStats>> {
        let iters = self.config.iters_per_epoch;
        let mut losses = AverageMeter::new("Loss", 2);
        let mut cls_accs = AverageMeter::new("Cls Acc", 1);
        let mut domain_accs = AverageMeter::new("Domain Acc", 1);
        let mut score_upper = AverageMeter::new("Score Upper", 2);
        let mut score_lower = AverageMeter::new("Score Lower", 2);
        let progress = ProgressMeter::new(iters, format!("Epoch: [{}]", epoch));
        let mut stats = Vec::with_capacity(iters);

        for i in 0..iters {
            let source_items = source.next_items()?;
            let labels: Vec<usize> = source_items.iter().map(|item| item.label).collect();
            let source_batch: ImageBatch<B> = self.train_batcher.batch(source_items, &self.device);
            let target_batch: ImageBatch<B> = target.next_batch(&self.train_batcher, &self.device)?;
            let n_s = source_batch.len();

            let (y_s, f_s) = self.classifier.forward(source_batch.images);
            let (_, f_t) = self.classifier.forward(target_batch.images);

            // frozen ensemble on detached target features
            let heads = self.ensemble.valid().forward_all(f_t.clone().inner());
            let scores = to_vec(open_set_score(marginal_confidence(&heads), entropy(&heads)))?;
            let (upper, lower) = state.bounds.update(&scores)?;
            let w_t = state.bounds.normalize_all(&scores);
            let w_s = state.class_weights.for_labels(&labels);

            let cls_loss = self.classification_loss(y_s.clone(), source_batch.targets.clone(), &w_s);
            let w_s = self.weight_tensor(w_s);
            let w_t = self.weight_tensor(w_t);
            let transfer_loss = self.domain_adv.forward(&self.discriminator, f_s, f_t, w_s, w_t);
            let loss = cls_loss + transfer_loss.mul_scalar(self.config.trade_off);

            let loss_value = ensure_finite(loss.clone().into_scalar().elem::<f64>(), "training loss")?;
            let iteration = IterationStats {
                loss: loss_value,
                cls_acc: batch_accuracy(y_s, source_batch.targets),
                domain_acc: self.domain_adv.domain_accuracy,
                score_upper: upper,
                score_lower: lower,
            };

            let mut grads = loss.backward();
            self.step_classifier(&mut grads);
            let discriminator = self.discriminator.clone();
            let discriminator_grads = GradientsParams::from_module(&mut grads, &discriminator);
            self.discriminator = self.discriminator_opt.step(discriminator, discriminator_grads);

            losses.update(iteration.loss, n_s);
            cls_accs.update(iteration.cls_acc * 100.0, n_s);
            domain_accs.update(iteration.domain_acc * 100.0, n_s);
            score_upper.update(upper as f64, 1);
            score_lower.update(lower as f64, 1);
            stats.push(iteration);

            if i % self.config.print_freq == 0 {
                progress.display(
                    i,
                    &[&losses, &cls_accs, &domain_accs, &score_upper, &score_lower],
                );
            }
        }

        Ok(stats)
    }

    /// Train ensemble head `index` on frozen, eval-mode features
    pub fn train_ensemble_head(&mut self, epoch: usize, index: usize, stream: &mut ForeverBatches) -> Result<f64> {
        let iters = self.config.ensemble_iters();
        let frozen = self.classifier.valid();
        let loss_fn = CrossEntropyLossConfig::new().init::<B>(&self.device);

        let mut losses = AverageMeter::new("Loss", 2);
        let mut cls_accs = AverageMeter::new("Cls Acc", 1);
        let progress = ProgressMeter::new(iters, format!("Esem: [{}-{}]", epoch, index));

        for i in 0..iters {
            let batch: ImageBatch<B> = stream.next_batch(&self.train_batcher, &self.device)?;
            let n = batch.len();
            let features = Tensor::<B, 2>::from_inner(frozen.features(batch.images.inner()));

            let logits = self.ensemble.forward_head(index, features);
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
            let loss_value = ensure_finite(loss.clone().into_scalar().elem::<f64>(), "ensemble loss")?;

            losses.update(loss_value, n);
            cls_accs.update(batch_accuracy(logits, batch.targets) * 100.0, n);

            let mut grads = loss.backward();
            let head = self.ensemble.heads[index].clone();
            let head_grads = GradientsParams::from_module(&mut grads, &head);
            self.ensemble.heads[index] = self.ensemble_opts[index].step(head, head_grads);

            if i % self.config.print_freq == 0 {
                progress.display(i, &[&losses, &cls_accs]);
            }
        }

        Ok(losses.avg())
    }

    /// Eval-mode pass of the classifier and ensemble over `dataset`
    pub fn evaluate(&self, dataset: &dyn Dataset<ImageItem>) -> Result<PassOutputs> {
        collect_outputs(
            &self.classifier.valid(),
            &self.ensemble.valid(),
            dataset,
            &self.eval_batcher,
            self.config.batch_size,
            &self.device,
        )
    }

    fn snapshot(&self) -> CheckpointBundle<B::InnerBackend> {
        CheckpointBundle {
            classifier: self.classifier.valid(),
            ensemble: self.ensemble.valid(),
        }
    }

    /// Full schedule: optional pretraining, epochs, then test on the best snapshot
    pub fn fit(&mut self, splits: &DomainSplits) -> Result<ExperimentReport> {
        let config = self.config.clone();
        let seed = config.effective_seed();
        let partition = config.partition;
        let (record_path, meta_path) = best_paths(&config.output_dir);

        let mut source = ForeverBatches::shuffled(splits.source.clone(), config.batch_size, seed)?;
        let mut target = ForeverBatches::shuffled(
            splits.target.clone(),
            config.batch_size,
            seed.wrapping_add(TARGET_SEED_OFFSET),
        )?;
        let mut ensemble_streams = (0..self.ensemble.len())
            .map(|head| {
                ForeverBatches::bootstrap(
                    splits.source.clone(),
                    config.batch_size,
                    seed.wrapping_add(ENSEMBLE_SEED_OFFSET),
                    head,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        if config.pretrain_epochs > 0 {
            println!("{}", "Pretraining on source...".cyan().bold());
            self.pretrain(&mut source)?;
        }

        let mut state = EpochState::new(partition.num_source_classes());
        let mut history = Vec::with_capacity(config.epochs);
        let mut logger = TrainingLogger::new(config.epochs);
        let mut best: Option<CheckpointBundle<B::InnerBackend>> = None;

        for epoch in 0..config.epochs {
            logger.start_epoch(epoch);

            let stats = self.train_main(epoch, &mut source, &mut target, &mut state)?;
            for (index, stream) in ensemble_streams.iter_mut().enumerate() {
                let loss = self.train_ensemble_head(epoch, index, stream)?;
                debug!("Ensemble head {} mean loss {:.4}", index, loss);
            }

            let outputs = self.evaluate(&*splits.val)?;
            state.class_weights =
                evaluate_source_common(&outputs, &partition, config.source_threshold as f32)?;
            let metrics = validate(&outputs, &partition, config.threshold as f32);
            logger.end_epoch(metrics.mean_accuracy, metrics.h_score);

            let previous = state.best_accuracy;
            if state.observe(epoch, metrics.mean_accuracy) {
                if previous.is_finite() {
                    logger.log_new_best(previous, metrics.mean_accuracy);
                }
                let meta = CheckpointMeta::new(epoch, metrics.mean_accuracy, metrics.h_score, &config);
                let snapshot = self.snapshot();
                snapshot.save(&record_path, &meta, &meta_path)?;
                best = Some(snapshot);
            }

            let count = stats.len().max(1) as f64;
            history.push(EpochRecord {
                epoch,
                loss: stats.iter().map(|s| s.loss).sum::<f64>() / count,
                domain_accuracy: stats.iter().map(|s| s.domain_acc).sum::<f64>() / count,
                enabled_classes: state.class_weights.num_enabled(),
                mean_accuracy: metrics.mean_accuracy,
                h_score: metrics.h_score,
            });
        }
        logger.log_complete(state.best_accuracy);

        // the in-memory copy of the best epoch is what gets tested
        let best = match best {
            Some(bundle) => bundle,
            None => {
                warn!("No snapshot was saved; testing the final model");
                self.snapshot()
            }
        };
        let test_outputs = collect_outputs(
            &best.classifier,
            &best.ensemble,
            &*splits.test,
            &self.eval_batcher,
            config.batch_size,
            &self.device,
        )?;
        println!("{}", "Test results (best snapshot):".green().bold());
        let test = validate(&test_outputs, &partition, config.threshold as f32);

        let diagnostics = if config.diagnostics {
            Some(write_diagnostics(
                &test_outputs,
                &partition,
                &domain_name(&config.source),
                &domain_name(&config.target),
                &config.output_dir.join("diagnostics"),
            )?)
        } else {
            None
        };

        Ok(ExperimentReport {
            best_epoch: state.best_epoch,
            best_mean_accuracy: state.best_accuracy.max(0.0),
            test,
            history,
            diagnostics,
        })
    }
}

/// Top-1 accuracy of `logits` against `targets`, in [0, 1]
pub fn batch_accuracy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f64 {
    let n = targets.dims()[0];
    if n == 0 {
        return 0.0;
    }
    let correct: i64 = logits
        .argmax(1)
        .reshape([n])
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as f64 / n as f64
}

/// Path of the JSON report written by [`run_experiment`]
pub fn report_path(config: &ExperimentConfig) -> PathBuf {
    config.output_dir.join("report.json")
}

/// Load the data, train and test; writes the config, best snapshot and report
/// into `config.output_dir`.
pub fn run_experiment<B: AutodiffBackend>(config: ExperimentConfig, device: B::Device) -> Result<ExperimentReport> {
    config.validate()?;
    std::fs::create_dir_all(&config.output_dir)?;
    config.save(&config.output_dir.join("config.json"))?;

    let splits = DomainSplits::load(&config)?;
    let mut trainer = Trainer::<B>::new(config, device)?;
    let report = trainer.fit(&splits)?;

    let path = report_path(trainer.config());
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    info!("Report written to {:?}", path);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ClassPartition;
    use crate::model::BackboneArch;
    use burn::backend::Autodiff;
    use burn::data::dataset::InMemDataset;
    use burn_ndarray::NdArray;
    use std::sync::Arc;

    type TestBackend = Autodiff<NdArray>;

    fn tiny_config(output_dir: PathBuf) -> ExperimentConfig {
        ExperimentConfig {
            partition: ClassPartition::new(2, 1, 4).unwrap(),
            arch: BackboneArch::CnnLite,
            bottleneck_dim: 8,
            discriminator_hidden: 8,
            epochs: 1,
            iters_per_epoch: 2,
            batch_size: 2,
            print_freq: 1,
            resize_size: 10,
            crop_size: 8,
            seed: Some(7),
            output_dir,
            ..ExperimentConfig::default()
        }
    }

    fn items(labels: &[usize]) -> Vec<ImageItem> {
        labels
            .iter()
            .enumerate()
            .map(|(i, &label)| {
                let value = (i as f32 * 0.13 + label as f32 * 0.21) % 1.0;
                ImageItem::from_data(vec![value; 3 * 10 * 10], 10, label, format!("{i}.png"))
            })
            .collect()
    }

    #[test]
    fn test_epoch_state_strict_improvement() {
        let mut state = EpochState::new(3);
        assert!(state.observe(0, 0.0));
        assert!(!state.observe(1, 0.0));
        assert!(state.observe(2, 0.4));
        assert_eq!(state.best_epoch, Some(2));
        assert_eq!(state.class_weights.as_slice(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_batch_accuracy() {
        let device = Default::default();
        let logits = Tensor::<NdArray, 2>::from_floats([[2.0, 0.0], [0.0, 1.0], [3.0, 1.0]], &device);
        let targets = Tensor::<NdArray, 1, Int>::from_ints([0, 1, 1], &device);
        assert!((batch_accuracy(logits, targets) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_train_main_stats_are_finite() {
        let dir = tempfile::tempdir().unwrap();
        let config = tiny_config(dir.path().to_path_buf());
        let mut trainer = Trainer::<TestBackend>::new(config, Default::default()).unwrap();

        let source: Arc<dyn Dataset<ImageItem>> = Arc::new(InMemDataset::new(items(&[0, 1, 2, 0, 1, 2])));
        let target: Arc<dyn Dataset<ImageItem>> = Arc::new(InMemDataset::new(items(&[0, 1, 3, 3])));
        let mut source = ForeverBatches::shuffled(source, 2, 1).unwrap();
        let mut target = ForeverBatches::shuffled(target, 2, 2).unwrap();

        let mut state = EpochState::new(3);
        let stats = trainer.train_main(0, &mut source, &mut target, &mut state).unwrap();

        assert_eq!(stats.len(), 2);
        for s in &stats {
            assert!(s.loss.is_finite() && s.loss >= 0.0);
            assert!((0.0..=1.0).contains(&s.domain_acc));
            assert!((0.0..=1.0).contains(&s.cls_acc));
            assert!(s.score_upper >= s.score_lower);
        }
        assert_eq!(trainer.domain_adv.grl.iteration(), 2);
    }

    #[test]
    fn test_ensemble_head_training_touches_only_its_head() {
        let dir = tempfile::tempdir().unwrap();
        let config = tiny_config(dir.path().to_path_buf());
        let mut trainer = Trainer::<TestBackend>::new(config, Default::default()).unwrap();

        let read = |linear: &Linear<TestBackend>| -> Vec<f32> {
            linear.weight.val().into_data().to_vec().unwrap()
        };
        let before: Vec<Vec<f32>> = trainer.ensemble.heads.iter().map(read).collect();

        let source: Arc<dyn Dataset<ImageItem>> = Arc::new(InMemDataset::new(items(&[0, 1, 2, 0])));
        let mut stream = ForeverBatches::bootstrap(source, 2, 3, 1).unwrap();
        let loss = trainer.train_ensemble_head(0, 1, &mut stream).unwrap();
        assert!(loss.is_finite());

        let after: Vec<Vec<f32>> = trainer.ensemble.heads.iter().map(read).collect();
        assert_ne!(before[1], after[1]);
        for i in [0, 2, 3, 4] {
            assert_eq!(before[i], after[i]);
        }
    }

    /// Two 12x12 PNGs per class for `num_classes` classes, listed in amazon.txt and webcam.txt
    fn write_domain_lists(root: &std::path::Path, num_classes: usize) {
        std::fs::create_dir_all(root).unwrap();
        let mut list = String::new();
        for label in 0..num_classes {
            for k in 0..2u8 {
                let name = format!("c{label}_{k}.png");
                let image = image::RgbImage::from_fn(12, 12, |x, y| {
                    image::Rgb([(x * 20) as u8, (y * 20) as u8, label as u8 * 60 + k * 10])
                });
                image.save(root.join(&name)).unwrap();
                list.push_str(&format!("{name} {label}\n"));
            }
        }
        std::fs::write(root.join("amazon.txt"), &list).unwrap();
        std::fs::write(root.join("webcam.txt"), &list).unwrap();
    }

    fn list_config(dir: &std::path::Path, num_classes: usize) -> ExperimentConfig {
        let root = dir.join("data");
        write_domain_lists(&root, num_classes);
        let mut config = tiny_config(dir.join("out"));
        config.root = root;
        config.source = PathBuf::from("amazon.txt");
        config.target = PathBuf::from("webcam.txt");
        config
    }

    #[test]
    fn test_run_experiment_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = list_config(dir.path(), 4);
        config.diagnostics = true;

        let report = run_experiment::<TestBackend>(config.clone(), Default::default()).unwrap();
        assert_eq!(report.history.len(), 1);
        assert_eq!(report.best_epoch, Some(0));
        assert!(report.history[0].loss.is_finite());
        assert!((0.0..=1.0).contains(&report.test.mean_accuracy));
        assert!((0.0..=1.0).contains(&report.test.h_score));

        let (record, meta) = best_paths(&config.output_dir);
        assert!(meta.exists());
        assert!(record.with_extension("mpk").exists());
        assert!(report_path(&config).exists());
        assert!(report.diagnostics.unwrap().f1_table.exists());
    }

    #[test]
    fn test_common_only_partition_keeps_losses_finite() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = tiny_config(dir.path().to_path_buf());
        config.partition = ClassPartition::new(2, 0, 2).unwrap();
        config.iters_per_epoch = 4;
        let mut trainer = Trainer::<TestBackend>::new(config, Default::default()).unwrap();

        let labels: Vec<usize> = (0..10).map(|i| i % 2).collect();
        let source: Arc<dyn Dataset<ImageItem>> = Arc::new(InMemDataset::new(items(&labels)));
        let target: Arc<dyn Dataset<ImageItem>> = Arc::new(InMemDataset::new(items(&labels[..6])));
        let mut source = ForeverBatches::shuffled(source, 2, 5).unwrap();
        let mut target = ForeverBatches::shuffled(target, 2, 6).unwrap();

        let mut state = EpochState::new(2);
        for epoch in 0..2 {
            let stats = trainer.train_main(epoch, &mut source, &mut target, &mut state).unwrap();
            assert_eq!(stats.len(), 4);
            for s in &stats {
                assert!(s.loss.is_finite() && s.loss >= 0.0);
                assert!((0.0..=1.0).contains(&s.domain_acc));
            }
        }
        assert_eq!(trainer.domain_adv.grl.iteration(), 8);
    }

    #[test]
    fn test_run_experiment_with_common_only_partition() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = list_config(dir.path(), 2);
        config.partition = ClassPartition::new(2, 0, 2).unwrap();
        config.iters_per_epoch = 3;

        let report = run_experiment::<TestBackend>(config, Default::default()).unwrap();
        assert!(report.history[0].loss.is_finite() && report.history[0].loss >= 0.0);
        assert!((0.0..=1.0).contains(&report.history[0].domain_accuracy));
        // the target has no private classes, so nothing can be rejected correctly
        assert_eq!(report.test.unknown_accuracy, 0.0);
        assert_eq!(report.test.h_score, 0.0);
    }

    #[test]
    fn test_test_metrics_come_from_the_best_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = list_config(dir.path(), 4);
        config.epochs = 3;

        let report = run_experiment::<TestBackend>(config.clone(), Default::default()).unwrap();
        let best_epoch = report.best_epoch.unwrap();
        assert_eq!(report.history[best_epoch].mean_accuracy, report.best_mean_accuracy);

        // the record on disk is the exact best-epoch bundle the test pass used
        let device: <TestBackend as Backend>::Device = Default::default();
        let (record, _) = best_paths(&config.output_dir);
        let trainer = Trainer::<TestBackend>::new(config.clone(), device.clone()).unwrap();
        let restored = trainer.snapshot().load(&record, &device).unwrap();
        let splits = DomainSplits::load(&config).unwrap();
        let outputs = collect_outputs(
            &restored.classifier,
            &restored.ensemble,
            &*splits.test,
            &trainer.eval_batcher,
            config.batch_size,
            &device,
        )
        .unwrap();
        assert_eq!(validate(&outputs, &config.partition, config.threshold as f32), report.test);
    }
}
