//! Evaluation passes over labeled target data
//!
//! A pass runs the classifier and the ensemble over a dataset in order and
//! keeps everything later steps need on the host: labels, predictions,
//! classifier softmax rows and the three ensemble estimates. Scores are
//! computed from pass-wide min-max normalized estimates.

use burn::data::dataset::Dataset;
use burn::data::dataloader::batcher::Batcher;
use burn::tensor::{activation::softmax, backend::Backend, Tensor};
use tracing::{debug, info};

use super::open_set::{AccuracyCounter, OpenSetMetrics};
use super::uncertainty::{self, histogram, min_max_normalize, open_set_score_value};
use crate::dataset::{ClassPartition, ImageBatch, ImageBatcher, ImageItem, OrderedBatches};
use crate::model::{Ensemble, ImageClassifier};
use crate::training::weighting::{recompute_class_weights, ClassWeights};
use crate::utils::error::{DaError, Result};
use crate::utils::format_vector;

/// Number of histogram bins for score logs
const SCORE_BINS: usize = 20;

/// Host-side outputs of one evaluation pass
#[derive(Debug, Clone, Default)]
pub struct PassOutputs {
    pub labels: Vec<usize>,
    pub predictions: Vec<usize>,
    /// Classifier softmax row per sample
    pub softmax: Vec<Vec<f32>>,
    pub margin: Vec<f32>,
    pub entropy: Vec<f32>,
    pub confidence: Vec<f32>,
}

impl PassOutputs {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn normalized_margin(&self) -> Vec<f32> {
        min_max_normalize(&self.margin)
    }

    pub fn normalized_entropy(&self) -> Vec<f32> {
        min_max_normalize(&self.entropy)
    }

    pub fn normalized_confidence(&self) -> Vec<f32> {
        min_max_normalize(&self.confidence)
    }

    /// `(norm(margin) + 1 - norm(entropy)) / 2` per sample
    pub fn scores(&self) -> Vec<f32> {
        self.normalized_margin()
            .iter()
            .zip(self.normalized_entropy())
            .map(|(&m, e)| open_set_score_value(m, e))
            .collect()
    }

    /// 1 for samples of a class the source also has, 0 otherwise
    pub fn common_mask(&self, partition: &ClassPartition) -> Vec<bool> {
        self.labels
            .iter()
            .map(|&l| partition.is_source_class(l))
            .collect()
    }
}

pub(crate) fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| DaError::Model(format!("cannot read tensor data: {:?}", e)))
}

/// Run the classifier and ensemble over `dataset` (no gradients)
pub fn collect_outputs<B: Backend>(
    classifier: &ImageClassifier<B>,
    ensemble: &Ensemble<B>,
    dataset: &dyn Dataset<ImageItem>,
    batcher: &ImageBatcher,
    batch_size: usize,
    device: &B::Device,
) -> Result<PassOutputs> {
    let num_classes = classifier.num_classes();
    let mut out = PassOutputs::default();

    for items in OrderedBatches::new(dataset, batch_size) {
        out.labels.extend(items.iter().map(|item| item.label));
        let batch: ImageBatch<B> = batcher.batch(items, device);

        let (logits, features) = classifier.forward(batch.images);
        let probs = softmax(logits, 1);
        let heads = ensemble.forward_all(features);

        let margin = uncertainty::marginal_confidence(&heads);
        let entropy = uncertainty::entropy(&heads);
        let confidence = uncertainty::confidence(&heads);

        let probs = to_vec(probs)?;
        for row in probs.chunks(num_classes) {
            let predicted = row
                .iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (i, &p)| {
                    if p > best.1 {
                        (i, p)
                    } else {
                        best
                    }
                })
                .0;
            out.predictions.push(predicted);
            out.softmax.push(row.to_vec());
        }

        out.margin.extend(to_vec(margin)?);
        out.entropy.extend(to_vec(entropy)?);
        out.confidence.extend(to_vec(confidence)?);
    }

    debug!("Evaluation pass over {} samples", out.len());
    Ok(out)
}

/// Open-set accuracy of a pass at `threshold`
pub fn validate(outputs: &PassOutputs, partition: &ClassPartition, threshold: f32) -> OpenSetMetrics {
    let scores = outputs.scores();
    let mut counter = AccuracyCounter::new(partition.num_source_classes());

    for ((&label, &predicted), &score) in outputs
        .labels
        .iter()
        .zip(&outputs.predictions)
        .zip(&scores)
    {
        let known = partition.is_source_class(label).then_some(label);
        counter.add(known, predicted, score, threshold);
    }

    let metrics = counter.metrics();
    let per_class: Vec<f32> = metrics.per_class.iter().map(|&a| a as f32).collect();
    info!("Per-class accuracy: {}", format_vector(&per_class, 3));
    info!(
        "Mean accuracy: {:.2}% | known: {:.2}% | unknown: {:.2}% | H-score: {:.2}%",
        metrics.mean_accuracy * 100.0,
        metrics.known_accuracy * 100.0,
        metrics.unknown_accuracy * 100.0,
        metrics.h_score * 100.0
    );
    metrics
}

/// Recompute the source class mask from confident validation predictions
/// and log score histograms of common vs target-private samples.
pub fn evaluate_source_common(
    outputs: &PassOutputs,
    partition: &ClassPartition,
    source_threshold: f32,
) -> Result<ClassWeights> {
    let scores = outputs.scores();
    let common = outputs.common_mask(partition);

    let (common_scores, private_scores): (Vec<f32>, Vec<f32>) = {
        let mut c = Vec::new();
        let mut p = Vec::new();
        for (&s, &is_common) in scores.iter().zip(&common) {
            if is_common {
                c.push(s)
            } else {
                p.push(s)
            }
        }
        (c, p)
    };

    info!("source_threshold = {}", source_threshold);
    info!(
        "Common score histogram:  {:?}",
        histogram(&common_scores, SCORE_BINS, 0.0, 1.0)
    );
    info!(
        "Private score histogram: {:?}",
        histogram(&private_scores, SCORE_BINS, 0.0, 1.0)
    );

    let weights = recompute_class_weights(
        &scores,
        &outputs.softmax,
        partition.num_source_classes(),
        source_threshold,
    )?;
    info!(
        "Source class weights ({} of {} enabled): {}",
        weights.num_enabled(),
        weights.len(),
        format_vector(weights.as_slice(), 0)
    );
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackboneConfig, ImageClassifierConfig};
    use burn::data::dataset::InMemDataset;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn outputs() -> PassOutputs {
        // 2 known classes (0, 1), label 2 is target-private
        PassOutputs {
            labels: vec![0, 1, 2, 2],
            predictions: vec![0, 0, 1, 0],
            softmax: vec![
                vec![0.9, 0.1],
                vec![0.6, 0.4],
                vec![0.3, 0.7],
                vec![0.5, 0.5],
            ],
            margin: vec![0.9, 0.5, 0.2, 0.0],
            entropy: vec![0.1, 0.3, 0.8, 1.0],
            confidence: vec![0.95, 0.7, 0.6, 0.5],
        }
    }

    #[test]
    fn test_scores_use_normalized_estimates() {
        let scores = outputs().scores();
        // margin -> [1, 5/9, 2/9, 0], entropy -> [0, 2/9, 7/9, 1]
        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert!((scores[1] - (5.0 / 9.0 + 1.0 - 2.0 / 9.0) / 2.0).abs() < 1e-6);
        assert!(scores[3].abs() < 1e-6);
    }

    #[test]
    fn test_validate_hand_computed() {
        let partition = ClassPartition::new(2, 0, 3).unwrap();
        let metrics = validate(&outputs(), &partition, 0.6);
        // sample 0: known, correct; sample 1: score 0.667, predicted 0 != 1
        // samples 2, 3: unknown with scores 0.222 and 0 -> both rejected
        assert_eq!(metrics.per_class, vec![1.0, 0.0, 1.0]);
        assert!((metrics.known_accuracy - 0.5).abs() < 1e-12);
        assert!((metrics.h_score - 2.0 * 0.5 / 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_source_common_weights() {
        let partition = ClassPartition::new(2, 0, 3).unwrap();
        let weights = evaluate_source_common(&outputs(), &partition, 0.9).unwrap();
        // only sample 0 qualifies: avg [0.9, 0.1] -> [1, 0]
        assert_eq!(weights.as_slice(), &[1.0, 0.0]);
    }

    #[test]
    fn test_collect_outputs_shapes() {
        let device = Default::default();
        let classifier = ImageClassifierConfig::new(
            3,
            BackboneConfig::new().with_base_filters(2).with_num_blocks(1),
        )
        .with_bottleneck_dim(4)
        .init::<TestBackend>(&device);
        let ensemble = Ensemble::<TestBackend>::new(4, 3, &device);

        let items: Vec<ImageItem> = (0..5)
            .map(|i| ImageItem::from_data(vec![i as f32 / 5.0; 3 * 8 * 8], 8, i % 4, format!("{i}.jpg")))
            .collect();
        let dataset = InMemDataset::new(items);

        let out = collect_outputs(&classifier, &ensemble, &dataset, &ImageBatcher::eval(6), 2, &device).unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out.labels, vec![0, 1, 2, 3, 0]);
        assert_eq!(out.softmax.len(), 5);
        assert!(out.softmax.iter().all(|row| row.len() == 3));
        assert!(out.predictions.iter().all(|&p| p < 3));
        assert!(out.entropy.iter().all(|e| (0.0..=1.0 + 1e-5).contains(e)));
    }
}
