//! Open-set accuracy bookkeeping
//!
//! One bucket per source class plus a final "unknown" bucket for every
//! target-private sample. A known sample counts as correct when its score
//! clears the threshold and the predicted class matches; an unknown sample
//! counts as correct when its score falls below the threshold.

use serde::{Deserialize, Serialize};

/// Per-bucket correct/total counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyCounter {
    correct: Vec<usize>,
    total: Vec<usize>,
}

/// Summary of an open-set evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenSetMetrics {
    /// Accuracy of every non-empty bucket, in bucket order
    pub per_class: Vec<f64>,
    /// Mean over non-empty buckets, unknown included
    pub mean_accuracy: f64,
    /// Mean over non-empty known buckets
    pub known_accuracy: f64,
    /// Accuracy of the unknown bucket (0 when it is empty)
    pub unknown_accuracy: f64,
    pub h_score: f64,
}

impl AccuracyCounter {
    /// Counter over `num_known` known classes plus the unknown bucket
    pub fn new(num_known: usize) -> Self {
        Self {
            correct: vec![0; num_known + 1],
            total: vec![0; num_known + 1],
        }
    }

    pub fn num_known(&self) -> usize {
        self.total.len() - 1
    }

    fn unknown(&self) -> usize {
        self.num_known()
    }

    /// Record one prediction.
    ///
    /// `label` is `Some(class)` for a known sample and `None` for an unknown one.
    pub fn add(&mut self, label: Option<usize>, predicted: usize, score: f32, threshold: f32) {
        match label {
            Some(class) if class < self.num_known() => {
                self.total[class] += 1;
                if score >= threshold && predicted == class {
                    self.correct[class] += 1;
                }
            }
            _ => {
                let unknown = self.unknown();
                self.total[unknown] += 1;
                if score < threshold {
                    self.correct[unknown] += 1;
                }
            }
        }
    }

    pub fn total(&self) -> usize {
        self.total.iter().sum()
    }

    fn bucket_accuracy(&self, bucket: usize) -> Option<f64> {
        (self.total[bucket] > 0).then(|| self.correct[bucket] as f64 / self.total[bucket] as f64)
    }

    /// Accuracies of non-empty buckets
    pub fn each_accuracy(&self) -> Vec<f64> {
        (0..self.total.len())
            .filter_map(|b| self.bucket_accuracy(b))
            .collect()
    }

    pub fn mean_accuracy(&self) -> f64 {
        mean(&self.each_accuracy())
    }

    /// Mean accuracy over non-empty known buckets
    pub fn known_accuracy(&self) -> Option<f64> {
        let known: Vec<f64> = (0..self.num_known())
            .filter_map(|b| self.bucket_accuracy(b))
            .collect();
        (!known.is_empty()).then(|| mean(&known))
    }

    pub fn unknown_accuracy(&self) -> Option<f64> {
        self.bucket_accuracy(self.unknown())
    }

    /// Harmonic mean of known and unknown accuracy.
    ///
    /// 0 when either side has no samples or both accuracies are 0.
    pub fn h_score(&self) -> f64 {
        match (self.known_accuracy(), self.unknown_accuracy()) {
            (Some(known), Some(unknown)) if known + unknown > 0.0 => {
                2.0 * known * unknown / (known + unknown)
            }
            _ => 0.0,
        }
    }

    pub fn metrics(&self) -> OpenSetMetrics {
        OpenSetMetrics {
            per_class: self.each_accuracy(),
            mean_accuracy: self.mean_accuracy(),
            known_accuracy: self.known_accuracy().unwrap_or(0.0),
            unknown_accuracy: self.unknown_accuracy().unwrap_or(0.0),
            h_score: self.h_score(),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
