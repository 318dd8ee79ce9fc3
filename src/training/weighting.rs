//! Adaptive sample and class weights
//!
//! - `AdaptiveBounds`: moving extremes of the target open-set score, used to
//!   rescale per-sample target weights into [0, 1]
//! - `ClassWeights`: binary mask over source classes, recomputed every epoch
//!   from confident validation predictions

use serde::{Deserialize, Serialize};

use crate::utils::error::{DaError, Result};

/// Weight of the previous bound in the moving update
const BOUND_MOMENTUM: f32 = 0.01;
/// Spans below this fall back to the neutral weight
const MIN_SPAN: f32 = 1e-6;
/// Weight assigned when the bounds have collapsed
pub const NEUTRAL_WEIGHT: f32 = 0.5;
/// Normalized class weights above this become 1
const CLASS_WEIGHT_CUTOFF: f32 = 0.1;

/// Moving upper/lower bounds of the target score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveBounds {
    pub upper: f32,
    pub lower: f32,
}

impl AdaptiveBounds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a batch of scores into the bounds: `new = 0.01·old + 0.99·extreme`
    pub fn update(&mut self, batch_scores: &[f32]) -> Result<(f32, f32)> {
        if batch_scores.is_empty() {
            return Ok((self.upper, self.lower));
        }
        let (min, max) = batch_scores
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if !min.is_finite() || !max.is_finite() {
            return Err(DaError::Numeric(format!(
                "target scores contain non-finite values (min {}, max {})",
                min, max
            )));
        }

        self.upper = BOUND_MOMENTUM * self.upper + (1.0 - BOUND_MOMENTUM) * max;
        self.lower = BOUND_MOMENTUM * self.lower + (1.0 - BOUND_MOMENTUM) * min;
        Ok((self.upper, self.lower))
    }

    /// Normalize a batch against the current bounds
    pub fn normalize_all(&self, scores: &[f32]) -> Vec<f32> {
        scores
            .iter()
            .map(|&s| normalize(s, self.upper, self.lower))
            .collect()
    }
}

/// `(score - lower) / (upper - lower)` clamped to [0, 1].
///
/// Collapsed bounds (`|upper - lower| < 1e-6`) give the neutral weight 0.5.
pub fn normalize(score: f32, upper: f32, lower: f32) -> f32 {
    let span = upper - lower;
    if !(span.abs() >= MIN_SPAN) || !score.is_finite() {
        return NEUTRAL_WEIGHT;
    }
    ((score - lower) / span).clamp(0.0, 1.0)
}

/// Binary weight per source class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    weights: Vec<f32>,
}

impl ClassWeights {
    /// All classes enabled
    pub fn ones(num_classes: usize) -> Self {
        Self {
            weights: vec![1.0; num_classes],
        }
    }

    pub fn from_vec(weights: Vec<f32>) -> Self {
        Self { weights }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weight of `label`; labels outside the source space get 0
    pub fn weight(&self, label: usize) -> f32 {
        self.weights.get(label).copied().unwrap_or(0.0)
    }

    /// Per-sample weights for a batch of labels
    pub fn for_labels(&self, labels: &[usize]) -> Vec<f32> {
        labels.iter().map(|&l| self.weight(l)).collect()
    }

    pub fn num_enabled(&self) -> usize {
        self.weights.iter().filter(|w| **w > 0.0).count()
    }
}

/// Rebuild the source class mask from validation predictions.
///
/// `outputs` holds one softmax row (over source classes) per sample and
/// `scores` the matching open-set score. Rows whose score reaches
/// `source_threshold` are averaged, min-max normalized across classes and
/// binarized at 0.1. No qualifying rows, or a flat average, gives all ones.
pub fn recompute_class_weights(
    scores: &[f32],
    outputs: &[Vec<f32>],
    num_classes: usize,
    source_threshold: f32,
) -> Result<ClassWeights> {
    if scores.len() != outputs.len() {
        return Err(DaError::Numeric(format!(
            "{} scores for {} outputs",
            scores.len(),
            outputs.len()
        )));
    }

    let mut sum = vec![0.0f64; num_classes];
    let mut selected = 0usize;

    for (score, row) in scores.iter().zip(outputs) {
        if !score.is_finite() {
            return Err(DaError::Numeric("validation score is not finite".to_string()));
        }
        if *score < source_threshold {
            continue;
        }
        if row.len() != num_classes {
            return Err(DaError::Numeric(format!(
                "softmax row has {} classes, expected {}",
                row.len(),
                num_classes
            )));
        }
        for (acc, p) in sum.iter_mut().zip(row) {
            *acc += *p as f64;
        }
        selected += 1;
    }

    if selected == 0 {
        return Ok(ClassWeights::ones(num_classes));
    }

    let avg: Vec<f64> = sum.iter().map(|s| s / selected as f64).collect();
    if avg.iter().any(|v| !v.is_finite()) {
        return Err(DaError::Numeric("class weight average is not finite".to_string()));
    }

    let min = avg.iter().copied().fold(f64::INFINITY, f64::min);
    let max = avg.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if !(span > 0.0) {
        return Ok(ClassWeights::ones(num_classes));
    }

    let weights = avg
        .iter()
        .map(|v| {
            if ((v - min) / span) as f32 > CLASS_WEIGHT_CUTOFF {
                1.0
            } else {
                0.0
            }
        })
        .collect();

    Ok(ClassWeights::from_vec(weights))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_update_and_normalize() {
        let mut bounds = AdaptiveBounds::new();
        let (upper, lower) = bounds.update(&[0.2, 0.8, 0.5]).unwrap();
        assert!((upper - 0.792).abs() < 1e-6);
        assert!((lower - 0.198).abs() < 1e-6);

        let (upper, lower) = bounds.update(&[0.4, 0.6]).unwrap();
        assert!((upper - (0.01 * 0.792 + 0.99 * 0.6)).abs() < 1e-6);
        assert!((lower - (0.01 * 0.198 + 0.99 * 0.4)).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_range_and_fallback() {
        assert_eq!(normalize(0.5, 1.0, 0.0), 0.5);
        assert_eq!(normalize(2.0, 1.0, 0.0), 1.0);
        assert_eq!(normalize(-1.0, 1.0, 0.0), 0.0);
        assert_eq!(normalize(0.3, 0.4, 0.4), NEUTRAL_WEIGHT);
        assert_eq!(normalize(0.3, 0.0, 0.0), NEUTRAL_WEIGHT);
        assert_eq!(normalize(f32::NAN, 1.0, 0.0), NEUTRAL_WEIGHT);

        for i in 0..=100 {
            let s = i as f32 / 50.0 - 0.5;
            let w = normalize(s, 0.9, 0.1);
            assert!((0.0..=1.0).contains(&w));
        }
    }

    #[test]
    fn test_first_iteration_batch_is_normalized_with_updated_bounds() {
        let mut bounds = AdaptiveBounds::new();
        bounds.update(&[0.3, 0.7]).unwrap();
        // bounds are now (0.693, 0.297), not the initial (0, 0)
        let weights = bounds.normalize_all(&[0.3, 0.7]);
        assert!(weights[0] > 0.0 && weights[0] < 0.01);
        assert_eq!(weights[1], 1.0);
    }

    #[test]
    fn test_non_finite_scores_are_rejected() {
        let mut bounds = AdaptiveBounds::new();
        assert!(matches!(
            bounds.update(&[0.1, f32::INFINITY]),
            Err(DaError::Numeric(_))
        ));
    }

    #[test]
    fn test_class_weights_binarize() {
        let scores = vec![0.95, 0.99, 0.5];
        let outputs = vec![
            vec![0.7, 0.29, 0.01],
            vec![0.6, 0.39, 0.01],
            vec![0.0, 0.0, 1.0], // below threshold, ignored
        ];
        let weights = recompute_class_weights(&scores, &outputs, 3, 0.9).unwrap();
        // avg = [0.65, 0.34, 0.01] -> normalized [1.0, 0.515, 0.0]
        assert_eq!(weights.as_slice(), &[1.0, 1.0, 0.0]);
        assert_eq!(weights.num_enabled(), 2);
        assert_eq!(weights.for_labels(&[2, 0, 9]), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_class_weights_fallbacks() {
        let outputs = vec![vec![0.5, 0.5]];
        let none_selected = recompute_class_weights(&[0.1], &outputs, 2, 0.9).unwrap();
        assert_eq!(none_selected, ClassWeights::ones(2));

        let flat = recompute_class_weights(&[0.95], &outputs, 2, 0.9).unwrap();
        assert_eq!(flat, ClassWeights::ones(2));
    }

    #[test]
    fn test_class_weights_idempotent() {
        let scores = vec![0.92, 0.97, 0.99, 0.3];
        let outputs = vec![
            vec![0.1, 0.8, 0.1],
            vec![0.2, 0.7, 0.1],
            vec![0.05, 0.9, 0.05],
            vec![1.0, 0.0, 0.0],
        ];
        let a = recompute_class_weights(&scores, &outputs, 3, 0.9).unwrap();
        let b = recompute_class_weights(&scores, &outputs, 3, 0.9).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_class_weights_reject_nan() {
        let result = recompute_class_weights(&[f32::NAN], &[vec![1.0]], 1, 0.5);
        assert!(matches!(result, Err(DaError::Numeric(_))));
    }
}
