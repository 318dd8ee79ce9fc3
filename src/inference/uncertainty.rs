//! Ensemble-based uncertainty estimates
//!
//! All estimators take the softmax output of every ensemble head
//! (`[N, C]` each) and return one value per sample in [0, 1], averaged over
//! heads. They never look at labels.

use burn::tensor::{backend::Backend, Tensor};

/// Added inside the log so zero probabilities contribute zero entropy
const ENTROPY_EPS: f64 = 1e-10;

fn mean_over_heads<B: Backend>(per_head: Vec<Tensor<B, 1>>) -> Tensor<B, 1> {
    let heads = per_head.len();
    let n = per_head[0].dims()[0];
    Tensor::stack::<2>(per_head, 0)
        .sum_dim(0)
        .reshape([n])
        .div_scalar(heads as f64)
}

/// Top-1 minus top-2 probability, averaged over heads
pub fn marginal_confidence<B: Backend>(outputs: &[Tensor<B, 2>]) -> Tensor<B, 1> {
    let per_head = outputs
        .iter()
        .map(|probs| {
            let [n, c] = probs.dims();
            if c < 2 {
                return probs.clone().reshape([n]);
            }
            let top = probs.clone().topk(2, 1);
            let first = top.clone().slice([0..n, 0..1]);
            let second = top.slice([0..n, 1..2]);
            (first - second).reshape([n])
        })
        .collect();
    mean_over_heads(per_head)
}

/// Shannon entropy normalized by `ln C`, averaged over heads
pub fn entropy<B: Backend>(outputs: &[Tensor<B, 2>]) -> Tensor<B, 1> {
    let per_head = outputs
        .iter()
        .map(|probs| {
            let [n, c] = probs.dims();
            if c < 2 {
                return Tensor::zeros([n], &probs.device());
            }
            let h = probs
                .clone()
                .mul(probs.clone().add_scalar(ENTROPY_EPS).log())
                .sum_dim(1)
                .neg()
                .reshape([n]);
            h.div_scalar((c as f64).ln())
        })
        .collect();
    mean_over_heads(per_head)
}

/// Top-1 probability, averaged over heads
pub fn confidence<B: Backend>(outputs: &[Tensor<B, 2>]) -> Tensor<B, 1> {
    let per_head = outputs
        .iter()
        .map(|probs| {
            let [n, _] = probs.dims();
            probs.clone().max_dim(1).reshape([n])
        })
        .collect();
    mean_over_heads(per_head)
}

/// `(conf + 1 - ent) / 2`
pub fn open_set_score<B: Backend>(conf: Tensor<B, 1>, ent: Tensor<B, 1>) -> Tensor<B, 1> {
    (conf - ent).add_scalar(1.0).div_scalar(2.0)
}

/// Scalar version of [`open_set_score`]
pub fn open_set_score_value(conf: f32, ent: f32) -> f32 {
    (conf + 1.0 - ent) / 2.0
}

/// Rescale to [0, 1] by the min and max of `values`; a zero span gives 0.5
pub fn min_max_normalize(values: &[f32]) -> Vec<f32> {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;
    if !(span > 0.0) {
        return vec![0.5; values.len()];
    }
    values.iter().map(|v| (v - min) / span).collect()
}

/// Equal-width histogram over `[lo, hi]`; the last bin includes `hi`.
/// Values outside the range are ignored.
pub fn histogram(values: &[f32], bins: usize, lo: f32, hi: f32) -> Vec<usize> {
    let mut counts = vec![0usize; bins];
    if bins == 0 || !(hi > lo) {
        return counts;
    }
    let span = hi - lo;
    for &v in values {
        if !(lo..=hi).contains(&v) {
            continue;
        }
        let bin = (((v - lo) / span * bins as f32) as usize).min(bins - 1);
        counts[bin] += 1;
    }
    counts
}
