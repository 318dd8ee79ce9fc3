//! ROC / precision-recall diagnostics
//!
//! Measures how well the ensemble estimates separate common-class target
//! samples (positives) from target-private ones, and writes the curves as
//! SVG charts plus an F1-by-threshold CSV table.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use super::evaluate::PassOutputs;
use crate::dataset::ClassPartition;
use crate::utils::charts::{write_curve_chart, Curve};
use crate::utils::error::Result;

const PR_EPS: f64 = 1e-7;
/// PR thresholds step
const PR_STEP: f64 = 0.05;

/// ROC curve points `(fpr, tpr)`, from (0, 0) to (1, 1).
///
/// One point per distinct score, scanning thresholds from high to low.
pub fn roc_curve(scores: &[f32], positives: &[bool]) -> Vec<(f64, f64)> {
    let n_pos = positives.iter().filter(|&&p| p).count();
    let n_neg = positives.len() - n_pos;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let rate = |count: usize, total: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };

    let mut points = vec![(0.0, 0.0)];
    let (mut tp, mut fp) = (0usize, 0usize);
    for (k, &i) in order.iter().enumerate() {
        if positives[i] {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_tie = order
            .get(k + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_tie {
            points.push((rate(fp, n_neg), rate(tp, n_pos)));
        }
    }
    points
}

/// Area under a piecewise-linear curve (trapezoid rule)
pub fn auc(points: &[(f64, f64)]) -> f64 {
    points
        .windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[1].1 + w[0].1) / 2.0)
        .sum()
}

/// Thresholds 0.95, 0.90, ..., 0.00
pub fn pr_thresholds() -> Vec<f64> {
    let steps = (1.0 / PR_STEP).round() as usize;
    (0..steps).rev().map(|i| i as f64 * PR_STEP).collect()
}

/// `(recall, precision)` per threshold, predicting "common" when score ≥ threshold
pub fn pr_points(scores: &[f32], positives: &[bool], thresholds: &[f64]) -> Vec<(f64, f64)> {
    thresholds
        .iter()
        .map(|&t| {
            let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
            for (&s, &p) in scores.iter().zip(positives) {
                match (s as f64 >= t, p) {
                    (true, true) => tp += 1,
                    (true, false) => fp += 1,
                    (false, true) => fn_ += 1,
                    (false, false) => {}
                }
            }
            let recall = tp as f64 / (tp as f64 + fn_ as f64 + PR_EPS);
            let precision = tp as f64 / (tp as f64 + fp as f64 + PR_EPS);
            (recall, precision)
        })
        .collect()
}

/// PR points sorted by recall and closed with (0, 1) and (1, 0) for plotting
pub fn pr_plot_points(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut out = Vec::with_capacity(sorted.len() + 2);
    out.push((0.0, 1.0));
    out.extend(sorted);
    out.push((1.0, 0.0));
    out
}

pub fn f1(recall: f64, precision: f64) -> f64 {
    if recall + precision > 0.0 {
        2.0 * recall * precision / (recall + precision)
    } else {
        0.0
    }
}

/// Named score combinations compared in the PR analysis
pub fn score_combinations(outputs: &PassOutputs) -> Vec<(&'static str, Vec<f32>)> {
    let conf = outputs.normalized_confidence();
    let margin = outputs.normalized_margin();
    let certainty: Vec<f32> = outputs.normalized_entropy().iter().map(|e| 1.0 - e).collect();

    let combine = |parts: &[&Vec<f32>]| -> Vec<f32> {
        (0..conf.len())
            .map(|i| parts.iter().map(|p| p[i]).sum::<f32>() / parts.len() as f32)
            .collect()
    };

    vec![
        ("Conf", conf.clone()),
        ("Margin", margin.clone()),
        ("Entropy", certainty.clone()),
        ("Conf+Entropy", combine(&[&conf, &certainty])),
        ("Margin+Entropy", combine(&[&margin, &certainty])),
        ("Conf+Margin", combine(&[&conf, &margin])),
        ("Conf+Margin+Entropy", combine(&[&conf, &margin, &certainty])),
    ]
}

/// Files and headline numbers produced by [`write_diagnostics`]
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub auc_confidence: f64,
    pub auc_margin: f64,
    pub auc_entropy: f64,
    pub roc_chart: PathBuf,
    pub pr_chart: PathBuf,
    pub f1_table: PathBuf,
}

/// Capitalized file stem of a list path: `lists/amazon.txt` → `Amazon`
pub fn domain_name(list: &Path) -> String {
    let stem = list
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => stem,
    }
}

fn f1_csv(names: &[&str], thresholds: &[f64], rows: &[Vec<f64>]) -> String {
    let mut csv = String::from("score");
    for t in thresholds {
        csv.push_str(&format!(",T{:.2}", t));
    }
    csv.push('\n');
    for (name, row) in names.iter().zip(rows) {
        csv.push_str(name);
        for v in row {
            csv.push_str(&format!(",{:.6}", v));
        }
        csv.push('\n');
    }
    csv
}

/// Write ROC and PR charts and the F1 table for one source→target pair
pub fn write_diagnostics(
    outputs: &PassOutputs,
    partition: &ClassPartition,
    source: &str,
    target: &str,
    out_dir: &Path,
) -> Result<DiagnosticsReport> {
    fs::create_dir_all(out_dir)?;
    let positives = outputs.common_mask(partition);
    let pair = format!("{}->{}", source, target);
    let file_pair = format!("{}_to_{}", source, target);

    // ROC of the three single estimates
    let combos = score_combinations(outputs);
    let roc: Vec<(f64, Vec<(f64, f64)>)> = combos[..3]
        .iter()
        .map(|(_, scores)| {
            let points = roc_curve(scores, &positives);
            (auc(&points), points)
        })
        .collect();

    let labels = ["AUC Conf", "AUC Margin", "AUC Ent"];
    let roc_curves: Vec<Curve> = labels
        .iter()
        .zip(&roc)
        .map(|(label, (area, points))| Curve::new(format!("{}={:.3}", label, area), points.clone()))
        .collect();
    let roc_chart = out_dir.join(format!("ROC-{}.svg", file_pair));
    write_curve_chart(&format!("{} ROC", pair), "FPR", "TPR", &roc_curves, true, &roc_chart)?;

    // PR + F1 for every combination
    let thresholds = pr_thresholds();
    let mut pr_curves = Vec::with_capacity(combos.len());
    let mut f1_rows = Vec::with_capacity(combos.len());
    for (name, scores) in &combos {
        let points = pr_points(scores, &positives, &thresholds);
        f1_rows.push(points.iter().map(|&(r, p)| f1(r, p)).collect::<Vec<_>>());
        pr_curves.push(Curve::new(*name, pr_plot_points(&points)));
    }
    let pr_chart = out_dir.join(format!("PR-{}.svg", file_pair));
    write_curve_chart(&format!("{} PR", pair), "Recall", "Precision", &pr_curves, true, &pr_chart)?;

    let names: Vec<&str> = combos.iter().map(|(n, _)| *n).collect();
    let f1_table = out_dir.join(format!("F1-{}.csv", file_pair));
    fs::write(&f1_table, f1_csv(&names, &thresholds, &f1_rows))?;

    let report = DiagnosticsReport {
        auc_confidence: roc[0].0,
        auc_margin: roc[1].0,
        auc_entropy: roc[2].0,
        roc_chart,
        pr_chart,
        f1_table,
    };
    info!(
        "{} AUC: conf {:.3}, margin {:.3}, entropy {:.3} (charts in {:?})",
        pair, report.auc_confidence, report.auc_margin, report.auc_entropy, out_dir
    );
    Ok(report)
}
