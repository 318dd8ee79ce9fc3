//! Inference module: ensemble estimates and open-set evaluation
//!
//! This module provides:
//! - Per-sample margin / entropy / confidence estimates from the ensemble
//! - Open-set accuracy counting and the H-score
//! - Ordered evaluation passes over validation / test data
//! - Optional ROC and precision-recall diagnostics

pub mod diagnostics;
pub mod evaluate;
pub mod open_set;
pub mod uncertainty;

pub use diagnostics::{write_diagnostics, DiagnosticsReport};
pub use evaluate::{collect_outputs, evaluate_source_common, validate, PassOutputs};
pub use open_set::{AccuracyCounter, OpenSetMetrics};
pub use uncertainty::{confidence, entropy, marginal_confidence, open_set_score};
