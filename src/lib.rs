//! # open_set_da
//!
//! Universal domain adaptation with the Burn framework: a classifier trained
//! on a labeled source domain is adapted to an unlabeled target domain that
//! shares only part of its label space.
//!
//! ## Features
//!
//! - **Domain-adversarial alignment** with a warm-start gradient reversal layer
//! - **Ensemble uncertainty**: five auxiliary heads score how likely a target
//!   sample belongs to a class the source also has
//! - **Adaptive weighting** of target samples and source classes
//! - **Open-set evaluation** with per-class accuracy and the H-score
//!
//! ## Modules
//!
//! - `dataset`: list files, class partition, batch streams, long-tail resampling
//! - `model`: backbone, classifier, discriminator, ensemble
//! - `training`: configuration, weighting, optimizers, the epoch loop
//! - `inference`: uncertainty estimates, evaluation passes, diagnostics
//! - `utils`: errors, logging, meters, charts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use open_set_da::backend::{default_device, TrainingBackend};
//! use open_set_da::training::{run_experiment, ExperimentConfig};
//!
//! let config = ExperimentConfig::default();
//! let report = run_experiment::<TrainingBackend>(config, default_device())?;
//! println!("H-score: {:.3}", report.test.h_score);
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

pub use dataset::{ClassPartition, DomainSplits, ImageListDataset};
pub use inference::{AccuracyCounter, OpenSetMetrics};
pub use model::{DomainAdversarialLoss, Ensemble, ImageClassifier};
pub use training::{run_experiment, ExperimentConfig, ExperimentReport, Trainer};
pub use utils::error::{DaError, Result};

/// Number of auxiliary heads in the ensemble
pub const ENSEMBLE_SIZE: usize = 5;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
