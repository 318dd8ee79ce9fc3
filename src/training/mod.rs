//! Training module for domain adaptation
//!
//! This module provides:
//! - Experiment configuration
//! - Adaptive target weights and the source class mask
//! - Per-module SGD with inverse-decay learning rates
//! - The epoch loop and best-model checkpointing
//!
//! ## Epoch Schedule
//!
//! 1. Adversarial training of backbone, classifier and discriminator
//! 2. Ensemble head training on bootstrap views of the source
//! 3. Class mask update from confident validation predictions
//! 4. Open-set validation and snapshotting

pub mod checkpoint;
pub mod config;
pub mod optim;
pub mod scheduler;
pub mod trainer;
pub mod weighting;

pub use checkpoint::{CheckpointBundle, CheckpointMeta};
pub use config::ExperimentConfig;
pub use scheduler::{LRScheduler, StepwiseLr};
pub use trainer::{run_experiment, EpochState, ExperimentReport, IterationStats, Trainer};
pub use weighting::{AdaptiveBounds, ClassWeights};
