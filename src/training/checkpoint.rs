//! Best-model checkpointing
//!
//! The classifier and the ensemble are saved together as one full-precision
//! Burn record (`NamedMpkFileRecorder`), next to a JSON sidecar describing
//! when and why the snapshot was taken. Reloading yields bit-identical
//! parameters.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{Ensemble, ImageClassifier};
use crate::training::config::ExperimentConfig;
use crate::utils::error::{DaError, Result};

/// Everything needed to score target samples
#[derive(Module, Debug)]
pub struct CheckpointBundle<B: Backend> {
    pub classifier: ImageClassifier<B>,
    pub ensemble: Ensemble<B>,
}

/// JSON sidecar of a saved bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub mean_accuracy: f64,
    pub h_score: f64,
    pub timestamp: String,
    pub config: ExperimentConfig,
}

impl CheckpointMeta {
    pub fn new(epoch: usize, mean_accuracy: f64, h_score: f64, config: &ExperimentConfig) -> Self {
        Self {
            epoch,
            mean_accuracy,
            h_score,
            timestamp: chrono::Utc::now().to_rfc3339(),
            config: config.clone(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Record and sidecar paths of the best snapshot in `output_dir`.
/// The recorder appends its own extension to the record path.
pub fn best_paths(output_dir: &Path) -> (PathBuf, PathBuf) {
    (
        output_dir.join("best_model"),
        output_dir.join("best_model.json"),
    )
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

impl<B: Backend> CheckpointBundle<B> {
    pub fn save(&self, record_path: &Path, meta: &CheckpointMeta, meta_path: &Path) -> Result<()> {
        if let Some(parent) = record_path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.clone()
            .save_file(record_path, &recorder())
            .map_err(|e| DaError::Checkpoint(format!("failed to save {:?}: {:?}", record_path, e)))?;
        meta.save(meta_path)?;

        info!(
            "Saved snapshot (epoch {}, mean acc {:.2}%) to {:?}",
            meta.epoch,
            meta.mean_accuracy * 100.0,
            record_path
        );
        Ok(())
    }

    /// Load parameters into an already-initialized bundle of the same shape
    pub fn load(self, record_path: &Path, device: &B::Device) -> Result<Self> {
        self.load_file(record_path, &recorder(), device)
            .map_err(|e| DaError::Checkpoint(format!("failed to load {:?}: {:?}", record_path, e)))
    }
}
