//! Experiment Configuration
//!
//! Hyperparameters for one adaptation run. Defaults reproduce the Office-31
//! reference setting; a JSON file can override them and CLI flags override
//! the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::partition::ClassPartition;
use crate::model::backbone::BackboneArch;
use crate::utils::error::{DaError, Result};

/// Full configuration of an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Dataset root; list-file paths are relative to it
    pub root: PathBuf,
    /// Source domain list file
    pub source: PathBuf,
    /// Target domain list file (training + validation)
    pub target: PathBuf,
    /// Separate test list; the validation split is reused when absent
    pub test: Option<PathBuf>,

    pub partition: ClassPartition,

    pub arch: BackboneArch,
    /// Burn record with pretrained backbone weights
    pub backbone_weights: Option<PathBuf>,
    pub bottleneck_dim: usize,
    pub discriminator_hidden: usize,

    pub epochs: usize,
    /// Source-only warm-up epochs before adaptation (0 = disabled)
    pub pretrain_epochs: usize,
    pub iters_per_epoch: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    /// Weight of the domain-adversarial loss
    pub trade_off: f64,

    /// Open-set score threshold separating known from unknown at evaluation
    pub threshold: f64,
    /// Score threshold for validation samples used in class re-weighting
    pub source_threshold: f64,
    /// Apply the source class mask to the classification loss as well
    pub mask_classification_loss: bool,

    pub seed: Option<u64>,
    pub print_freq: usize,

    pub resize_size: usize,
    pub crop_size: usize,
    /// Decode all images before training
    pub cache_images: bool,
    /// Write ROC / PR curves after the final test
    pub diagnostics: bool,

    pub output_dir: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/office31"),
            source: PathBuf::from("amazon.txt"),
            target: PathBuf::from("webcam.txt"),
            test: None,
            partition: ClassPartition::default(),
            arch: BackboneArch::default(),
            backbone_weights: None,
            bottleneck_dim: 256,
            discriminator_hidden: 1024,
            epochs: 20,
            pretrain_epochs: 0,
            iters_per_epoch: 1000,
            batch_size: 32,
            lr: 0.01,
            momentum: 0.9,
            weight_decay: 1e-3,
            trade_off: 1.0,
            threshold: 0.6,
            source_threshold: 0.9,
            mask_classification_loss: true,
            seed: None,
            print_freq: 100,
            resize_size: 256,
            crop_size: 224,
            cache_images: false,
            diagnostics: false,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl ExperimentConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.partition.validate()?;

        let positive = [
            ("epochs", self.epochs),
            ("iters_per_epoch", self.iters_per_epoch),
            ("batch_size", self.batch_size),
            ("print_freq", self.print_freq),
            ("bottleneck_dim", self.bottleneck_dim),
            ("discriminator_hidden", self.discriminator_hidden),
            ("crop_size", self.crop_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(DaError::Config(format!("{} must be greater than 0", name)));
            }
        }

        if self.crop_size > self.resize_size {
            return Err(DaError::Config(format!(
                "crop_size ({}) must not exceed resize_size ({})",
                self.crop_size, self.resize_size
            )));
        }

        if !(self.lr > 0.0 && self.lr.is_finite()) {
            return Err(DaError::Config("lr must be a positive number".to_string()));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(DaError::Config("momentum must be in range [0.0, 1.0)".to_string()));
        }
        if self.weight_decay < 0.0 || self.trade_off < 0.0 {
            return Err(DaError::Config(
                "weight_decay and trade_off must be non-negative".to_string(),
            ));
        }
        for (name, value) in [
            ("threshold", self.threshold),
            ("source_threshold", self.source_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DaError::Config(format!("{} must be in range [0.0, 1.0]", name)));
            }
        }

        Ok(())
    }

    /// Seed for all RNGs of the run
    pub fn effective_seed(&self) -> u64 {
        self.seed.unwrap_or(0)
    }

    /// Iterations per ensemble head per epoch
    pub fn ensemble_iters(&self) -> usize {
        (self.iters_per_epoch / 2).max(1)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file; missing keys take default values
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            DaError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_reference_setting() {
        let config = ExperimentConfig::default();
        assert_eq!(config.epochs, 20);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.iters_per_epoch, 1000);
        assert_eq!(config.ensemble_iters(), 500);
        assert!((config.threshold - 0.6).abs() < 1e-12);
        assert!((config.source_threshold - 0.9).abs() < 1e-12);
        assert_eq!(config.partition.num_source_classes(), 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ExperimentConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = ExperimentConfig::default();
        config.crop_size = 300;
        assert!(config.validate().is_err());

        let mut config = ExperimentConfig::default();
        config.threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = ExperimentConfig::default();
        config.partition.n_share = 25;
        assert!(matches!(config.validate(), Err(DaError::Config(_))));
    }

    #[test]
    fn test_json_roundtrip_and_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp").join("config.json");

        let mut config = ExperimentConfig::default();
        config.trade_off = 0.5;
        config.seed = Some(7);
        config.save(&path).unwrap();

        let loaded = ExperimentConfig::load(&path).unwrap();
        assert_eq!(loaded.seed, Some(7));
        assert!((loaded.trade_off - 0.5).abs() < 1e-12);

        let partial = dir.path().join("partial.json");
        std::fs::write(&partial, r#"{ "epochs": 3, "lr": 0.001 }"#).unwrap();
        let loaded = ExperimentConfig::load(&partial).unwrap();
        assert_eq!(loaded.epochs, 3);
        assert_eq!(loaded.batch_size, 32);
    }
}
