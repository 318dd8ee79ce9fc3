//! Dataset module for source / target domain data
//!
//! This module provides functionality for:
//! - Parsing `<path> <label>` list files
//! - Partitioning labels into common, source-private and target-private classes
//! - Endless shuffled / bootstrap batch streams
//! - Crop / flip transforms and tensor batching
//! - Long-tail resampling of list files
//!
//! ## Splits
//!
//! 1. **Source**: labeled, restricted to the source classes
//! 2. **Target (train)**: target classes, labels never used for training
//! 3. **Validation**: the same target list, evaluated with center crops
//! 4. **Test**: a separate list if given, otherwise the validation split

pub mod augmentation;
pub mod burn_dataset;
pub mod list;
pub mod longtail;
pub mod partition;
pub mod stream;

use std::sync::Arc;

use burn::data::dataset::Dataset;
use tracing::{info, warn};

pub use augmentation::{Augmenter, TransformMode};
pub use burn_dataset::{ImageBatch, ImageBatcher};
pub use list::{ImageItem, ImageListDataset, ListEntry};
pub use partition::ClassPartition;
pub use stream::{ForeverBatches, OrderedBatches, Sampling};

use crate::training::config::ExperimentConfig;
use crate::utils::error::Result;

/// The four datasets an experiment reads
#[derive(Clone)]
pub struct DomainSplits {
    pub source: Arc<ImageListDataset>,
    pub target: Arc<ImageListDataset>,
    pub val: Arc<ImageListDataset>,
    pub test: Arc<ImageListDataset>,
}

impl DomainSplits {
    pub fn load(config: &ExperimentConfig) -> Result<Self> {
        let partition = &config.partition;
        let source_classes = partition.source_classes();
        let target_classes = partition.target_classes();

        info!(
            "Classes: {} common, {} source-private, {} target-private",
            partition.common().len(),
            partition.source_private().len(),
            partition.target_private().len()
        );

        let load = |list: &std::path::Path, classes: &[usize]| -> Result<ImageListDataset> {
            let dataset =
                ImageListDataset::from_list_file(&config.root, list, classes, config.resize_size)?;
            if config.cache_images {
                dataset.preload()
            } else {
                Ok(dataset)
            }
        };

        let source = Arc::new(load(&config.source, &source_classes)?);
        let target = Arc::new(load(&config.target, &target_classes)?);
        // validation reads the target list again; only the transform differs
        let val = target.clone();

        let test = match &config.test {
            Some(test_list) => Arc::new(load(test_list, &target_classes)?),
            None => {
                warn!("No --test list given; reporting test metrics on the validation split");
                val.clone()
            }
        };

        list::log_distribution("source", &source);
        list::log_distribution("target", &target);

        info!(
            "Source: {} images, target: {}, val: {}, test: {}",
            source.len(),
            target.len(),
            val.len(),
            test.len()
        );

        Ok(Self {
            source,
            target,
            val,
            test,
        })
    }
}
