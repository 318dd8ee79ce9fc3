//! Infinite batch streams
//!
//! Training draws a fixed number of iterations per epoch regardless of
//! dataset size, so the source, target and ensemble loaders are endless:
//! when a pass over the data is exhausted the order is redrawn and the
//! stream continues. Every batch holds exactly `batch_size` items (the
//! incomplete tail of a pass is dropped).

use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::dataset::burn_dataset::{ImageBatch, ImageBatcher};
use crate::dataset::list::ImageItem;
use crate::utils::error::{DaError, Result};

/// How each pass over the dataset is ordered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sampling {
    /// Permutation of all indices
    Shuffle,
    /// `len` indices drawn with replacement
    Bootstrap,
}

/// Endless stream of fixed-size batches over a dataset
pub struct ForeverBatches {
    dataset: Arc<dyn Dataset<ImageItem>>,
    batch_size: usize,
    sampling: Sampling,
    rng: ChaCha8Rng,
    order: Vec<usize>,
    cursor: usize,
    passes: usize,
}

impl ForeverBatches {
    pub fn new(
        dataset: Arc<dyn Dataset<ImageItem>>,
        batch_size: usize,
        sampling: Sampling,
        seed: u64,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(DaError::Config("batch size must be positive".to_string()));
        }
        if dataset.len() < batch_size {
            return Err(DaError::Dataset(format!(
                "dataset has {} samples, fewer than one batch of {}",
                dataset.len(),
                batch_size
            )));
        }

        let mut stream = Self {
            dataset,
            batch_size,
            sampling,
            rng: ChaCha8Rng::seed_from_u64(seed),
            order: Vec::new(),
            cursor: 0,
            passes: 0,
        };
        stream.reshuffle();
        Ok(stream)
    }

    /// Shuffled stream (source / target loaders)
    pub fn shuffled(dataset: Arc<dyn Dataset<ImageItem>>, batch_size: usize, seed: u64) -> Result<Self> {
        Self::new(dataset, batch_size, Sampling::Shuffle, seed)
    }

    /// Bootstrap-resampled view, one per ensemble head
    pub fn bootstrap(
        dataset: Arc<dyn Dataset<ImageItem>>,
        batch_size: usize,
        seed: u64,
        head: usize,
    ) -> Result<Self> {
        Self::new(dataset, batch_size, Sampling::Bootstrap, seed.wrapping_add(head as u64))
    }

    fn reshuffle(&mut self) {
        let n = self.dataset.len();
        self.order = match self.sampling {
            Sampling::Shuffle => {
                let mut order: Vec<usize> = (0..n).collect();
                order.shuffle(&mut self.rng);
                order
            }
            Sampling::Bootstrap => (0..n).map(|_| self.rng.gen_range(0..n)).collect(),
        };
        self.cursor = 0;
        self.passes += 1;
    }

    /// Number of passes started so far (including the current one)
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Next `batch_size` items, restarting the stream as often as needed.
    ///
    /// Unreadable images are skipped; a whole pass without a single readable
    /// image is an error.
    pub fn next_items(&mut self) -> Result<Vec<ImageItem>> {
        let mut items = Vec::with_capacity(self.batch_size);
        let mut misses = 0usize;

        while items.len() < self.batch_size {
            if self.cursor + (self.batch_size - items.len()) > self.order.len() {
                debug!("Stream exhausted after pass {}, restarting", self.passes);
                self.reshuffle();
                if !items.is_empty() {
                    // drop-last: a batch never straddles two passes
                    items.clear();
                }
            }

            let index = self.order[self.cursor];
            self.cursor += 1;

            match self.dataset.get(index) {
                Some(item) => {
                    misses = 0;
                    items.push(item);
                }
                None => {
                    misses += 1;
                    if misses >= self.order.len() {
                        return Err(DaError::Dataset(
                            "no readable images left in stream".to_string(),
                        ));
                    }
                }
            }
        }

        Ok(items)
    }

    /// Next batch as tensors
    pub fn next_batch<B: Backend>(
        &mut self,
        batcher: &ImageBatcher,
        device: &B::Device,
    ) -> Result<ImageBatch<B>> {
        let items = self.next_items()?;
        Ok(batcher.batch(items, device))
    }
}

/// Ordered, finite batches over a dataset for evaluation (no drop-last)
pub struct OrderedBatches<'a> {
    dataset: &'a dyn Dataset<ImageItem>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> OrderedBatches<'a> {
    pub fn new(dataset: &'a dyn Dataset<ImageItem>, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }
}

impl Iterator for OrderedBatches<'_> {
    type Item = Vec<ImageItem>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < self.dataset.len() {
            let end = (self.cursor + self.batch_size).min(self.dataset.len());
            let items: Vec<ImageItem> = (self.cursor..end)
                .filter_map(|i| self.dataset.get(i))
                .collect();
            self.cursor = end;
            if !items.is_empty() {
                return Some(items);
            }
        }
        None
    }
}
