//! Burn Batcher Integration
//!
//! Turns `ImageItem`s into normalized image tensors.
//!
//! - `ImageBatcher::train`: random crop + horizontal flip (source/target streams)
//! - `ImageBatcher::eval`: center crop (validation / test)

use std::sync::atomic::{AtomicU64, Ordering};

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::dataset::augmentation::{Augmenter, TransformMode};
use crate::dataset::list::ImageItem;

/// ImageNet channel statistics
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A batch of images with their labels
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, crop, crop]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Batcher applying crop/flip and ImageNet normalization
pub struct ImageBatcher {
    augmenter: Augmenter,
    seed: u64,
    /// Batches produced so far; mixed into the seed so each batch draws fresh crops
    counter: AtomicU64,
}

impl Clone for ImageBatcher {
    fn clone(&self) -> Self {
        Self {
            augmenter: self.augmenter.clone(),
            seed: self.seed,
            counter: AtomicU64::new(self.counter.load(Ordering::Relaxed)),
        }
    }
}

impl std::fmt::Debug for ImageBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBatcher")
            .field("mode", &self.augmenter.mode())
            .field("seed", &self.seed)
            .finish()
    }
}

impl ImageBatcher {
    pub fn new(augmenter: Augmenter, seed: u64) -> Self {
        Self {
            augmenter,
            seed,
            counter: AtomicU64::new(0),
        }
    }

    pub fn train(crop_size: usize, seed: u64) -> Self {
        Self::new(Augmenter::train(crop_size), seed)
    }

    pub fn eval(crop_size: usize) -> Self {
        Self::new(Augmenter::eval(crop_size), 0)
    }

    pub fn mode(&self) -> TransformMode {
        self.augmenter.mode()
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let stored = items.first().map(|item| item.size).unwrap_or(0);
        let side = self.augmenter.output_size(stored);

        let batch_index = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(batch_index));

        let mut images_data = Vec::with_capacity(batch_size * 3 * side * side);
        let mut targets_data = Vec::with_capacity(batch_size);

        for item in &items {
            images_data.extend(self.augmenter.apply(&item.image, item.size, &mut rng));
            targets_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, side, side]),
            device,
        );

        // (x - mean) / std per channel
        let mean = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]), device);
        let std = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]), device);
        let images = (images - mean) / std;

        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn gray_item(label: usize, size: usize) -> ImageItem {
        ImageItem::from_data(vec![0.5; 3 * size * size], size, label, format!("img_{label}.jpg"))
    }

    #[test]
    fn test_eval_batch_shapes_and_normalization() {
        let device = Default::default();
        let batcher = ImageBatcher::eval(4);
        let items = vec![gray_item(0, 6), gray_item(3, 6)];

        let batch: ImageBatch<TestBackend> = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
        assert_eq!(batch.len(), 2);

        let targets: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(targets, vec![0, 3]);

        let pixels: Vec<f32> = batch.images.into_data().convert::<f32>().to_vec().unwrap();
        let expected_red = (0.5 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        assert!((pixels[0] - expected_red).abs() < 1e-5);
        let expected_blue = (0.5 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
        assert!((pixels[2 * 16] - expected_blue).abs() < 1e-5);
    }

    #[test]
    fn test_train_batch_uses_crop_size() {
        let device = Default::default();
        let batcher = ImageBatcher::train(5, 42);
        let batch: ImageBatch<TestBackend> = batcher.batch(vec![gray_item(1, 8); 3], &device);
        assert_eq!(batch.images.dims(), [3, 3, 5, 5]);
        assert_eq!(batcher.mode(), TransformMode::Train);
    }
}
