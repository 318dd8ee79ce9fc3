//! Crop / flip transforms applied at batch time
//!
//! Images are stored resized to `resize x resize` (CHW, [0, 1]). Training
//! batches take a random `crop x crop` window and a random horizontal flip;
//! evaluation batches take the center window.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Which transform pipeline a batcher applies
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformMode {
    /// Random crop + horizontal flip
    Train,
    /// Center crop, deterministic
    Eval,
}

/// Per-image cropper/flipper
#[derive(Clone, Debug)]
pub struct Augmenter {
    mode: TransformMode,
    crop_size: usize,
    horizontal_flip_prob: f32,
}

impl Augmenter {
    pub fn new(mode: TransformMode, crop_size: usize) -> Self {
        Self {
            mode,
            crop_size,
            horizontal_flip_prob: 0.5,
        }
    }

    pub fn train(crop_size: usize) -> Self {
        Self::new(TransformMode::Train, crop_size)
    }

    pub fn eval(crop_size: usize) -> Self {
        Self::new(TransformMode::Eval, crop_size)
    }

    pub fn mode(&self) -> TransformMode {
        self.mode
    }

    /// Side length of the produced images for a stored image of side `size`
    pub fn output_size(&self, size: usize) -> usize {
        self.crop_size.min(size)
    }

    /// Transform one CHW image of side `size`.
    ///
    /// The RNG is only consulted in train mode.
    pub fn apply(&self, image: &[f32], size: usize, rng: &mut ChaCha8Rng) -> Vec<f32> {
        let crop = self.output_size(size);
        let slack = size - crop;

        let (top, left, flip) = match self.mode {
            TransformMode::Train => {
                let top = rng.gen_range(0..=slack);
                let left = rng.gen_range(0..=slack);
                let flip = rng.gen::<f32>() < self.horizontal_flip_prob;
                (top, left, flip)
            }
            TransformMode::Eval => (slack / 2, slack / 2, false),
        };

        let plane = size * size;
        let mut out = Vec::with_capacity(3 * crop * crop);

        for c in 0..3 {
            for y in 0..crop {
                let row = c * plane + (top + y) * size + left;
                if flip {
                    out.extend(image[row..row + crop].iter().rev());
                } else {
                    out.extend_from_slice(&image[row..row + crop]);
                }
            }
        }

        out
    }
}
