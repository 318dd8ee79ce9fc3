//! Image list files
//!
//! Domains are described by plain-text list files with one
//! `<image_path> <integer_label>` pair per line, paths relative to a dataset root.
//! This module parses them and exposes the listed images through Burn's
//! `Dataset` trait.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use burn::data::dataset::Dataset;
use image::imageops::FilterType;
use image::ImageReader;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::utils::error::{DaError, Result};

/// One parsed line of a list file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub path: String,
    pub label: usize,
}

/// Parse list-file contents. `source` is only used for error locations.
pub fn parse_list(contents: &str, source: &Path) -> Result<Vec<ListEntry>> {
    let mut entries = Vec::new();

    for (idx, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let err = |message: String| DaError::ListFile {
            path: source.to_path_buf(),
            line: idx + 1,
            message,
        };

        let (path, label) = line
            .rsplit_once(char::is_whitespace)
            .ok_or_else(|| err(format!("expected '<image_path> <label>', got '{}'", line)))?;

        let label = label
            .parse::<usize>()
            .map_err(|_| err(format!("label '{}' is not a non-negative integer", label)))?;

        entries.push(ListEntry {
            path: path.trim_end().to_string(),
            label,
        });
    }

    Ok(entries)
}

/// Read and parse a list file from disk
pub fn read_list_file(path: &Path) -> Result<Vec<ListEntry>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        DaError::Dataset(format!("cannot read list file {}: {}", path.display(), e))
    })?;
    parse_list(&contents, path)
}

/// A decoded image ready for batching
#[derive(Clone, Debug)]
pub struct ImageItem {
    /// Pixels as a flattened CHW array of `3 * size * size` values in [0, 1]
    pub image: Vec<f32>,
    /// Side length of the (square) stored image
    pub size: usize,
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: String,
}

impl ImageItem {
    /// Load an image and resize it to `size x size`
    pub fn from_path(path: &Path, label: usize, size: usize) -> Result<Self> {
        let img = ImageReader::open(path)
            .map_err(|e| DaError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .decode()
            .map_err(|e| DaError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .resize_exact(size as u32, size as u32, FilterType::Triangle)
            .to_rgb8();

        let plane = size * size;
        let mut image = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in img.enumerate_pixels() {
            let offset = y as usize * size + x as usize;
            for c in 0..3 {
                image[c * plane + offset] = pixel[c] as f32 / 255.0;
            }
        }

        Ok(Self {
            image,
            size,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }

    /// Create from pre-loaded pixel data
    pub fn from_data(image: Vec<f32>, size: usize, label: usize, path: impl Into<String>) -> Self {
        debug_assert_eq!(image.len(), 3 * size * size);
        Self {
            image,
            size,
            label,
            path: path.into(),
        }
    }
}

/// Images listed in a list file, restricted to a set of classes
#[derive(Debug, Clone)]
pub struct ImageListDataset {
    samples: Vec<(PathBuf, usize)>,
    resize: usize,
    cached: Option<Vec<ImageItem>>,
}

impl ImageListDataset {
    pub fn new(samples: Vec<(PathBuf, usize)>, resize: usize) -> Self {
        Self {
            samples,
            resize,
            cached: None,
        }
    }

    /// Load `list_file`, keep only entries whose label is in `classes`
    /// and resolve paths against `root`.
    pub fn from_list_file(
        root: &Path,
        list_file: &Path,
        classes: &[usize],
        resize: usize,
    ) -> Result<Self> {
        let list_path = if list_file.is_absolute() || list_file.exists() {
            list_file.to_path_buf()
        } else {
            root.join(list_file)
        };

        let entries = read_list_file(&list_path)?;
        let total = entries.len();

        let samples: Vec<(PathBuf, usize)> = entries
            .into_iter()
            .filter(|e| classes.contains(&e.label))
            .map(|e| (root.join(&e.path), e.label))
            .collect();

        info!(
            "Loaded {} of {} entries from {:?}",
            samples.len(),
            total,
            list_path
        );

        if samples.is_empty() {
            return Err(DaError::Dataset(format!(
                "no images of the requested classes in {}",
                list_path.display()
            )));
        }

        Ok(Self::new(samples, resize))
    }

    /// Decode every image up front (parallel)
    pub fn preload(mut self) -> Result<Self> {
        let total = self.samples.len();
        info!("Pre-loading {} images into memory...", total);

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
                .map_err(|e| DaError::Dataset(e.to_string()))?
                .progress_chars("#>-"),
        );

        let loaded = AtomicUsize::new(0);
        let resize = self.resize;

        let items: Vec<Result<ImageItem>> = self
            .samples
            .par_iter()
            .map(|(path, label)| {
                let result = ImageItem::from_path(path, *label, resize);
                let count = loaded.fetch_add(1, Ordering::Relaxed);
                if count % 100 == 0 {
                    pb.set_position(count as u64);
                }
                result
            })
            .collect();

        pb.finish_with_message(format!("Loaded {} images", total));

        self.cached = Some(items.into_iter().collect::<Result<Vec<_>>>()?);
        Ok(self)
    }

    pub fn samples(&self) -> &[(PathBuf, usize)] {
        &self.samples
    }

    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|(_, label)| *label).collect()
    }

    /// Number of samples per label, indexed by label
    pub fn class_distribution(&self) -> Vec<usize> {
        let num_classes = self
            .samples
            .iter()
            .map(|(_, label)| *label + 1)
            .max()
            .unwrap_or(0);
        let mut counts = vec![0usize; num_classes];
        for (_, label) in &self.samples {
            counts[*label] += 1;
        }
        counts
    }
}

impl Dataset<ImageItem> for ImageListDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        if let Some(ref cached) = self.cached {
            return cached.get(index).cloned();
        }

        let (path, label) = self.samples.get(index)?;
        match ImageItem::from_path(path, *label, self.resize) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping unreadable image: {}", e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Log the per-class sample counts of a dataset
pub fn log_distribution(name: &str, dataset: &ImageListDataset) {
    let counts = dataset.class_distribution();
    debug!("{} class distribution: {:?}", name, counts);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        let contents = "amazon/images/back_pack/frame_0001.jpg 0\n\
                        amazon/images/bike/frame_0002.jpg 1\n\
                        \n\
                        amazon/images/my dir/frame_0003.jpg 12\n";
        let entries = parse_list(contents, Path::new("amazon.txt")).unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].label, 0);
        assert_eq!(entries[1].path, "amazon/images/bike/frame_0002.jpg");
        assert_eq!(entries[2].path, "amazon/images/my dir/frame_0003.jpg");
        assert_eq!(entries[2].label, 12);
    }

    #[test]
    fn test_malformed_line_reports_location() {
        let contents = "a.jpg 0\nb.jpg\nc.jpg 2\n";
        let err = parse_list(contents, Path::new("lists/webcam.txt")).unwrap_err();
        match err {
            DaError::ListFile { path, line, .. } => {
                assert_eq!(path, PathBuf::from("lists/webcam.txt"));
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_integer_label_is_rejected() {
        let err = parse_list("a.jpg zero\n", Path::new("x.txt")).unwrap_err();
        assert!(err.to_string().contains("x.txt:1"));
        assert!(parse_list("a.jpg -3\n", Path::new("x.txt")).is_err());
    }

    #[test]
    fn test_from_list_file_filters_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        for (name, shade) in [("red.png", [200u8, 10, 10]), ("blue.png", [10u8, 10, 200])] {
            let img = image::RgbImage::from_pixel(6, 4, image::Rgb(shade));
            img.save(root.join(name)).unwrap();
        }
        std::fs::write(root.join("list.txt"), "red.png 0\nblue.png 3\n").unwrap();

        let dataset =
            ImageListDataset::from_list_file(root, Path::new("list.txt"), &[0, 1], 8).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.labels(), vec![0]);

        let item = dataset.get(0).unwrap();
        assert_eq!(item.size, 8);
        assert_eq!(item.image.len(), 3 * 8 * 8);
        assert!(item.image[0] > 0.7);
        assert!(item.image[2 * 64] < 0.1);
        assert!(dataset.get(1).is_none());
    }

    #[test]
    fn test_empty_selection_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("list.txt"), "a.png 5\n").unwrap();
        let result =
            ImageListDataset::from_list_file(dir.path(), Path::new("list.txt"), &[0, 1], 8);
        assert!(matches!(result, Err(DaError::Dataset(_))));
    }
}
