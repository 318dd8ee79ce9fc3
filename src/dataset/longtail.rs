//! Long-tail resampling of list files
//!
//! Produces an imbalanced copy of every list file in a directory: classes
//! are ranked by frequency and the class at rank `r` (0-based) keeps
//! `round((max - min) / (r + 1)^2) + min` randomly chosen images, where `max`
//! is the size of the largest class. Output goes to a sibling `<dir>-lt`
//! directory with the same file names, grouped by ascending label.

use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;
use walkdir::WalkDir;

use crate::dataset::list::{read_list_file, ListEntry};
use crate::utils::error::{DaError, Result, ResultExt};

/// Target number of images for the class at frequency rank `rank`
pub fn target_count(max: usize, min: usize, rank: usize) -> usize {
    let span = max as f64 - min as f64;
    let scaled = (span / ((rank + 1) * (rank + 1)) as f64).round_ties_even();
    (scaled + min as f64).max(0.0) as usize
}

/// Apply the long-tail profile to one list
pub fn longtail_entries(entries: &[ListEntry], min_img_num: usize, rng: &mut ChaCha8Rng) -> Vec<ListEntry> {
    // Group by label, keeping first-appearance order so ties rank stably
    let mut groups: Vec<(usize, Vec<String>)> = Vec::new();
    for entry in entries {
        match groups.iter_mut().find(|(label, _)| *label == entry.label) {
            Some((_, paths)) => paths.push(entry.path.clone()),
            None => groups.push((entry.label, vec![entry.path.clone()])),
        }
    }
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let max = match groups.first() {
        Some((_, paths)) => paths.len(),
        None => return Vec::new(),
    };

    let mut kept: Vec<(usize, Vec<String>)> = groups
        .into_iter()
        .enumerate()
        .map(|(rank, (label, mut paths))| {
            let n = target_count(max, min_img_num, rank).min(paths.len());
            paths.shuffle(rng);
            paths.truncate(n);
            (label, paths)
        })
        .collect();
    kept.sort_by_key(|(label, _)| *label);

    kept.into_iter()
        .flat_map(|(label, paths)| paths.into_iter().map(move |path| ListEntry { path, label }))
        .collect()
}

/// Output directory for a source directory: `<dir>-lt`
pub fn output_dir(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_os_string();
    name.push("-lt");
    PathBuf::from(name)
}

/// Resample every list file in `dir`. Returns the written paths.
pub fn sample_to_longtail(dir: &Path, min_img_num: usize, seed: u64) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DaError::Dataset(format!("{} is not a directory", dir.display())));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(DaError::Dataset(format!("no list files in {}", dir.display())));
    }

    let out_dir = output_dir(dir);
    fs::create_dir_all(&out_dir)?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let entries = read_list_file(&file)?;
        let resampled = longtail_entries(&entries, min_img_num, &mut rng);

        let name = file
            .file_name()
            .with_context(|| format!("bad list file name {}", file.display()))?;
        let out_path = out_dir.join(name);

        let mut contents = String::new();
        for entry in &resampled {
            contents.push_str(&format!("{} {}\n", entry.path, entry.label));
        }
        fs::write(&out_path, contents)?;

        info!(
            "{:?}: kept {} of {} images",
            out_path,
            resampled.len(),
            entries.len()
        );
        written.push(out_path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(counts: &[(usize, usize)]) -> Vec<ListEntry> {
        counts
            .iter()
            .flat_map(|&(label, n)| {
                (0..n).map(move |i| ListEntry {
                    path: format!("c{label}/{i}.jpg"),
                    label,
                })
            })
            .collect()
    }

    fn count(list: &[ListEntry], label: usize) -> usize {
        list.iter().filter(|e| e.label == label).count()
    }

    #[test]
    fn test_target_count_profile() {
        assert_eq!(target_count(100, 5, 0), 100);
        assert_eq!(target_count(100, 5, 1), 29); // 95/4 = 23.75
        assert_eq!(target_count(100, 5, 2), 16); // 95/9 = 10.56
        assert_eq!(target_count(100, 5, 9), 6); // 95/100 = 0.95
        assert_eq!(target_count(9, 5, 1), 6);
        assert_eq!(target_count(10, 4, 1), 6); // 6/4 = 1.5 ties to even
    }

    #[test]
    fn test_longtail_counts() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let list = entries(&[(0, 20), (1, 40), (2, 10)]);
        let out = longtail_entries(&list, 2, &mut rng);

        // ranks: label 1 (40), label 0 (20), label 2 (10)
        assert_eq!(count(&out, 1), 40);
        assert_eq!(count(&out, 0), 12); // round(38/4)=10 (9.5 ties to even) + 2
        assert_eq!(count(&out, 2), 6); // round(38/9)=4 + 2
    }

    #[test]
    fn test_output_is_sorted_by_label() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let list = entries(&[(3, 5), (1, 5), (2, 5)]);
        let out = longtail_entries(&list, 1, &mut rng);
        let labels: Vec<usize> = out.iter().map(|e| e.label).collect();
        let mut sorted = labels.clone();
        sorted.sort_unstable();
        assert_eq!(labels, sorted);
    }

    #[test]
    fn test_small_class_keeps_everything_it_has() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let out = longtail_entries(&entries(&[(0, 10), (1, 1)]), 5, &mut rng);
        assert_eq!(count(&out, 1), 1);
    }

    #[test]
    fn test_sample_to_longtail_writes_sibling_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("office");
        fs::create_dir_all(&dir).unwrap();

        let mut contents = String::new();
        for e in entries(&[(0, 8), (1, 4)]) {
            contents.push_str(&format!("{} {}\n", e.path, e.label));
        }
        fs::write(dir.join("amazon.txt"), contents).unwrap();

        let written = sample_to_longtail(&dir, 1, 0).unwrap();
        assert_eq!(written, vec![tmp.path().join("office-lt").join("amazon.txt")]);

        let out = read_list_file(&written[0]).unwrap();
        assert_eq!(count(&out, 0), 8);
        assert_eq!(count(&out, 1), 3); // round(7/4)=2 + 1
    }

    #[test]
    fn test_bad_input_dir_creates_no_output_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing");
        assert!(matches!(sample_to_longtail(&missing, 1, 0), Err(DaError::Dataset(_))));
        assert!(!output_dir(&missing).exists());

        let empty = tmp.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        assert!(matches!(sample_to_longtail(&empty, 1, 0), Err(DaError::Dataset(_))));
        assert!(!output_dir(&empty).exists());
    }
}
