//! Class partition for universal domain adaptation
//!
//! Labels `0..n_total` are split into three contiguous ranges:
//! common classes shared by both domains, source-private classes and
//! target-private ("unknown") classes.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::utils::error::{DaError, Result};

/// The (common, source-private, target-private) label layout of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassPartition {
    pub n_share: usize,
    pub n_source_private: usize,
    pub n_total: usize,
}

impl ClassPartition {
    /// Build a partition, failing fast on inconsistent sizes
    pub fn new(n_share: usize, n_source_private: usize, n_total: usize) -> Result<Self> {
        let partition = Self {
            n_share,
            n_source_private,
            n_total,
        };
        partition.validate()?;
        Ok(partition)
    }

    pub fn validate(&self) -> Result<()> {
        let source = self.n_share + self.n_source_private;
        if source > self.n_total {
            return Err(DaError::Config(format!(
                "n_share ({}) + n_source_private ({}) exceeds n_total ({})",
                self.n_share, self.n_source_private, self.n_total
            )));
        }
        if source == 0 {
            return Err(DaError::Config(
                "the source domain needs at least one class (n_share + n_source_private > 0)"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn common(&self) -> Range<usize> {
        0..self.n_share
    }

    pub fn source_private(&self) -> Range<usize> {
        self.n_share..self.n_share + self.n_source_private
    }

    pub fn target_private(&self) -> Range<usize> {
        self.n_share + self.n_source_private..self.n_total
    }

    /// Common followed by source-private labels
    pub fn source_classes(&self) -> Vec<usize> {
        self.common().chain(self.source_private()).collect()
    }

    /// Common followed by target-private labels
    pub fn target_classes(&self) -> Vec<usize> {
        self.common().chain(self.target_private()).collect()
    }

    /// Size of the classifier's label space
    pub fn num_source_classes(&self) -> usize {
        self.n_share + self.n_source_private
    }

    pub fn is_source_class(&self, label: usize) -> bool {
        label < self.num_source_classes()
    }

    pub fn is_target_class(&self, label: usize) -> bool {
        self.common().contains(&label) || self.target_private().contains(&label)
    }
}

impl Default for ClassPartition {
    /// Office-31 open-partial setting: 10 shared, 10 source-private, 31 total
    fn default() -> Self {
        Self {
            n_share: 10,
            n_source_private: 10,
            n_total: 31,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_partition_properties(p: &ClassPartition) {
        let source = p.source_classes();
        let target = p.target_classes();

        let source_set: HashSet<_> = source.iter().copied().collect();
        let target_set: HashSet<_> = target.iter().copied().collect();
        assert_eq!(source_set.len(), source.len(), "source classes duplicated");
        assert_eq!(target_set.len(), target.len(), "target classes duplicated");

        let mut shared: Vec<_> = source_set.intersection(&target_set).copied().collect();
        shared.sort_unstable();
        assert_eq!(shared, p.common().collect::<Vec<_>>());
    }

    #[test]
    fn test_default_office31_layout() {
        let p = ClassPartition::default();
        assert_eq!(p.common(), 0..10);
        assert_eq!(p.source_private(), 10..20);
        assert_eq!(p.target_private(), 20..31);
        assert_eq!(p.num_source_classes(), 20);
        assert_eq!(p.target_classes().len(), 21);
        assert_partition_properties(&p);
    }

    #[test]
    fn test_partition_properties_hold_for_all_small_layouts() {
        for n_total in 1..=8 {
            for n_share in 0..=n_total {
                for n_source_private in 0..=(n_total - n_share) {
                    if n_share + n_source_private == 0 {
                        continue;
                    }
                    let p = ClassPartition::new(n_share, n_source_private, n_total).unwrap();
                    assert_partition_properties(&p);
                    assert_eq!(
                        p.common().len() + p.source_private().len() + p.target_private().len(),
                        n_total
                    );
                }
            }
        }
    }

    #[test]
    fn test_oversized_partition_is_rejected() {
        let err = ClassPartition::new(10, 10, 15).unwrap_err();
        assert!(matches!(err, DaError::Config(_)));
        assert!(ClassPartition::new(0, 0, 5).is_err());
    }

    #[test]
    fn test_membership() {
        let p = ClassPartition::new(2, 1, 5).unwrap();
        assert!(p.is_source_class(2));
        assert!(!p.is_source_class(3));
        assert!(p.is_target_class(0));
        assert!(!p.is_target_class(2));
        assert!(p.is_target_class(4));
    }
}
