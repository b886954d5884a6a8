//! Stratified train/test splitting

use crate::error::{LifecycleError, LifecycleResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Row indices of each side of a split
#[derive(Debug, Clone, PartialEq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split row indices so that each class keeps its ratio in both sides.
///
/// Each class contributes `round(n_c * test_fraction)` rows to the test
/// side, clamped to `[1, n_c - 1]`. The shuffle is seeded, so the same
/// labels and seed always produce the same split.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> LifecycleResult<SplitIndices> {
    if !(0.0..1.0).contains(&test_fraction) || test_fraction == 0.0 {
        return Err(LifecycleError::InvalidInput(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, &y) in labels.iter().enumerate() {
        by_class.entry(y).or_default().push(i);
    }
    if by_class.len() < 2 {
        return Err(LifecycleError::InsufficientData(
            "stratification needs at least two classes".to_string(),
        ));
    }
    if let Some((class, rows)) = by_class.iter().find(|(_, rows)| rows.len() < 2) {
        return Err(LifecycleError::InsufficientData(format!(
            "class {} has only {} row(s); at least 2 are needed to stratify",
            class,
            rows.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for rows in by_class.values_mut() {
        rows.shuffle(&mut rng);
        let n = rows.len();
        let n_test = ((n as f64 * test_fraction).round() as usize).clamp(1, n - 1);
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    Ok(SplitIndices { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_ratio_preserved() {
        // 40 positives, 10 negatives
        let labels: Vec<u8> = (0..50).map(|i| if i < 40 { 1 } else { 0 }).collect();
        let split = stratified_split(&labels, 0.2, 42).unwrap();

        assert_eq!(split.train.len() + split.test.len(), 50);
        let test_pos = split.test.iter().filter(|&&i| labels[i] == 1).count();
        let test_neg = split.test.len() - test_pos;
        assert_eq!(test_pos, 8);
        assert_eq!(test_neg, 2);
    }

    #[test]
    fn test_sides_are_disjoint() {
        let labels: Vec<u8> = (0..20).map(|i| (i % 2) as u8).collect();
        let split = stratified_split(&labels, 0.2, 7).unwrap();
        assert!(split.test.iter().all(|i| !split.train.contains(i)));
    }

    #[test]
    fn test_seeded_split_is_reproducible() {
        let labels: Vec<u8> = (0..30).map(|i| (i % 3 == 0) as u8).collect();
        let a = stratified_split(&labels, 0.2, 42).unwrap();
        let b = stratified_split(&labels, 0.2, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_class_rejected() {
        let err = stratified_split(&[1, 1, 1, 1], 0.2, 42).unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
    }

    #[test]
    fn test_singleton_class_rejected() {
        let err = stratified_split(&[1, 1, 1, 0], 0.2, 42).unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
    }
}
