use crate::constants::OUTLIER;
use crate::error::MsmError;
use crate::error::Result;
use ndarray::Array1;
use ndarray::ArrayView1;
use rand::Rng;
use std::collections::BTreeMap;

/// Reject labels below the outlier sentinel.
pub(crate) fn validate_labels(labels: ArrayView1<i32>) -> Result<()> {
  match labels.iter().position(|&l| l < OUTLIER) {
    Some(index) => Err(MsmError::InvalidLabel {
      index,
      label: labels[index],
    }),
    None => Ok(()),
  }
}

/// Size of the state space implied by the labels: `max(label) + 1`, or 0
/// when every sample is an outlier.
pub fn n_states(labels: ArrayView1<i32>) -> usize {
  labels
    .iter()
    .copied()
    .max()
    .map_or(0, |max| (max + 1).max(0) as usize)
}

/// Number of distinct non-outlier labels.
pub fn count_states(labels: ArrayView1<i32>) -> usize {
  let mut seen: Vec<i32> = labels.iter().copied().filter(|&l| l != OUTLIER).collect();
  seen.sort_unstable();
  seen.dedup();
  seen.len()
}

/// Number of samples carrying each label in `0..n_states`. Outliers and
/// labels outside the range are not counted.
pub fn state_populations(labels: ArrayView1<i32>, n_states: usize) -> Array1<usize> {
  let mut counts = Array1::<usize>::zeros(n_states);
  for &l in labels.iter() {
    if l >= 0 && (l as usize) < n_states {
      counts[l as usize] += 1;
    }
  }
  counts
}

/*
  Renumber non-outlier labels onto 0..m without gaps, where m is the number
  of distinct labels. Relative order of the labels is preserved and
  outliers stay outliers. Label 0 is remapped like any other label.
*/
pub fn compact_labels(labels: ArrayView1<i32>) -> Array1<i32> {
  let mut mapping: BTreeMap<i32, i32> = labels
    .iter()
    .copied()
    .filter(|&l| l != OUTLIER)
    .map(|l| (l, 0))
    .collect();
  for (rank, target) in mapping.values_mut().enumerate() {
    *target = rank as i32;
  }
  labels.mapv(|l| if l == OUTLIER { OUTLIER } else { mapping[&l] })
}

/// Shift every non-outlier label by `offset`.
///
/// # Errors
///
/// Fails if a shifted label would fall below 0 or overflow `i32`. The
/// error carries the label before shifting.
pub fn offset_labels(labels: ArrayView1<i32>, offset: i32) -> Result<Array1<i32>> {
  let mut shifted = Array1::from_elem(labels.len(), OUTLIER);
  for (index, (&label, out)) in labels.iter().zip(shifted.iter_mut()).enumerate() {
    if label == OUTLIER {
      continue;
    }
    match label.checked_add(offset) {
      Some(moved) if moved >= 0 => *out = moved,
      _ => return Err(MsmError::InvalidLabel { index, label }),
    }
  }
  Ok(shifted)
}

/// Draw `n` indices of samples labelled `state`, with replacement.
///
/// Returns an empty vector when the state has no members.
pub fn sample_state_indices<R: Rng + ?Sized>(
  labels: ArrayView1<i32>,
  state: i32,
  n: usize,
  rng: &mut R,
) -> Vec<usize> {
  let members: Vec<usize> = labels
    .iter()
    .enumerate()
    .filter(|(_, l)| **l == state)
    .map(|(i, _)| i)
    .collect();
  if members.is_empty() {
    return Vec::new();
  }
  (0..n)
    .map(|_| members[rng.random_range(0..members.len())])
    .collect()
}
