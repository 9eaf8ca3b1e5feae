use crate::cluster::labels::compact_labels;
use crate::cluster::labels::n_states;
use crate::cluster::labels::validate_labels;
use crate::config::OutlierPolicy;
use crate::constants::OUTLIER;
use crate::constants::RETAIN_THRESHOLD;
use crate::error::MsmError;
use crate::error::Result;
use ndarray::Array1;
use ndarray::ArrayView1;
use tracing::debug;

/*
  Combine a refined clustering with the clustering it refines.

  For every prior cluster c, the retained fraction is the share of its
  samples that received a valid label in the refined pass. Clusters whose
  retained fraction exceeds RETAIN_THRESHOLD are replaced: their samples
  take the refined label shifted past the prior id range (new + n_old), so
  prior and refined ids never collide. Samples of a replaced cluster that
  became outliers follow `outliers`. Every other sample keeps its prior
  label. The result is compacted onto 0..m.

  Parameters
  ----------
  new_labels: array of shape (n_samples)
      Labels from the refinement pass, -1 for outliers.

  old_labels: array of shape (n_samples)
      Labels from the previous pass, same sample order.

  outliers: OutlierPolicy
      Keep the prior label or mark as outlier.

  Returns
  -------
  Merged labels in [-1, m) where m is the number of distinct merged states.
*/
pub fn merge_assignments(
  new_labels: ArrayView1<i32>,
  old_labels: ArrayView1<i32>,
  outliers: OutlierPolicy,
) -> Result<Array1<i32>> {
  if new_labels.len() != old_labels.len() {
    return Err(MsmError::LengthMismatch {
      left: new_labels.len(),
      right: old_labels.len(),
    });
  }
  validate_labels(new_labels)?;
  validate_labels(old_labels)?;

  let n_old = n_states(old_labels);
  let mut retained = vec![0usize; n_old];
  let mut total = vec![0usize; n_old];
  for (&old, &new) in old_labels.iter().zip(new_labels.iter()) {
    if old != OUTLIER {
      total[old as usize] += 1;
      if new != OUTLIER {
        retained[old as usize] += 1;
      }
    }
  }

  let replaced: Vec<bool> = retained
    .iter()
    .zip(total.iter())
    .map(|(&r, &t)| t > 0 && r as f64 / t as f64 > RETAIN_THRESHOLD)
    .collect();
  debug!(
    n_old,
    n_replaced = replaced.iter().filter(|r| **r).count(),
    "merging assignments"
  );

  let merged: Array1<i32> = old_labels
    .iter()
    .zip(new_labels.iter())
    .map(|(&old, &new)| {
      if old == OUTLIER || !replaced[old as usize] {
        old
      } else if new != OUTLIER {
        new + n_old as i32
      } else {
        match outliers {
          OutlierPolicy::Keep => old,
          OutlierPolicy::Drop => OUTLIER,
        }
      }
    })
    .collect();

  Ok(compact_labels(merged.view()))
}
