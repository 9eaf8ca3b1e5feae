use crate::cluster::labels::n_states;
use crate::cluster::labels::validate_labels;
use crate::config::MatrixStorage;
use crate::constants::OUTLIER;
use crate::error::MsmError;
use crate::error::Result;
use crate::msm::state_matrix::StateMatrix;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::s;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use sprs::TriMat;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;
use typed_builder::TypedBuilder;

type Counts = HashMap<(usize, usize), u64>;

/// Everything estimated from one set of labelled time series at one lag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEstimate {
  /// `max(label) + 1`.
  pub n_states: usize,
  pub lag_time: usize,
  /// Raw transition counts `C[i, j]`, integer valued.
  pub counts: StateMatrix,
  /// `0.5 * (C + C^T)`.
  pub symmetric_counts: StateMatrix,
  /// Row-normalized symmetric counts. Rows without counts stay zero.
  pub probabilities: StateMatrix,
  /// Stationary populations from the column sums of the symmetric counts.
  pub populations: Array1<f64>,
  /// Total number of counted transitions.
  pub n_transitions: u64,
  /// States without any outgoing count.
  pub n_empty_states: usize,
  /// `sum |C - C^T| / 2` relative to the number of transitions.
  pub reversibility_deviation: f64,
}

/// Check that the segments partition the labels and return their
/// `(start, length)` pairs. `None` means one segment covering everything.
pub(crate) fn segment_bounds(
  n_labels: usize,
  segment_lengths: Option<&[usize]>,
) -> Result<Vec<(usize, usize)>> {
  let Some(lengths) = segment_lengths else {
    return Ok(vec![(0, n_labels)]);
  };
  if let Some(index) = lengths.iter().position(|&l| l == 0) {
    return Err(MsmError::EmptySegment(index));
  }
  let total: usize = lengths.iter().sum();
  if total != n_labels {
    return Err(MsmError::SegmentMismatch { total, n_labels });
  }
  let mut start = 0;
  Ok(
    lengths
      .iter()
      .map(|&len| {
        let bounds = (start, len);
        start += len;
        bounds
      })
      .collect(),
  )
}

/*
  Count lagged transitions in one segment. Pairs with an outlier at either
  end are skipped, and a segment not longer than the lag contributes nothing.
*/
fn count_segment(segment: ArrayView1<i32>, lag_time: usize) -> Counts {
  let mut counts = Counts::new();
  if lag_time >= segment.len() {
    return counts;
  }
  for (&from, &to) in segment.iter().zip(segment.iter().skip(lag_time)) {
    if from != OUTLIER && to != OUTLIER {
      *counts.entry((from as usize, to as usize)).or_insert(0) += 1;
    }
  }
  counts
}

fn to_state_matrix(
  n_states: usize,
  storage: MatrixStorage,
  entries: impl Iterator<Item = (usize, usize, f64)>,
) -> StateMatrix {
  match storage {
    MatrixStorage::Dense => {
      let mut m = Array2::zeros((n_states, n_states));
      for (i, j, v) in entries {
        m[(i, j)] += v;
      }
      StateMatrix::Dense(m)
    }
    MatrixStorage::Sparse => {
      // Duplicate triplets are summed when converting to CSR
      let mut tri = TriMat::new((n_states, n_states));
      for (i, j, v) in entries {
        tri.add_triplet(i, j, v);
      }
      StateMatrix::Sparse(tri.to_csr())
    }
  }
}

fn row_normalize(symmetric: &StateMatrix, row_sums: &Array1<f64>) -> StateMatrix {
  match symmetric {
    StateMatrix::Dense(m) => {
      let mut p = m.clone();
      for (mut row, &sum) in p.rows_mut().into_iter().zip(row_sums.iter()) {
        if sum > 0.0 {
          row /= sum;
        }
      }
      StateMatrix::Dense(p)
    }
    StateMatrix::Sparse(m) => {
      let mut tri = TriMat::new(m.shape());
      for (&val, (row, col)) in m.iter() {
        if row_sums[row] > 0.0 {
          tri.add_triplet(row, col, val / row_sums[row]);
        }
      }
      StateMatrix::Sparse(tri.to_csr())
    }
  }
}

/*
  Build the reversible transition matrix of a set of labelled time series.

  Transitions (labels[i] -> labels[i + lag_time]) are counted within each
  segment independently; pairs never straddle a segment boundary. The count
  matrix is symmetrized, 0.5 * (C + C^T), which enforces detailed balance,
  and then row-normalized into a transition probability matrix.

  Parameters
  ----------
  labels: array of shape (n_samples)
      Concatenated state labels, -1 for outliers.

  segment_lengths: slice (optional)
      Lengths of the independent trajectories, summing to n_samples.
      Defaults to a single trajectory.

  lag_time: int (optional, default 1)

  storage: MatrixStorage (optional, default Dense)

  Returns
  -------
  TransitionEstimate. An input without any valid transition yields an
  all-zero probability matrix and a warning rather than an error.
*/
#[derive(TypedBuilder, Debug)]
pub struct TransitionMatrix<'a> {
  labels: ArrayView1<'a, i32>,
  #[builder(default)]
  segment_lengths: Option<&'a [usize]>,
  #[builder(default = 1)]
  lag_time: usize,
  #[builder(default)]
  storage: MatrixStorage,
}

impl<'a> TransitionMatrix<'a> {
  pub fn exec(self) -> Result<TransitionEstimate> {
    let Self {
      labels,
      segment_lengths,
      lag_time,
      storage,
    } = self;

    if lag_time == 0 {
      return Err(MsmError::InvalidLag);
    }
    validate_labels(labels)?;
    let bounds = segment_bounds(labels.len(), segment_lengths)?;
    let n_states = n_states(labels);

    let started = Instant::now();

    // Per-segment accumulators, merged once every segment is done
    let counts = bounds
      .par_iter()
      .map(|&(start, len)| count_segment(labels.slice(s![start..start + len]), lag_time))
      .reduce(Counts::new, |mut acc, part| {
        for (key, n) in part {
          *acc.entry(key).or_insert(0) += n;
        }
        acc
      });

    let n_transitions: u64 = counts.values().sum();

    // sum |C - C^T| / 2, i.e. one term per unordered pair of states
    let asymmetry: u64 = counts
      .iter()
      .filter(|((i, j), _)| i != j)
      .map(|(&(i, j), &n)| match counts.get(&(j, i)) {
        Some(&back) if i < j => n.abs_diff(back),
        Some(_) => 0,
        None => n,
      })
      .sum();
    let reversibility_deviation = if n_transitions > 0 {
      asymmetry as f64 / n_transitions as f64
    } else {
      0.0
    };

    let raw = to_state_matrix(
      n_states,
      storage,
      counts.iter().map(|(&(i, j), &n)| (i, j, n as f64)),
    );
    let symmetric_counts = to_state_matrix(
      n_states,
      storage,
      counts
        .iter()
        .flat_map(|(&(i, j), &n)| [(i, j, 0.5 * n as f64), (j, i, 0.5 * n as f64)]),
    );

    let row_sums = symmetric_counts.row_sums();
    let n_empty_states = row_sums.iter().filter(|&&s| s == 0.0).count();
    let probabilities = row_normalize(&symmetric_counts, &row_sums);

    let total = symmetric_counts.sum();
    let populations = if total > 0.0 {
      symmetric_counts.column_sums() / total
    } else {
      Array1::zeros(n_states)
    };

    if n_transitions == 0 {
      warn!(
        lag_time,
        n_segments = bounds.len(),
        "no valid transitions counted; transition matrix is all zero"
      );
    } else if n_empty_states > 0 {
      warn!(
        n_empty_states,
        n_states, lag_time, "states without outgoing transitions left as zero rows"
      );
    }
    debug!(reversibility_deviation, "deviation from detailed balance");
    info!(
      duration_ms = started.elapsed().as_millis(),
      n_states,
      n_transitions,
      lag_time,
      "transition matrix complete"
    );

    Ok(TransitionEstimate {
      n_states,
      lag_time,
      counts: raw,
      symmetric_counts,
      probabilities,
      populations,
      n_transitions,
      n_empty_states,
      reversibility_deviation,
    })
  }
}
