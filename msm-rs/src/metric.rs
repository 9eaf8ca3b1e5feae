use crate::distances;
use crate::error::MsmError;
use crate::error::Result;
use crate::samples::SampleSet;
use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::Axis;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::fmt::Debug;
use std::str::FromStr;

/// A distance oracle over a sample set.
///
/// Implementations must be deterministic, symmetric and non-negative, with a
/// distance of zero from a sample to itself. Thread-safety (Send + Sync) is
/// required because per-sample evaluation runs in parallel.
pub trait Metric: Debug + Send + Sync {
  /// Distance from every sample to the sample at `reference`.
  ///
  /// # Returns
  ///
  /// A vector of length `samples.len()` whose entry `reference` is 0.
  ///
  /// # Errors
  ///
  /// Fails if the metric cannot handle the kind of samples given or if
  /// `reference` is out of range.
  fn distances_to(&self, samples: &SampleSet, reference: usize) -> Result<Array1<f64>>;
}

/// The closed set of supported metrics.
///
/// Vector metrics operate on [`SampleSet::Vectors`]; `Rmsd` operates on
/// [`SampleSet::Frames`]. Names parse with [`FromStr`] using the lowercase
/// identifiers returned by [`MetricKind::name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
  Euclidean,
  SqEuclidean,
  Cityblock,
  Chebyshev,
  Canberra,
  BrayCurtis,
  Hamming,
  Jaccard,
  /// Minimal RMSD after optimal superposition of two frames.
  Rmsd,
}

impl MetricKind {
  pub const ALL: [MetricKind; 9] = [
    MetricKind::Euclidean,
    MetricKind::SqEuclidean,
    MetricKind::Cityblock,
    MetricKind::Chebyshev,
    MetricKind::Canberra,
    MetricKind::BrayCurtis,
    MetricKind::Hamming,
    MetricKind::Jaccard,
    MetricKind::Rmsd,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      MetricKind::Euclidean => "euclidean",
      MetricKind::SqEuclidean => "sqeuclidean",
      MetricKind::Cityblock => "cityblock",
      MetricKind::Chebyshev => "chebyshev",
      MetricKind::Canberra => "canberra",
      MetricKind::BrayCurtis => "braycurtis",
      MetricKind::Hamming => "hamming",
      MetricKind::Jaccard => "jaccard",
      MetricKind::Rmsd => "rmsd",
    }
  }

  fn vector_fn(&self) -> Option<fn(ArrayView1<f64>, ArrayView1<f64>) -> f64> {
    let f: fn(ArrayView1<f64>, ArrayView1<f64>) -> f64 = match self {
      MetricKind::Euclidean => distances::euclidean,
      MetricKind::SqEuclidean => distances::sqeuclidean,
      MetricKind::Cityblock => distances::cityblock,
      MetricKind::Chebyshev => distances::chebyshev,
      MetricKind::Canberra => distances::canberra,
      MetricKind::BrayCurtis => distances::braycurtis,
      MetricKind::Hamming => distances::hamming,
      MetricKind::Jaccard => distances::jaccard,
      MetricKind::Rmsd => return None,
    };
    Some(f)
  }
}

impl fmt::Display for MetricKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for MetricKind {
  type Err = MsmError;

  fn from_str(s: &str) -> Result<Self> {
    let lower = s.trim().to_ascii_lowercase();
    MetricKind::ALL
      .into_iter()
      .find(|m| m.name() == lower)
      .ok_or_else(|| MsmError::UnknownMetric(s.to_string()))
  }
}

impl Metric for MetricKind {
  fn distances_to(&self, samples: &SampleSet, reference: usize) -> Result<Array1<f64>> {
    let n_samples = samples.len();
    if reference >= n_samples {
      return Err(MsmError::ReferenceOutOfRange {
        index: reference,
        n_samples,
      });
    }

    // Each sample is independent, so the query is split across threads
    let dists: Vec<f64> = match (self.vector_fn(), samples) {
      (Some(f), SampleSet::Vectors(x)) => {
        let r = x.row(reference);
        x.axis_iter(Axis(0))
          .into_par_iter()
          .map(|row| f(row, r))
          .collect()
      }
      (None, SampleSet::Frames(x)) => {
        let r = x.index_axis(Axis(0), reference);
        x.axis_iter(Axis(0))
          .into_par_iter()
          .map(|frame| distances::rmsd(frame, r))
          .collect()
      }
      (Some(_), SampleSet::Frames(_)) => {
        return Err(MsmError::MetricMismatch {
          metric: self.name(),
          expected: "vector",
        });
      }
      (None, SampleSet::Vectors(_)) => {
        return Err(MsmError::MetricMismatch {
          metric: self.name(),
          expected: "frame",
        });
      }
    };

    Ok(Array1::from(dists))
  }
}
