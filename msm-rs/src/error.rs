use thiserror::Error;

/// Errors reported by clustering, kinetic-model estimation and persistence.
///
/// Configuration and shape problems are reported before any expensive
/// computation starts. Degenerate data (empty states, invalid eigenvalues)
/// is never an error; it is logged and counted in the result types instead.
#[derive(Debug, Error)]
pub enum MsmError {
  #[error("unknown metric: {0}")]
  UnknownMetric(String),

  #[error("metric {metric} requires {expected} samples")]
  MetricMismatch {
    metric: &'static str,
    expected: &'static str,
  },

  #[error("malformed sample {index}: {reason}")]
  MalformedSample { index: usize, reason: String },

  #[error("sample set is empty")]
  EmptySampleSet,

  #[error("n_clusters must be >= 1")]
  InvalidClusterCount,

  #[error("reference index {index} out of range for {n_samples} samples")]
  ReferenceOutOfRange { index: usize, n_samples: usize },

  #[error("segment lengths sum to {total} but {n_labels} labels were given")]
  SegmentMismatch { total: usize, n_labels: usize },

  #[error("segment {0} has zero length")]
  EmptySegment(usize),

  #[error("label arrays differ in length: {left} vs {right}")]
  LengthMismatch { left: usize, right: usize },

  #[error("label {label} at position {index} is below the outlier sentinel")]
  InvalidLabel { index: usize, label: i32 },

  #[error("lag time must be >= 1")]
  InvalidLag,

  #[error("matrix must be square, got {rows}x{cols}")]
  NotSquare { rows: usize, cols: usize },

  #[error("n_modes must be between 1 and {n_states}, got {n_modes}")]
  InvalidModeCount { n_modes: usize, n_states: usize },

  #[error("operation cancelled")]
  Cancelled,

  #[error("parse error on line {line}: {reason}")]
  Parse { line: usize, reason: String },

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MsmError>;
