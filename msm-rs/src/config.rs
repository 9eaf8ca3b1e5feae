use crate::metric::MetricKind;
use serde::Deserialize;
use serde::Serialize;

/// How the first k-centers seed is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeedPolicy {
  /// Start from the sample at this index.
  Fixed(usize),
  /// Draw an index uniformly from `[0, n_samples)` using the caller's RNG.
  Random,
}

/// Backing store for count and transition matrices.
///
/// Chosen by the caller from the expected size of the state space; it is
/// never inferred from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatrixStorage {
  /// Dense `n_states x n_states` arrays and a full eigendecomposition.
  #[default]
  Dense,
  /// Compressed sparse rows and an iterative eigensolver for the leading modes.
  Sparse,
}

/// What happens to samples of a replaced cluster that became outliers in
/// the refined pass when merging assignments.
///
/// There is deliberately no default: callers must choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutlierPolicy {
  /// Keep the sample's previous label.
  Keep,
  /// Mark the sample as an outlier.
  Drop,
}

/// Configuration for k-centers clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KCentersConfig {
  /// Number of centers to select.
  ///
  /// Truncated to the number of samples when larger. Fewer centers are
  /// returned when the data contains fewer distinct locations.
  ///
  /// Must be >= 1.
  ///
  /// Default: 8
  pub n_clusters: usize,

  /// Distance metric used to compare samples.
  ///
  /// Default: Euclidean
  pub metric: MetricKind,

  /// How the first center is chosen.
  ///
  /// Default: Fixed(0)
  pub seed: SeedPolicy,
}

impl Default for KCentersConfig {
  fn default() -> Self {
    Self {
      n_clusters: 8,
      metric: MetricKind::Euclidean,
      seed: SeedPolicy::Fixed(0),
    }
  }
}

/// Configuration for estimating a Markov state model at one lag time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsmConfig {
  /// Number of steps between the "from" and "to" observation of a transition.
  ///
  /// Must be >= 1.
  ///
  /// Default: 1
  pub lag_time: usize,

  /// Backing store for the count and transition matrices.
  ///
  /// Default: Dense
  pub storage: MatrixStorage,
}

impl Default for MsmConfig {
  fn default() -> Self {
    Self {
      lag_time: 1,
      storage: MatrixStorage::Dense,
    }
  }
}

/// Configuration for eigendecomposition of a transition matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralConfig {
  /// Number of eigenpairs to return (including the stationary one).
  ///
  /// Capped at the number of states.
  ///
  /// Default: 5
  pub n_modes: usize,

  /// Imaginary parts above this magnitude are reported as a data-quality
  /// warning before being discarded.
  ///
  /// Default: 1e-8
  pub imaginary_tolerance: f64,

  /// Iteration cap of the sparse subspace solver.
  ///
  /// Default: 1000
  pub max_iterations: usize,

  /// Convergence threshold on the change of Ritz values between sparse
  /// solver iterations.
  ///
  /// Default: 1e-10
  pub tolerance: f64,
}

impl Default for SpectralConfig {
  fn default() -> Self {
    Self {
      n_modes: 5,
      imaginary_tolerance: crate::constants::IMAGINARY_TOLERANCE,
      max_iterations: 1000,
      tolerance: 1e-10,
    }
  }
}

/// Configuration for an implied-timescale sweep over lag times.
///
/// # Example
///
/// ```ignore
/// use msm_rs::config::TimescaleConfig;
///
/// let config = TimescaleConfig {
///     max_lag: 20,
///     n_timescales: Some(4),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimescaleConfig {
  /// Lag times `1..max_lag` are evaluated (upper bound exclusive).
  ///
  /// Default: 50
  pub max_lag: usize,

  /// Number of timescales per lag time. `None` keeps every non-stationary
  /// mode of the state space.
  ///
  /// Default: None
  pub n_timescales: Option<usize>,

  /// Backing store used for every lag time.
  ///
  /// Default: Dense
  pub storage: MatrixStorage,

  /// Eigensolver settings. `n_modes` is overridden per lag.
  pub spectral: SpectralConfig,
}

impl Default for TimescaleConfig {
  fn default() -> Self {
    Self {
      max_lag: 50,
      n_timescales: None,
      storage: MatrixStorage::Dense,
      spectral: SpectralConfig::default(),
    }
  }
}
