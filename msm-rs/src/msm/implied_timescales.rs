use crate::cancel::CancelToken;
use crate::cluster::labels::validate_labels;
use crate::config::MatrixStorage;
use crate::config::SpectralConfig;
use crate::config::TimescaleConfig;
use crate::error::Result;
use crate::msm::eigen::eigen_decompose;
use crate::msm::transition_matrix::TransitionMatrix;
use crate::msm::transition_matrix::segment_bounds;
use ndarray::ArrayView1;
use serde::Deserialize;
use serde::Serialize;
use std::time::Instant;
use tracing::info;
use tracing::warn;
use typed_builder::TypedBuilder;

/// Implied timescales of one lag time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagTimescales {
  pub lag_time: usize,
  /// One entry per valid non-stationary mode, in eigenvalue order.
  pub timescales: Vec<f64>,
  /// Modes omitted because their eigenvalue was outside (0, 1).
  pub n_invalid: usize,
}

impl LagTimescales {
  /// `(lag, timescale)` rows as they are persisted.
  pub fn rows(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
    self.timescales.iter().map(move |&t| (self.lag_time, t))
  }
}

/// Convert eigenvalues (sorted, stationary first) to implied timescales
/// `-lag / ln(lambda)`.
///
/// The leading eigenvalue is skipped. Eigenvalues outside (0, 1) have no
/// timescale and are counted instead.
pub fn timescales_from_eigenvalues(eigenvalues: ArrayView1<f64>, lag_time: usize) -> LagTimescales {
  let mut timescales = Vec::new();
  let mut n_invalid = 0;
  for &lambda in eigenvalues.iter().skip(1) {
    if lambda > 0.0 && lambda < 1.0 {
      timescales.push(-(lag_time as f64) / lambda.ln());
    } else {
      n_invalid += 1;
    }
  }
  LagTimescales {
    lag_time,
    timescales,
    n_invalid,
  }
}

/*
  Sweep the lag time and compute implied timescales at each value.

  For lag in 1..max_lag a transition matrix is built, decomposed, and its
  non-stationary eigenvalues are turned into relaxation times. A plateau
  of the timescales as the lag grows indicates a suitable model lag.

  Parameters
  ----------
  labels: array of shape (n_samples)

  segment_lengths: slice (optional)
      Independent trajectory lengths; one trajectory by default.

  max_lag: int (optional, default 50)
      Exclusive upper bound of the lag sweep.

  n_timescales: int (optional)
      Timescales per lag. Defaults to every non-stationary mode.

  storage: MatrixStorage (optional, default Dense)

  spectral: SpectralConfig (optional)
      Solver settings; n_modes is set per lag.

  cancel: CancelToken (optional)
      Polled before each lag.

  Returns
  -------
  One LagTimescales per lag time, in increasing lag order.
*/
#[derive(TypedBuilder, Debug)]
pub struct ImpliedTimescales<'a> {
  labels: ArrayView1<'a, i32>,
  #[builder(default)]
  segment_lengths: Option<&'a [usize]>,
  #[builder(default = 50)]
  max_lag: usize,
  #[builder(default)]
  n_timescales: Option<usize>,
  #[builder(default)]
  storage: MatrixStorage,
  #[builder(default)]
  spectral: SpectralConfig,
  #[builder(default, setter(strip_option))]
  cancel: Option<&'a CancelToken>,
}

impl<'a> ImpliedTimescales<'a> {
  /// Sweep with the parameters of a [`TimescaleConfig`].
  pub fn from_config(
    labels: ArrayView1<'a, i32>,
    segment_lengths: Option<&'a [usize]>,
    config: &TimescaleConfig,
  ) -> Result<Vec<LagTimescales>> {
    ImpliedTimescales {
      labels,
      segment_lengths,
      max_lag: config.max_lag,
      n_timescales: config.n_timescales,
      storage: config.storage,
      spectral: config.spectral.clone(),
      cancel: None,
    }
    .exec()
  }

  pub fn exec(self) -> Result<Vec<LagTimescales>> {
    let Self {
      labels,
      segment_lengths,
      max_lag,
      n_timescales,
      storage,
      spectral,
      cancel,
    } = self;

    // Shape problems abort before the first decomposition
    validate_labels(labels)?;
    segment_bounds(labels.len(), segment_lengths)?;

    info!(max_lag, n_samples = labels.len(), "starting implied timescale sweep");
    let started = Instant::now();
    let mut results = Vec::with_capacity(max_lag.saturating_sub(1));

    for lag_time in 1..max_lag {
      CancelToken::check(cancel)?;

      let estimate = TransitionMatrix::builder()
        .labels(labels)
        .segment_lengths(segment_lengths)
        .lag_time(lag_time)
        .storage(storage)
        .build()
        .exec()?;

      if estimate.n_states < 2 || estimate.n_transitions == 0 {
        warn!(
          lag_time,
          n_states = estimate.n_states,
          "no relaxation modes at this lag"
        );
        results.push(LagTimescales {
          lag_time,
          timescales: Vec::new(),
          n_invalid: 0,
        });
        continue;
      }

      let n_modes = n_timescales.map_or(estimate.n_states, |t| (t + 1).min(estimate.n_states));
      let eigen = eigen_decompose(
        &estimate.probabilities,
        &SpectralConfig {
          n_modes,
          ..spectral.clone()
        },
      )?;

      let lag = timescales_from_eigenvalues(eigen.eigenvalues.view(), lag_time);
      if lag.n_invalid > 0 {
        warn!(
          lag_time,
          n_invalid = lag.n_invalid,
          "omitted timescales with eigenvalues outside (0, 1)"
        );
      }
      info!(
        lag_time,
        n_timescales = lag.timescales.len(),
        slowest = ?lag.timescales.first(),
        "implied timescales"
      );
      results.push(lag);
    }

    info!(
      duration_ms = started.elapsed().as_millis(),
      n_lags = results.len(),
      "implied timescale sweep complete"
    );
    Ok(results)
  }
}
