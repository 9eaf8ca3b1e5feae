use crate::cluster::labels::count_states;
use crate::config::MsmConfig;
use crate::config::SpectralConfig;
use crate::error::Result;
use crate::msm::eigen::Eigensystem;
use crate::msm::eigen::eigen_decompose;
use crate::msm::implied_timescales::LagTimescales;
use crate::msm::implied_timescales::timescales_from_eigenvalues;
use crate::msm::state_matrix::StateMatrix;
use crate::msm::transition_matrix::TransitionEstimate;
use crate::msm::transition_matrix::TransitionMatrix;
use ndarray::ArrayView1;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;

/// Reversible Markov state model estimator.
///
/// Fits a first-order Markov chain to integer-labelled time series at a
/// fixed lag time. The count matrix is symmetrized, so the model satisfies
/// detailed balance, which suits systems sampled at equilibrium.
///
/// # Example
///
/// ```ignore
/// use msm_rs::{MarkovStateModel, MsmConfig, SpectralConfig};
///
/// let msm = MarkovStateModel::new(MsmConfig { lag_time: 10, ..Default::default() });
/// let fitted = msm.fit(labels.view(), Some(&traj_lengths))?;
/// let timescales = fitted.implied_timescales(&SpectralConfig::default())?;
/// ```
#[derive(Debug, Clone)]
pub struct MarkovStateModel {
  config: MsmConfig,
}

impl MarkovStateModel {
  pub fn new(config: MsmConfig) -> Self {
    Self { config }
  }

  /// Estimate the transition matrix from labels and trajectory lengths.
  ///
  /// `segment_lengths` of `None` treats the labels as one trajectory.
  pub fn fit<'a>(
    &self,
    labels: ArrayView1<'a, i32>,
    segment_lengths: Option<&'a [usize]>,
  ) -> Result<FittedMsm> {
    let estimate = TransitionMatrix::builder()
      .labels(labels)
      .segment_lengths(segment_lengths)
      .lag_time(self.config.lag_time)
      .storage(self.config.storage)
      .build()
      .exec()?;
    let n_microstates = count_states(labels);
    info!(
      n_microstates,
      n_states = estimate.n_states,
      lag_time = self.config.lag_time,
      "fitted Markov state model"
    );

    Ok(FittedMsm {
      estimate,
      n_microstates,
      config: self.config.clone(),
    })
  }
}

/// A fitted Markov state model.
///
/// Holds the estimated matrices and populations; can be serialized and
/// reloaded without the original labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedMsm {
  pub(crate) estimate: TransitionEstimate,
  pub(crate) n_microstates: usize,
  pub(crate) config: MsmConfig,
}

impl FittedMsm {
  /// Size of the state space, `max(label) + 1`.
  pub fn n_states(&self) -> usize {
    self.estimate.n_states
  }

  /// Number of distinct labels actually observed.
  pub fn n_microstates(&self) -> usize {
    self.n_microstates
  }

  pub fn lag_time(&self) -> usize {
    self.config.lag_time
  }

  pub fn transition_matrix(&self) -> &StateMatrix {
    &self.estimate.probabilities
  }

  pub fn count_matrix(&self) -> &StateMatrix {
    &self.estimate.symmetric_counts
  }

  pub fn populations(&self) -> ArrayView1<'_, f64> {
    self.estimate.populations.view()
  }

  pub fn estimate(&self) -> &TransitionEstimate {
    &self.estimate
  }

  pub fn config(&self) -> &MsmConfig {
    &self.config
  }

  /// Leading eigenpairs of the transition matrix.
  pub fn eigensystem(&self, config: &SpectralConfig) -> Result<Eigensystem> {
    eigen_decompose(&self.estimate.probabilities, config)
  }

  /// Implied timescales of the leading `config.n_modes - 1` relaxation modes.
  pub fn implied_timescales(&self, config: &SpectralConfig) -> Result<LagTimescales> {
    let eigen = self.eigensystem(config)?;
    Ok(timescales_from_eigenvalues(
      eigen.eigenvalues.view(),
      self.config.lag_time,
    ))
  }
}
