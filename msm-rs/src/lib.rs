//! Parallel Rust toolkit for building Markov state models from trajectory data.
//!
//! The pipeline takes an ordered set of samples (feature vectors or structural
//! frames), partitions it into discrete states with k-centers clustering, and
//! estimates a reversible transition matrix whose spectrum yields the slow
//! relaxation timescales of the system.
//!
//! # Example
//!
//! ```ignore
//! use msm_rs::{KCenters, MarkovStateModel, MetricKind, MsmConfig, SampleSet, SpectralConfig};
//!
//! // Discretize the trajectory
//! let samples = SampleSet::Vectors(features);
//! let clustering = KCenters::builder()
//!   .samples(&samples)
//!   .n_clusters(100)
//!   .metric(&MetricKind::Euclidean)
//!   .build()
//!   .exec(&mut rng)?;
//!
//! // Estimate the model at lag 10
//! let msm = MarkovStateModel::new(MsmConfig { lag_time: 10, ..Default::default() });
//! let fitted = msm.fit(clustering.labels.view(), Some(&traj_lengths))?;
//!
//! // Slowest relaxation processes
//! let timescales = fitted.implied_timescales(&SpectralConfig::default())?;
//! ```
//!
//! # Features
//!
//! - **Parallel distances**: Rayon-parallel distance oracle per center query
//! - **Extensible metrics**: Custom distance oracles via the `Metric` trait
//! - **Dense or sparse**: Count and transition matrices in `ndarray` or `sprs`
//! - **Cancellable**: Long loops poll a shared [`CancelToken`]
//! - **Serializable**: Fitted models round-trip through serde
//!
//! # Public API
//!
//! * [`KCenters`] - Greedy farthest-point clustering
//! * [`merge_assignments`] - Combine a refinement pass with prior labels
//! * [`TransitionMatrix`] - Count, symmetrize and normalize transitions
//! * [`MarkovStateModel`] / [`FittedMsm`] - Estimator and fitted model
//! * [`eigen_decompose`] - Leading eigenpairs of a state matrix
//! * [`ImpliedTimescales`] - Timescales over a lag sweep
//! * [`Metric`] / [`MetricKind`] - Distance oracle trait and built-in metrics

// Public modules
pub mod cancel;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod distances;
pub mod error;
pub mod io;
pub mod metric;
pub mod msm;
pub mod samples;

// Public re-exports (primary API)
pub use cancel::CancelToken;
pub use cluster::k_centers::Clustering;
pub use cluster::k_centers::KCenters;
pub use cluster::labels::compact_labels;
pub use cluster::merge_assignments::merge_assignments;
pub use config::KCentersConfig;
pub use config::MatrixStorage;
pub use config::MsmConfig;
pub use config::OutlierPolicy;
pub use config::SeedPolicy;
pub use config::SpectralConfig;
pub use config::TimescaleConfig;
pub use error::MsmError;
pub use error::Result;
pub use metric::Metric;
pub use metric::MetricKind;
pub use msm::eigen::Eigensystem;
pub use msm::eigen::eigen_decompose;
pub use msm::implied_timescales::ImpliedTimescales;
pub use msm::implied_timescales::LagTimescales;
pub use msm::model::FittedMsm;
pub use msm::model::MarkovStateModel;
pub use msm::state_matrix::StateMatrix;
pub use msm::transition_matrix::TransitionEstimate;
pub use msm::transition_matrix::TransitionMatrix;
pub use samples::SampleSet;

// Tests
#[cfg(test)]
mod tests;
