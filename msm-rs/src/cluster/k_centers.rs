use crate::cancel::CancelToken;
use crate::config::KCentersConfig;
use crate::config::SeedPolicy;
use crate::error::MsmError;
use crate::error::Result;
use crate::metric::Metric;
use crate::samples::SampleSet;
use ndarray::Array1;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use std::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;
use typed_builder::TypedBuilder;

/// Result of a k-centers run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clustering {
  /// Sample indices of the centers in selection order; the first is the seed.
  pub centers: Vec<usize>,
  /// For each sample, the position in `centers` of its nearest center.
  pub labels: Array1<i32>,
  /// For each sample, the distance to its assigned center.
  pub distances: Array1<f64>,
}

impl Clustering {
  pub fn n_clusters(&self) -> usize {
    self.centers.len()
  }

  /// Largest distance from any sample to its center.
  pub fn radius(&self) -> f64 {
    self.distances.iter().copied().fold(0.0, f64::max)
  }
}

/*
  K-centers clustering (Gonzalez farthest-point heuristic).

  Start from a seed center and repeatedly promote the sample farthest from
  all selected centers to a new center. Each round costs one distance
  oracle query and one linear scan, so the whole run is O(kN). The result
  is a 2-approximation of the optimal k-center radius.

  Parameters
  ----------
  samples: SampleSet
      The data to cluster. Order is preserved in the labels.

  n_clusters: int
      Number of centers to select. Truncated to the number of samples.

  metric: &dyn Metric
      The distance oracle.

  seed: SeedPolicy (optional, default Fixed(0))
      How the first center is chosen.

  cancel: CancelToken (optional)
      Polled between center selections.

  Returns
  -------
  Clustering with centers, labels in [0, n_centers) and distances to the
  assigned centers. Fewer than n_clusters centers are returned when every
  remaining sample coincides with a selected center.
*/
#[derive(TypedBuilder, Debug)]
pub struct KCenters<'a> {
  samples: &'a SampleSet,
  n_clusters: usize,
  metric: &'a dyn Metric,
  #[builder(default = SeedPolicy::Fixed(0))]
  seed: SeedPolicy,
  #[builder(default, setter(strip_option))]
  cancel: Option<&'a CancelToken>,
}

impl<'a> KCenters<'a> {
  /// Run with the parameters of a [`KCentersConfig`].
  pub fn from_config<R: Rng + ?Sized>(
    samples: &SampleSet,
    config: &KCentersConfig,
    rng: &mut R,
  ) -> Result<Clustering> {
    KCenters::builder()
      .samples(samples)
      .n_clusters(config.n_clusters)
      .metric(&config.metric)
      .seed(config.seed)
      .build()
      .exec(rng)
  }

  /// Select centers and label every sample.
  ///
  /// `rng` is only consulted for [`SeedPolicy::Random`].
  pub fn exec<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Clustering> {
    let Self {
      samples,
      n_clusters,
      metric,
      seed,
      cancel,
    } = self;

    samples.validate()?;
    if n_clusters == 0 {
      return Err(MsmError::InvalidClusterCount);
    }

    let n_samples = samples.len();
    let n_clusters = if n_clusters > n_samples {
      warn!(
        n_clusters,
        n_samples, "more clusters requested than samples; truncating"
      );
      n_samples
    } else {
      n_clusters
    };

    let seed = match seed {
      SeedPolicy::Fixed(index) if index >= n_samples => {
        return Err(MsmError::ReferenceOutOfRange { index, n_samples });
      }
      SeedPolicy::Fixed(index) => index,
      SeedPolicy::Random => rng.random_range(0..n_samples),
    };

    info!(n_samples, n_clusters, seed, metric = ?metric, "starting k-centers");
    let started = Instant::now();

    let mut distances = query(metric, samples, seed)?;
    let mut labels = Array1::<i32>::zeros(n_samples);
    let mut centers = Vec::with_capacity(n_clusters);
    centers.push(seed);

    for _ in 1..n_clusters {
      CancelToken::check(cancel)?;

      let (farthest, max_dist) = argmax(&distances);
      // Every sample sits on a selected center: no new location to add
      if max_dist <= 0.0 {
        info!(
          n_centers = centers.len(),
          n_clusters, "samples exhausted before reaching n_clusters"
        );
        break;
      }

      let label = centers.len() as i32;
      centers.push(farthest);

      let new_distances = query(metric, samples, farthest)?;
      let mut updated = 0usize;
      for ((dist, label_i), &new_dist) in distances
        .iter_mut()
        .zip(labels.iter_mut())
        .zip(new_distances.iter())
      {
        if new_dist < *dist {
          *dist = new_dist;
          *label_i = label;
          updated += 1;
        }
      }
      debug!(center = farthest, max_dist, updated, "selected center");
    }

    let clustering = Clustering {
      centers,
      labels,
      distances,
    };
    info!(
      duration_ms = started.elapsed().as_millis(),
      n_centers = clustering.n_clusters(),
      radius = clustering.radius(),
      "k-centers complete"
    );
    Ok(clustering)
  }
}

fn query(metric: &dyn Metric, samples: &SampleSet, reference: usize) -> Result<Array1<f64>> {
  let dists = metric.distances_to(samples, reference)?;
  if dists.len() != samples.len() {
    return Err(MsmError::LengthMismatch {
      left: dists.len(),
      right: samples.len(),
    });
  }
  if let Some(index) = dists.iter().position(|d| d.is_nan()) {
    return Err(MsmError::MalformedSample {
      index,
      reason: format!("distance to sample {reference} is NaN"),
    });
  }
  Ok(dists)
}

/// Index and value of the maximum; ties go to the first occurrence.
fn argmax(values: &Array1<f64>) -> (usize, f64) {
  let mut best = (0, f64::NEG_INFINITY);
  for (i, &v) in values.iter().enumerate() {
    if v > best.1 {
      best = (i, v);
    }
  }
  best
}
