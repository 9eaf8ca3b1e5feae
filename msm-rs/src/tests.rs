#[cfg(test)]
mod tests {
  use crate::CancelToken;
  use crate::Clustering;
  use crate::FittedMsm;
  use crate::ImpliedTimescales;
  use crate::KCenters;
  use crate::MarkovStateModel;
  use crate::MatrixStorage;
  use crate::Metric;
  use crate::MetricKind;
  use crate::MsmConfig;
  use crate::MsmError;
  use crate::OutlierPolicy;
  use crate::SampleSet;
  use crate::SeedPolicy;
  use crate::SpectralConfig;
  use crate::StateMatrix;
  use crate::TransitionMatrix;
  use crate::cluster::labels::compact_labels;
  use crate::cluster::labels::count_states;
  use crate::cluster::labels::offset_labels;
  use crate::cluster::labels::sample_state_indices;
  use crate::cluster::labels::state_populations;
  use crate::distances;
  use crate::eigen_decompose;
  use crate::io;
  use crate::merge_assignments;
  use crate::msm::implied_timescales::timescales_from_eigenvalues;
  use ndarray::Array1;
  use ndarray::Array2;
  use ndarray::Array3;
  use ndarray::ArrayView1;
  use ndarray::array;
  use rand::Rng;
  use rand::SeedableRng;
  use rand::rngs::StdRng;
  use sprs::TriMat;
  use std::io::Cursor;

  /// Generate clustered synthetic feature vectors around a few well-separated
  /// means.
  fn generate_test_data(seed: u64) -> SampleSet {
    let n_samples = 60;
    let n_features = 4;
    let mut rng = StdRng::seed_from_u64(seed);
    let data = Array2::from_shape_fn((n_samples, n_features), |(i, _)| {
      (i % 3) as f64 * 10.0 + rng.random::<f64>()
    });
    SampleSet::Vectors(data)
  }

  /// Metastable two-state trajectory: long dwells with occasional hops.
  fn generate_two_state_labels(n: usize, seed: u64) -> Array1<i32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = 0;
    let mut labels = Array1::zeros(n);
    for l in labels.iter_mut() {
      if rng.random::<f64>() < 0.05 {
        state = 1 - state;
      }
      *l = state;
    }
    labels
  }

  fn assert_close(a: f64, b: f64, tol: f64) {
    assert!((a - b).abs() <= tol, "{a} != {b} (tol {tol})");
  }

  fn run_k_centers(samples: &SampleSet, n_clusters: usize, seed: SeedPolicy) -> Clustering {
    KCenters::builder()
      .samples(samples)
      .n_clusters(n_clusters)
      .metric(&MetricKind::Euclidean)
      .seed(seed)
      .build()
      .exec(&mut StdRng::seed_from_u64(7))
      .unwrap()
  }

  #[test]
  fn test_k_centers_assignment_properties() {
    let samples = generate_test_data(1);
    let clustering = run_k_centers(&samples, 5, SeedPolicy::Fixed(0));

    assert_eq!(clustering.n_clusters(), 5);
    assert_eq!(clustering.centers[0], 0);
    let mut distinct = clustering.centers.clone();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct.len(), 5);

    let metric = MetricKind::Euclidean;
    let to_centers: Vec<Array1<f64>> = clustering
      .centers
      .iter()
      .map(|&c| metric.distances_to(&samples, c).unwrap())
      .collect();

    for i in 0..samples.len() {
      let label = clustering.labels[i];
      assert!(label >= 0 && (label as usize) < 5);
      assert_close(clustering.distances[i], to_centers[label as usize][i], 1e-12);
      for dists in &to_centers {
        assert!(clustering.distances[i] <= dists[i] + 1e-12);
      }
    }
    // Each center is labelled with its own cluster at distance zero
    for (k, &c) in clustering.centers.iter().enumerate() {
      assert_eq!(clustering.labels[c], k as i32);
      assert_eq!(clustering.distances[c], 0.0);
    }
  }

  #[test]
  fn test_k_centers_is_deterministic() {
    let samples = generate_test_data(2);
    let a = run_k_centers(&samples, 6, SeedPolicy::Fixed(3));
    let b = run_k_centers(&samples, 6, SeedPolicy::Fixed(3));
    assert_eq!(a, b);
  }

  #[test]
  fn test_k_centers_single_cluster() {
    let samples = generate_test_data(3);
    let clustering = run_k_centers(&samples, 1, SeedPolicy::Fixed(4));
    assert_eq!(clustering.centers, vec![4]);
    assert!(clustering.labels.iter().all(|&l| l == 0));
  }

  #[test]
  fn test_k_centers_truncates_to_sample_count() {
    let samples = SampleSet::Vectors(array![[0.0], [1.0], [3.0]]);
    let clustering = run_k_centers(&samples, 10, SeedPolicy::Fixed(0));
    assert_eq!(clustering.centers, vec![0, 2, 1]);
    assert_eq!(clustering.labels, array![0, 2, 1]);
    assert_eq!(clustering.radius(), 0.0);
  }

  #[test]
  fn test_k_centers_stops_on_duplicates() {
    let samples = SampleSet::Vectors(array![[1.0, 1.0], [1.0, 1.0], [5.0, 5.0], [5.0, 5.0]]);
    let clustering = run_k_centers(&samples, 4, SeedPolicy::Fixed(0));
    assert_eq!(clustering.centers, vec![0, 2]);
    assert_eq!(clustering.labels, array![0, 0, 1, 1]);
  }

  #[test]
  fn test_k_centers_random_seed() {
    let samples = generate_test_data(4);
    let run = |seed| {
      KCenters::builder()
        .samples(&samples)
        .n_clusters(3)
        .metric(&MetricKind::Cityblock)
        .seed(SeedPolicy::Random)
        .build()
        .exec(&mut StdRng::seed_from_u64(seed))
        .unwrap()
    };
    let a = run(11);
    assert_eq!(a, run(11));
    assert!(a.centers[0] < samples.len());
  }

  #[test]
  fn test_k_centers_rejects_bad_input() {
    let samples = generate_test_data(5);
    let mut rng = StdRng::seed_from_u64(0);

    let zero = KCenters::builder()
      .samples(&samples)
      .n_clusters(0)
      .metric(&MetricKind::Euclidean)
      .build()
      .exec(&mut rng);
    assert!(matches!(zero, Err(MsmError::InvalidClusterCount)));

    let out_of_range = KCenters::builder()
      .samples(&samples)
      .n_clusters(2)
      .metric(&MetricKind::Euclidean)
      .seed(SeedPolicy::Fixed(1000))
      .build()
      .exec(&mut rng);
    assert!(matches!(
      out_of_range,
      Err(MsmError::ReferenceOutOfRange { index: 1000, .. })
    ));

    let empty = SampleSet::Vectors(Array2::zeros((0, 3)));
    let result = KCenters::builder()
      .samples(&empty)
      .n_clusters(2)
      .metric(&MetricKind::Euclidean)
      .build()
      .exec(&mut rng);
    assert!(matches!(result, Err(MsmError::EmptySampleSet)));

    let nan = SampleSet::Vectors(array![[0.0], [f64::NAN]]);
    let result = KCenters::builder()
      .samples(&nan)
      .n_clusters(2)
      .metric(&MetricKind::Euclidean)
      .build()
      .exec(&mut rng);
    assert!(matches!(result, Err(MsmError::MalformedSample { index: 1, .. })));
  }

  #[test]
  fn test_k_centers_cancelled() {
    let samples = generate_test_data(6);
    let token = CancelToken::new();
    token.cancel();
    let result = KCenters::builder()
      .samples(&samples)
      .n_clusters(4)
      .metric(&MetricKind::Euclidean)
      .cancel(&token)
      .build()
      .exec(&mut StdRng::seed_from_u64(0));
    assert!(matches!(result, Err(MsmError::Cancelled)));
  }

  /// Distance oracle that only looks at the first coordinate.
  #[derive(Debug)]
  struct FirstCoordinate;

  impl Metric for FirstCoordinate {
    fn distances_to(&self, samples: &SampleSet, reference: usize) -> crate::Result<Array1<f64>> {
      match samples {
        SampleSet::Vectors(x) => {
          let r = x[(reference, 0)];
          Ok(x.column(0).mapv(|v| (v - r).abs()))
        }
        SampleSet::Frames(_) => Err(MsmError::MetricMismatch {
          metric: "first-coordinate",
          expected: "vector",
        }),
      }
    }
  }

  #[test]
  fn test_k_centers_custom_metric() {
    let samples = SampleSet::Vectors(array![[0.0, 100.0], [0.5, -100.0], [9.0, 0.0]]);
    let clustering = KCenters::builder()
      .samples(&samples)
      .n_clusters(2)
      .metric(&FirstCoordinate)
      .build()
      .exec(&mut StdRng::seed_from_u64(0))
      .unwrap();
    assert_eq!(clustering.centers, vec![0, 2]);
    assert_eq!(clustering.labels, array![0, 0, 1]);
  }

  #[test]
  fn test_metric_parsing_and_mismatch() {
    assert_eq!("Euclidean".parse::<MetricKind>().unwrap(), MetricKind::Euclidean);
    assert_eq!("rmsd".parse::<MetricKind>().unwrap(), MetricKind::Rmsd);
    for metric in MetricKind::ALL {
      assert_eq!(metric.to_string().parse::<MetricKind>().unwrap(), metric);
    }
    assert!(matches!(
      "mahalanobis".parse::<MetricKind>(),
      Err(MsmError::UnknownMetric(_))
    ));

    let vectors = generate_test_data(7);
    assert!(matches!(
      MetricKind::Rmsd.distances_to(&vectors, 0),
      Err(MsmError::MetricMismatch { .. })
    ));
    let frames = SampleSet::Frames(Array3::zeros((2, 3, 3)));
    assert!(matches!(
      MetricKind::Euclidean.distances_to(&frames, 0),
      Err(MsmError::MetricMismatch { .. })
    ));
  }

  #[test]
  fn test_vector_distances() {
    let x = array![1.0, 0.0, 2.0];
    let y = array![0.0, 0.0, 4.0];
    assert_close(distances::euclidean(x.view(), y.view()), 5f64.sqrt(), 1e-12);
    assert_close(distances::sqeuclidean(x.view(), y.view()), 5.0, 1e-12);
    assert_close(distances::cityblock(x.view(), y.view()), 3.0, 1e-12);
    assert_close(distances::chebyshev(x.view(), y.view()), 2.0, 1e-12);
    assert_close(distances::hamming(x.view(), y.view()), 2.0 / 3.0, 1e-12);
    assert_close(distances::jaccard(x.view(), y.view()), 0.5, 1e-12);
    assert_close(distances::braycurtis(x.view(), y.view()), 3.0 / 7.0, 1e-12);
  }

  #[test]
  fn test_rmsd_is_superposition_invariant() {
    let frame = array![
      [0.0, 0.0, 0.0],
      [1.5, 0.0, 0.0],
      [0.0, 2.0, 0.0],
      [0.3, 0.4, 1.0]
    ];
    let (s, c) = 0.7f64.sin_cos();
    let rotation = array![[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]];
    let moved = frame.dot(&rotation.t()) + &array![3.0, -1.0, 2.0];

    assert_close(distances::rmsd(frame.view(), frame.view()), 0.0, 1e-5);
    assert_close(distances::rmsd(frame.view(), moved.view()), 0.0, 1e-5);

    // A mirror image is not superimposable by rotation
    let mirrored = frame.mapv(|v| v) * &array![1.0, 1.0, -1.0];
    assert!(distances::rmsd(frame.view(), mirrored.view()) > 1e-3);

    let mut frames = Array3::zeros((2, 4, 3));
    frames.index_axis_mut(ndarray::Axis(0), 0).assign(&frame);
    frames.index_axis_mut(ndarray::Axis(0), 1).assign(&moved);
    let dists = MetricKind::Rmsd
      .distances_to(&SampleSet::Frames(frames), 0)
      .unwrap();
    assert_close(dists[1], 0.0, 1e-5);
  }

  #[test]
  fn test_frames_from_rows() {
    let rows = Array2::from_shape_fn((2, 6), |(i, j)| (i * 6 + j) as f64);
    let SampleSet::Frames(frames) = SampleSet::frames_from_rows(rows.clone(), 2).unwrap() else {
      panic!("expected frames");
    };
    assert_eq!(frames.shape(), &[2, 2, 3]);
    assert_eq!(frames[(1, 1, 2)], 11.0);
    assert!(SampleSet::frames_from_rows(rows, 3).is_err());
  }

  #[test]
  fn test_merge_keeps_poorly_retained_clusters() {
    let old = array![0, 0, 0, 1, 1];
    let new = array![-1, 0, 0, 1, -1];
    let merged = merge_assignments(new.view(), old.view(), OutlierPolicy::Keep).unwrap();
    assert_eq!(merged, old);
  }

  #[test]
  fn test_merge_replaces_retained_clusters() {
    let old = array![0, 0, 0, 1, 1];
    let new = array![0, 1, 1, -1, -1];
    let merged = merge_assignments(new.view(), old.view(), OutlierPolicy::Keep).unwrap();
    assert_eq!(merged, array![1, 2, 2, 0, 0]);
  }

  #[test]
  fn test_merge_outlier_policy() {
    // Both clusters are replaced: 4 of 5 and 1 of 1 samples retained
    let old = array![0, 0, 0, 0, 0, 1];
    let new = array![2, 2, 3, 3, -1, 0];
    let keep = merge_assignments(new.view(), old.view(), OutlierPolicy::Keep).unwrap();
    assert_eq!(keep, array![2, 2, 3, 3, 0, 1]);
    let drop = merge_assignments(new.view(), old.view(), OutlierPolicy::Drop).unwrap();
    assert_eq!(drop, array![1, 1, 2, 2, -1, 0]);

    assert!(matches!(
      merge_assignments(new.view(), array![0, 0].view(), OutlierPolicy::Keep),
      Err(MsmError::LengthMismatch { .. })
    ));
    assert!(matches!(
      merge_assignments(array![-2].view(), array![0].view(), OutlierPolicy::Keep),
      Err(MsmError::InvalidLabel { index: 0, label: -2 })
    ));
  }

  #[test]
  fn test_label_utilities() {
    let labels = array![5, -1, 2, 5, 9];
    assert_eq!(compact_labels(labels.view()), array![1, -1, 0, 1, 2]);
    assert_eq!(compact_labels(array![1, 1, 3].view()), array![0, 0, 1]);
    assert_eq!(count_states(labels.view()), 3);
    assert_eq!(
      state_populations(array![0, 2, 2, -1].view(), 3),
      array![1usize, 0, 2]
    );
    assert_eq!(
      offset_labels(array![0, -1, 1].view(), 3).unwrap(),
      array![3, -1, 4]
    );
    assert!(matches!(
      offset_labels(array![0, 1].view(), -1),
      Err(MsmError::InvalidLabel { index: 0, label: 0 })
    ));

    let mut rng = StdRng::seed_from_u64(0);
    let picks = sample_state_indices(labels.view(), 5, 10, &mut rng);
    assert_eq!(picks.len(), 10);
    assert!(picks.iter().all(|&i| labels[i] == 5));
    assert!(sample_state_indices(labels.view(), 4, 10, &mut rng).is_empty());
  }

  fn estimate<'a>(
    labels: ArrayView1<'a, i32>,
    segments: Option<&'a [usize]>,
    lag_time: usize,
    storage: MatrixStorage,
  ) -> crate::TransitionEstimate {
    TransitionMatrix::builder()
      .labels(labels)
      .segment_lengths(segments)
      .lag_time(lag_time)
      .storage(storage)
      .build()
      .exec()
      .unwrap()
  }

  #[test]
  fn test_transition_matrix_simple_chain() {
    let labels = array![0, 0, 1, 1, 2, 2];
    let est = estimate(labels.view(), None, 1, MatrixStorage::Dense);

    assert_eq!(est.n_states, 3);
    assert_eq!(est.n_transitions, 5);
    assert_eq!(est.counts.get(0, 1), 1.0);
    assert_eq!(est.counts.get(1, 0), 0.0);
    assert_close(est.symmetric_counts.get(0, 0), 1.0, 1e-12);
    assert_close(est.symmetric_counts.get(0, 1), 0.5, 1e-12);
    assert_close(est.symmetric_counts.get(1, 0), 0.5, 1e-12);
    assert_close(est.probabilities.get(0, 0), 2.0 / 3.0, 1e-12);
    assert_close(est.probabilities.get(0, 1), 1.0 / 3.0, 1e-12);
    assert_close(est.populations.sum(), 1.0, 1e-12);
    assert_close(est.reversibility_deviation, 2.0 / 5.0, 1e-12);
  }

  #[test]
  fn test_transition_matrix_invariants() {
    let mut rng = StdRng::seed_from_u64(9);
    let labels: Array1<i32> = (0..500).map(|_| rng.random_range(-1..6)).collect();
    let segments = [120, 80, 300];
    let est = estimate(labels.view(), Some(&segments), 3, MatrixStorage::Dense);

    let mut valid = 0;
    let mut start = 0;
    for &len in &segments {
      for i in start..start + len - 3 {
        if labels[i] != -1 && labels[i + 3] != -1 {
          valid += 1;
        }
      }
      start += len;
    }
    assert_eq!(est.n_transitions, valid);
    assert_close(est.counts.sum(), valid as f64, 1e-9);
    assert_close(est.symmetric_counts.sum(), valid as f64, 1e-9);
    assert!(est.symmetric_counts.is_symmetric(1e-12));
    for s in est.probabilities.row_sums().iter() {
      assert!((s - 1.0).abs() < 1e-12 || *s == 0.0);
    }
    assert!(est.probabilities.to_dense().iter().all(|&p| p >= 0.0));
  }

  #[test]
  fn test_transition_matrix_segments() {
    // The 0 -> 1 step straddles the boundary and must not be counted
    let labels = array![0, 0, 1, 1];
    let est = estimate(labels.view(), Some(&[2, 2]), 1, MatrixStorage::Dense);
    assert_eq!(est.n_transitions, 2);
    assert_eq!(est.counts.get(0, 1), 0.0);
    assert_eq!(est.probabilities.get(0, 0), 1.0);

    // Lag not shorter than every segment leaves nothing to count
    let est = estimate(labels.view(), Some(&[2, 2]), 2, MatrixStorage::Dense);
    assert_eq!(est.n_transitions, 0);
    assert_eq!(est.probabilities.sum(), 0.0);
    assert_eq!(est.n_empty_states, 2);

    let mismatch = TransitionMatrix::builder()
      .labels(labels.view())
      .segment_lengths(Some(&[3, 2][..]))
      .build()
      .exec();
    assert!(matches!(
      mismatch,
      Err(MsmError::SegmentMismatch { total: 5, n_labels: 4 })
    ));
    let zero_lag = TransitionMatrix::builder()
      .labels(labels.view())
      .lag_time(0)
      .build()
      .exec();
    assert!(matches!(zero_lag, Err(MsmError::InvalidLag)));
  }

  #[test]
  fn test_transition_matrix_empty_state_stays_zero() {
    // State 1 never occurs: its row stays zero instead of becoming NaN
    let labels = array![0, 2, 0, 2, 2];
    let est = estimate(labels.view(), None, 1, MatrixStorage::Dense);
    assert_eq!(est.n_states, 3);
    assert_eq!(est.n_empty_states, 1);
    assert_eq!(est.probabilities.row_sums()[1], 0.0);
    assert!(est.probabilities.to_dense().iter().all(|p| p.is_finite()));
  }

  #[test]
  fn test_sparse_matches_dense() {
    let labels = generate_two_state_labels(400, 3);
    let dense = estimate(labels.view(), Some(&[150, 250]), 2, MatrixStorage::Dense);
    let sparse = estimate(labels.view(), Some(&[150, 250]), 2, MatrixStorage::Sparse);
    assert!(sparse.probabilities.is_sparse());
    assert_eq!(dense.n_transitions, sparse.n_transitions);
    let diff = &dense.probabilities.to_dense() - &sparse.probabilities.to_dense();
    assert!(diff.iter().all(|d| d.abs() < 1e-12));
    let diff = &dense.populations - &sparse.populations;
    assert!(diff.iter().all(|d| d.abs() < 1e-12));
  }

  #[test]
  fn test_eigen_two_state() {
    let spectral = SpectralConfig {
      n_modes: 2,
      ..Default::default()
    };
    let dense = StateMatrix::Dense(array![[0.9, 0.1], [0.2, 0.8]]);
    let eigen = eigen_decompose(&dense, &spectral).unwrap();
    assert_eq!(eigen.n_modes(), 2);
    assert_close(eigen.eigenvalues[0], 1.0, 1e-10);
    assert_close(eigen.eigenvalues[1], 0.7, 1e-10);
    assert_eq!(eigen.n_complex, 0);
    // Stationary right eigenvector is constant
    assert_close(eigen.eigenvectors[(0, 0)], eigen.eigenvectors[(1, 0)], 1e-8);

    let mut tri = TriMat::new((2, 2));
    tri.add_triplet(0, 0, 0.9);
    tri.add_triplet(0, 1, 0.1);
    tri.add_triplet(1, 0, 0.2);
    tri.add_triplet(1, 1, 0.8);
    let sparse = StateMatrix::Sparse(tri.to_csr());
    let eigen = eigen_decompose(&sparse, &spectral).unwrap();
    assert_close(eigen.eigenvalues[0], 1.0, 1e-10);
    assert_close(eigen.eigenvalues[1], 0.7, 1e-10);
  }

  #[test]
  fn test_eigen_sparse_subspace_matches_dense() {
    // Lazy random walk on a path of 20 states
    let n = 20;
    let mut dense = Array2::zeros((n, n));
    let mut tri = TriMat::new((n, n));
    for i in 0..n {
      let mut entries = vec![(i, 0.5)];
      match i {
        0 => entries.push((1, 0.5)),
        i if i == n - 1 => entries.push((n - 2, 0.5)),
        _ => entries.extend([(i - 1, 0.25), (i + 1, 0.25)]),
      }
      for (j, p) in entries {
        dense[(i, j)] = p;
        tri.add_triplet(i, j, p);
      }
    }
    let spectral = SpectralConfig {
      n_modes: 3,
      ..Default::default()
    };
    let from_dense = eigen_decompose(&StateMatrix::Dense(dense), &spectral).unwrap();
    let from_sparse = eigen_decompose(&StateMatrix::Sparse(tri.to_csr()), &spectral).unwrap();

    assert_close(from_dense.eigenvalues[0], 1.0, 1e-9);
    for k in 0..3 {
      let expected = 0.5 + 0.5 * (std::f64::consts::PI * k as f64 / (n - 1) as f64).cos();
      assert_close(from_dense.eigenvalues[k], expected, 1e-8);
      assert_close(from_sparse.eigenvalues[k], expected, 1e-6);
    }
  }

  /// Reversible chain of weakly coupled blocks: random symmetric counts
  /// inside each block, `coupling` between neighbouring blocks.
  fn generate_block_chain(blocks: &[usize], coupling: f64, seed: u64) -> Array2<f64> {
    let n: usize = blocks.iter().sum();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut block_of = Vec::with_capacity(n);
    for (b, &size) in blocks.iter().enumerate() {
      block_of.extend(std::iter::repeat_n(b, size));
    }
    let mut counts = Array2::<f64>::zeros((n, n));
    for i in 0..n {
      for j in i..n {
        let c = if block_of[i] == block_of[j] {
          1.0 + rng.random::<f64>()
        } else if block_of[i].abs_diff(block_of[j]) == 1 {
          coupling
        } else {
          0.0
        };
        counts[(i, j)] = c;
        counts[(j, i)] = c;
      }
    }
    for mut row in counts.rows_mut() {
      let sum = row.sum();
      row /= sum;
    }
    counts
  }

  fn to_sparse(p: &Array2<f64>) -> StateMatrix {
    let mut tri = TriMat::new(p.dim());
    for ((i, j), &v) in p.indexed_iter() {
      if v != 0.0 {
        tri.add_triplet(i, j, v);
      }
    }
    StateMatrix::Sparse(tri.to_csr())
  }

  /// Largest `|P v - lambda v|` over all returned eigenpairs.
  fn max_residual(p: &Array2<f64>, eigen: &crate::Eigensystem) -> f64 {
    eigen
      .eigenvalues
      .iter()
      .zip(eigen.eigenvectors.columns())
      .map(|(&lambda, v)| {
        (&p.dot(&v) - &(&v * lambda))
          .iter()
          .fold(0.0, |m: f64, r| m.max(r.abs()))
      })
      .fold(0.0, f64::max)
  }

  #[test]
  fn test_eigenvectors_satisfy_eigen_equation() {
    // 40 states and 5 modes: large enough for the iterative sparse path
    let p = generate_block_chain(&[8, 8, 8, 8, 8], 0.01, 21);
    let spectral = SpectralConfig {
      n_modes: 5,
      ..Default::default()
    };
    for matrix in [StateMatrix::Dense(p.clone()), to_sparse(&p)] {
      let eigen = eigen_decompose(&matrix, &spectral).unwrap();
      assert_eq!(eigen.n_modes(), 5);
      assert_eq!(eigen.eigenvectors.dim(), (40, 5));
      assert_close(eigen.eigenvalues[0], 1.0, 1e-8);
      for k in 1..5 {
        assert!(eigen.eigenvalues[k] <= eigen.eigenvalues[k - 1]);
        assert!(eigen.eigenvalues[k] > 0.5);
      }
      for v in eigen.eigenvectors.columns() {
        assert_close(v.dot(&v), 1.0, 1e-8);
      }
      let residual = max_residual(&p, &eigen);
      assert!(residual < 1e-6, "residual {residual} (sparse: {})", matrix.is_sparse());
    }
  }

  #[test]
  fn test_eigen_degenerate_stationary_modes() {
    // Two disconnected blocks: eigenvalue 1 appears twice
    let p = generate_block_chain(&[15, 15], 0.0, 4);
    let spectral = SpectralConfig {
      n_modes: 3,
      ..Default::default()
    };
    for matrix in [StateMatrix::Dense(p.clone()), to_sparse(&p)] {
      let eigen = eigen_decompose(&matrix, &spectral).unwrap();
      assert_close(eigen.eigenvalues[0], 1.0, 1e-8);
      assert_close(eigen.eigenvalues[1], 1.0, 1e-8);
      assert!(eigen.eigenvalues[2] < 1.0 - 1e-3);

      let v0 = eigen.eigenvectors.column(0);
      let v1 = eigen.eigenvectors.column(1);
      assert!(v0.dot(&v1).abs() < 0.5, "stationary vectors are not independent");
      let residual = max_residual(&p, &eigen);
      assert!(residual < 1e-6, "residual {residual} (sparse: {})", matrix.is_sparse());
    }
  }

  #[test]
  fn test_eigen_rejects_bad_shapes() {
    let spectral = SpectralConfig::default();
    let rect = StateMatrix::Dense(Array2::zeros((2, 3)));
    assert!(matches!(
      eigen_decompose(&rect, &spectral),
      Err(MsmError::NotSquare { rows: 2, cols: 3 })
    ));
    let zero_modes = SpectralConfig {
      n_modes: 0,
      ..Default::default()
    };
    assert!(matches!(
      eigen_decompose(&StateMatrix::Dense(Array2::eye(2)), &zero_modes),
      Err(MsmError::InvalidModeCount { .. })
    ));
    // More modes than states are capped
    let eigen = eigen_decompose(&StateMatrix::Dense(Array2::eye(2)), &spectral).unwrap();
    assert_eq!(eigen.n_modes(), 2);
  }

  #[test]
  fn test_timescales_from_eigenvalues() {
    let lag = timescales_from_eigenvalues(array![1.0, 0.5, -0.2, 1.0, 0.0].view(), 2);
    assert_eq!(lag.n_invalid, 3);
    assert_eq!(lag.timescales.len(), 1);
    assert_close(lag.timescales[0], -2.0 / 0.5f64.ln(), 1e-12);
    assert_eq!(lag.rows().collect::<Vec<_>>(), vec![(2, lag.timescales[0])]);
  }

  #[test]
  fn test_implied_timescales_sweep() {
    let labels = generate_two_state_labels(2000, 5);
    let sweep = ImpliedTimescales::builder()
      .labels(labels.view())
      .max_lag(6)
      .build()
      .exec()
      .unwrap();
    assert_eq!(sweep.len(), 5);
    for (i, lag) in sweep.iter().enumerate() {
      assert_eq!(lag.lag_time, i + 1);
      assert_eq!(lag.timescales.len() + lag.n_invalid, 1);
      assert!(lag.timescales.iter().all(|t| *t > 0.0 && t.is_finite()));
    }

    let limited = ImpliedTimescales::builder()
      .labels(labels.view())
      .max_lag(3)
      .n_timescales(Some(1))
      .storage(MatrixStorage::Sparse)
      .build()
      .exec()
      .unwrap();
    assert_eq!(limited.len(), 2);
    assert_close(limited[0].timescales[0], sweep[0].timescales[0], 1e-6);

    // max_lag of 1 evaluates nothing
    let empty = ImpliedTimescales::builder()
      .labels(labels.view())
      .max_lag(1)
      .build()
      .exec()
      .unwrap();
    assert!(empty.is_empty());
  }

  #[test]
  fn test_implied_timescales_cancelled() {
    let labels = generate_two_state_labels(200, 1);
    let token = CancelToken::new();
    token.cancel();
    let result = ImpliedTimescales::builder()
      .labels(labels.view())
      .max_lag(10)
      .cancel(&token)
      .build()
      .exec();
    assert!(matches!(result, Err(MsmError::Cancelled)));
  }

  #[test]
  fn test_markov_state_model_fit() {
    let labels = generate_two_state_labels(1000, 2);
    let msm = MarkovStateModel::new(MsmConfig {
      lag_time: 2,
      ..Default::default()
    });
    let fitted = msm.fit(labels.view(), Some(&[500, 500])).unwrap();
    assert_eq!(fitted.n_states(), 2);
    assert_eq!(fitted.n_microstates(), 2);
    assert_eq!(fitted.lag_time(), 2);
    assert_close(fitted.populations().sum(), 1.0, 1e-12);
    assert!(fitted.count_matrix().is_symmetric(1e-12));

    let ts = fitted
      .implied_timescales(&SpectralConfig {
        n_modes: 2,
        ..Default::default()
      })
      .unwrap();
    assert_eq!(ts.timescales.len(), 1);
    // Hops happen about every 20 steps
    assert!(ts.timescales[0] > 2.0);
  }

  #[test]
  fn test_fitted_msm_serialization() {
    let labels = generate_two_state_labels(300, 8);
    for storage in [MatrixStorage::Dense, MatrixStorage::Sparse] {
      let fitted = MarkovStateModel::new(MsmConfig {
        lag_time: 1,
        storage,
      })
      .fit(labels.view(), None)
      .unwrap();

      // Serialize and deserialize
      let serialized = bincode::serialize(&fitted).expect("Serialization failed");
      let fitted2: FittedMsm = bincode::deserialize(&serialized).expect("Deserialization failed");

      assert_eq!(fitted2.n_states(), fitted.n_states());
      assert_eq!(fitted2.transition_matrix().is_sparse(), storage == MatrixStorage::Sparse);
      assert_eq!(
        fitted2.transition_matrix().to_dense(),
        fitted.transition_matrix().to_dense()
      );
      assert_eq!(fitted2.populations(), fitted.populations());
    }
  }

  #[test]
  fn test_clustering_serialization() {
    let samples = generate_test_data(10);
    let clustering = run_k_centers(&samples, 3, SeedPolicy::Fixed(0));
    let serialized = bincode::serialize(&clustering).expect("Serialization failed");
    let clustering2: Clustering = bincode::deserialize(&serialized).expect("Deserialization failed");
    assert_eq!(clustering, clustering2);
  }

  #[test]
  fn test_io_parsing() {
    let text = "# labels\n0 1\n\n-1\n2\n";
    let labels: Vec<i32> = io::parse_column(Cursor::new(text)).unwrap();
    assert_eq!(labels, vec![0, 1, -1, 2]);

    let bad = io::parse_column::<i32, _>(Cursor::new("0\nx\n"));
    assert!(matches!(bad, Err(MsmError::Parse { line: 2, .. })));

    let matrix = io::parse_matrix(Cursor::new("1 2 3\n4 5 6\n")).unwrap();
    assert_eq!(matrix, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    let ragged = io::parse_matrix(Cursor::new("1 2\n3\n"));
    assert!(matches!(ragged, Err(MsmError::Parse { line: 2, .. })));
  }

  #[test]
  fn test_io_writing() {
    let lag = timescales_from_eigenvalues(array![1.0, 0.5, 0.25].view(), 4);
    let mut out = Vec::new();
    io::write_timescale_rows(&mut out, &lag).unwrap();
    let text = String::from_utf8(out).unwrap();
    let expected = format!(
      "4 {:.6}\n4 {:.6}\n",
      -4.0 / 0.5f64.ln(),
      -4.0 / 0.25f64.ln()
    );
    assert_eq!(text, expected);

    let mut out = Vec::new();
    io::write_column(&mut out, [3, -1, 0]).unwrap();
    let parsed: Vec<i32> = io::parse_column(Cursor::new(out)).unwrap();
    assert_eq!(parsed, vec![3, -1, 0]);
  }

  #[test]
  fn test_config_entry_points() {
    let samples = generate_test_data(12);
    let clustering = KCenters::from_config(
      &samples,
      &crate::KCentersConfig {
        n_clusters: 3,
        ..Default::default()
      },
      &mut StdRng::seed_from_u64(0),
    )
    .unwrap();
    assert_eq!(clustering.n_clusters(), 3);

    let labels = generate_two_state_labels(600, 6);
    let lengths = vec![200usize, 400];
    let sweep = ImpliedTimescales::from_config(
      labels.view(),
      Some(lengths.as_slice()),
      &crate::TimescaleConfig {
        max_lag: 4,
        ..Default::default()
      },
    )
    .unwrap();
    assert_eq!(sweep.len(), 3);

    let fitted = MarkovStateModel::new(MsmConfig::default())
      .fit(labels.view(), Some(lengths.as_slice()))
      .unwrap();
    assert_eq!(fitted.n_states(), 2);
  }

  #[test]
  fn test_offset_labels_overflow() {
    let labels = array![i32::MAX - 1, 0, -1];
    assert!(matches!(
      offset_labels(labels.view(), 5),
      Err(MsmError::InvalidLabel { index: 0, label }) if label == i32::MAX - 1
    ));
    assert_eq!(
      offset_labels(labels.view(), 1).unwrap(),
      array![i32::MAX, 1, -1]
    );
  }

  #[test]
  fn test_clustering_files_named_by_centers_found() {
    let dir = std::env::temp_dir().join(format!("msm-rs-clustering-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    // Four centers requested, only two distinct locations exist
    let samples = SampleSet::Vectors(array![[1.0, 1.0], [1.0, 1.0], [5.0, 5.0], [5.0, 5.0]]);
    let clustering = run_k_centers(&samples, 4, SeedPolicy::Fixed(0));
    let (assignments, centers) = io::write_clustering(&dir, &clustering).unwrap();
    assert!(assignments.ends_with("assignments_kcenters_n_2.txt"));
    assert!(centers.ends_with("cluster_centers_kcenters_n_2.txt"));
    assert_eq!(io::read_labels(&assignments).unwrap(), clustering.labels);
    assert_eq!(io::read_indices(&centers).unwrap(), clustering.centers);

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn test_io_files() {
    let dir = std::env::temp_dir().join(format!("msm-rs-io-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let labels = array![0, 2, -1, 1];
    let path = dir.join("assignments.txt");
    io::write_labels(&path, labels.view()).unwrap();
    assert_eq!(io::read_labels(&path).unwrap(), labels);

    let path = dir.join("centers.txt");
    io::write_indices(&path, &[4, 0, 7]).unwrap();
    assert_eq!(io::read_indices(&path).unwrap(), vec![4, 0, 7]);

    let lag = timescales_from_eigenvalues(array![1.0, 0.9].view(), 3);
    let path = io::write_timescales(&dir, &lag).unwrap();
    assert!(path.ends_with("lag.3.tau.dat"));
    let table = io::read_matrix(&path).unwrap();
    assert_eq!(table.shape(), &[1, 2]);
    assert_eq!(table[(0, 0)], 3.0);

    std::fs::remove_dir_all(&dir).unwrap();
  }
}
