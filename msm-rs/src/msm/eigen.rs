use crate::config::SpectralConfig;
use crate::error::MsmError;
use crate::error::Result;
use crate::msm::state_matrix::StateMatrix;
use nalgebra::Complex;
use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array1;
use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;
use serde::Serialize;
use std::time::Instant;
use tracing::debug;
use tracing::warn;

/// Refinement steps of shifted inverse iteration per eigenvector.
const INVERSE_ITERATION_STEPS: usize = 6;

/// Eigenvalues closer than this share an eigenspace for deflation.
const DEGENERACY_TOLERANCE: f64 = 1e-6;

/// Seed of the random start block of the sparse solver.
const SUBSPACE_SEED: u64 = 42;

/// Leading eigenpairs of a transition matrix.
///
/// Eigenvalues are sorted by descending real part and paired one to one
/// with the columns of `eigenvectors`. Only real parts are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Eigensystem {
  pub eigenvalues: Array1<f64>,
  /// Right eigenvectors as unit-length columns, largest component positive.
  pub eigenvectors: Array2<f64>,
  /// Eigenvalues whose discarded imaginary part exceeded the tolerance.
  pub n_complex: usize,
}

impl Eigensystem {
  pub fn n_modes(&self) -> usize {
    self.eigenvalues.len()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
  RealPart,
  Magnitude,
}

struct Eigenpairs {
  values: Vec<Complex<f64>>,
  vectors: DMatrix<f64>,
}

fn fix_sign(x: &mut DVector<f64>) {
  let pivot = x.iamax();
  if x[pivot] < 0.0 {
    x.neg_mut();
  }
}

fn orthogonalize(x: &mut DVector<f64>, basis: &[&DVector<f64>]) {
  for &v in basis {
    let projection = x.dot(v);
    x.axpy(-projection, v, 1.0);
  }
}

/*
  Right eigenvector for an (approximately known) real eigenvalue by shifted
  inverse iteration. The shift is nudged off the eigenvalue until the
  shifted matrix factorizes. Vectors already found for the same eigenvalue
  are projected out each step so degenerate eigenspaces yield independent
  vectors.
*/
fn inverse_iteration(a: &DMatrix<f64>, lambda: f64, found: &[(f64, DVector<f64>)]) -> DVector<f64> {
  let n = a.nrows();
  let degenerate: Vec<&DVector<f64>> = found
    .iter()
    .filter(|(value, _)| (value - lambda).abs() < DEGENERACY_TOLERANCE)
    .map(|(_, v)| v)
    .collect();

  let mut x = DVector::from_fn(n, |i, _| 1.0 + ((i * 7919) % 101) as f64 / 1010.0);
  orthogonalize(&mut x, &degenerate);
  x.normalize_mut();

  let mut offset = 1e-10 * lambda.abs().max(1.0);
  let mut lu = None;
  for _ in 0..6 {
    let shifted = a - DMatrix::<f64>::identity(n, n) * (lambda + offset);
    let decomposition = shifted.lu();
    if decomposition.is_invertible() {
      lu = Some(decomposition);
      break;
    }
    offset *= 100.0;
  }

  if let Some(lu) = lu {
    for _ in 0..INVERSE_ITERATION_STEPS {
      let Some(mut y) = lu.solve(&x) else {
        break;
      };
      orthogonalize(&mut y, &degenerate);
      let norm = y.norm();
      if !norm.is_finite() || norm == 0.0 {
        break;
      }
      x = y / norm;
    }
  }

  fix_sign(&mut x);
  x
}

fn dense_eigenpairs(a: &DMatrix<f64>, n_modes: usize, selection: Selection) -> Eigenpairs {
  let all = a.complex_eigenvalues();
  let mut order: Vec<usize> = (0..all.len()).collect();
  match selection {
    Selection::RealPart => order.sort_by(|&i, &j| all[j].re.total_cmp(&all[i].re)),
    Selection::Magnitude => order.sort_by(|&i, &j| all[j].norm().total_cmp(&all[i].norm())),
  }
  order.truncate(n_modes);

  let values: Vec<Complex<f64>> = order.iter().map(|&i| all[i]).collect();
  let mut found: Vec<(f64, DVector<f64>)> = Vec::with_capacity(values.len());
  let mut vectors = DMatrix::zeros(a.nrows(), values.len());
  for (k, value) in values.iter().enumerate() {
    let v = inverse_iteration(a, value.re, &found);
    vectors.set_column(k, &v);
    found.push((value.re, v));
  }

  Eigenpairs { values, vectors }
}

fn leading_by_magnitude(h: &DMatrix<f64>, n_modes: usize) -> Vec<Complex<f64>> {
  let mut ritz: Vec<Complex<f64>> = h.complex_eigenvalues().iter().copied().collect();
  ritz.sort_by(|a, b| b.norm().total_cmp(&a.norm()));
  ritz.truncate(n_modes);
  ritz
}

/*
  Leading eigenpairs of a sparse matrix by block subspace iteration.

  A random orthonormal block of a few more columns than requested is
  repeatedly multiplied by the matrix and re-orthonormalized. The Ritz
  values of the projected matrix Q^T A Q converge to the eigenvalues of
  largest magnitude; iteration stops once they change by less than
  `tolerance`. Ritz vectors are lifted back with Q.
*/
fn subspace_eigenpairs(m: &StateMatrix, n_modes: usize, config: &SpectralConfig) -> Eigenpairs {
  let n = m.n_states();
  let block = (2 * n_modes).max(n_modes + 8).min(n);
  if block >= n {
    return dense_eigenpairs(&m.to_dmatrix(), n_modes, Selection::Magnitude);
  }

  let mut rng = StdRng::seed_from_u64(SUBSPACE_SEED);
  let start = DMatrix::from_fn(n, block, |_, _| rng.random::<f64>() - 0.5);
  let mut q = start.qr().q();
  let mut previous: Vec<Complex<f64>> = Vec::new();
  let mut converged = false;

  for iteration in 0..config.max_iterations {
    let z = m.mul_block(&q);
    let h = q.transpose() * &z;
    let ritz = leading_by_magnitude(&h, n_modes);
    let change = if previous.len() == ritz.len() {
      ritz
        .iter()
        .zip(previous.iter())
        .map(|(a, b)| (a - b).norm())
        .fold(0.0, f64::max)
    } else {
      f64::INFINITY
    };
    previous = ritz;
    q = z.qr().q();
    if change < config.tolerance {
      debug!(iteration, n_modes, "subspace iteration converged");
      converged = true;
      break;
    }
  }
  if !converged {
    warn!(
      max_iterations = config.max_iterations,
      n_modes, "subspace iteration did not converge; using last Ritz pairs"
    );
  }

  let h = q.transpose() * m.mul_block(&q);
  let projected = dense_eigenpairs(&h, n_modes, Selection::Magnitude);
  let mut vectors = &q * &projected.vectors;
  for mut column in vectors.column_iter_mut() {
    let norm = column.norm();
    if norm > 0.0 {
      column /= norm;
    }
    let pivot = column.iamax();
    if column[pivot] < 0.0 {
      column.neg_mut();
    }
  }

  Eigenpairs {
    values: projected.values,
    vectors,
  }
}

/// Leading eigenpairs of a transition matrix.
///
/// Dense matrices get a full eigendecomposition truncated to
/// `config.n_modes`; sparse matrices are solved iteratively for the
/// `n_modes` eigenvalues of largest magnitude. Either way the result is
/// sorted by descending real part.
///
/// # Errors
///
/// Fails if the matrix is not square, has no states, or `n_modes` is 0.
/// `n_modes` above the number of states is capped.
pub fn eigen_decompose(matrix: &StateMatrix, config: &SpectralConfig) -> Result<Eigensystem> {
  let (rows, cols) = matrix.shape();
  if rows != cols {
    return Err(MsmError::NotSquare { rows, cols });
  }
  if rows == 0 || config.n_modes == 0 {
    return Err(MsmError::InvalidModeCount {
      n_modes: config.n_modes,
      n_states: rows,
    });
  }
  let n_modes = config.n_modes.min(rows);

  let started = Instant::now();
  let pairs = match matrix {
    StateMatrix::Dense(_) => dense_eigenpairs(&matrix.to_dmatrix(), n_modes, Selection::RealPart),
    StateMatrix::Sparse(_) => subspace_eigenpairs(matrix, n_modes, config),
  };

  let mut order: Vec<usize> = (0..pairs.values.len()).collect();
  order.sort_by(|&i, &j| pairs.values[j].re.total_cmp(&pairs.values[i].re));

  let n_complex = pairs
    .values
    .iter()
    .filter(|v| v.im.abs() > config.imaginary_tolerance)
    .count();
  if n_complex > 0 {
    warn!(
      n_complex,
      tolerance = config.imaginary_tolerance,
      "discarding imaginary eigenvalue components above tolerance"
    );
  }

  let eigenvalues: Array1<f64> = order.iter().map(|&i| pairs.values[i].re).collect();
  let eigenvectors = Array2::from_shape_fn((rows, order.len()), |(r, k)| {
    pairs.vectors[(r, order[k])]
  });
  debug!(
    duration_ms = started.elapsed().as_millis(),
    n_modes,
    sparse = matrix.is_sparse(),
    "eigendecomposition complete"
  );

  Ok(Eigensystem {
    eigenvalues,
    eigenvectors,
    n_complex,
  })
}
