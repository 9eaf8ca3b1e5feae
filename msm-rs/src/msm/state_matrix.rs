use nalgebra::DMatrix;
use ndarray::Array1;
use ndarray::Array2;
use serde::Deserialize;
use serde::Serialize;
use sprs::CsMat;

/// A square state-by-state matrix in the backing store chosen by the caller.
///
/// Count, symmetrized count and transition probability matrices all use
/// this type. Sparse matrices are kept in CSR layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StateMatrix {
  Dense(Array2<f64>),
  Sparse(CsMat<f64>),
}

impl StateMatrix {
  pub fn shape(&self) -> (usize, usize) {
    match self {
      StateMatrix::Dense(m) => m.dim(),
      StateMatrix::Sparse(m) => m.shape(),
    }
  }

  pub fn n_states(&self) -> usize {
    self.shape().0
  }

  pub fn is_sparse(&self) -> bool {
    matches!(self, StateMatrix::Sparse(_))
  }

  /// Entry `(i, j)`; structural zeros of a sparse matrix read as 0.
  pub fn get(&self, i: usize, j: usize) -> f64 {
    match self {
      StateMatrix::Dense(m) => m[(i, j)],
      StateMatrix::Sparse(m) => m.get(i, j).copied().unwrap_or(0.0),
    }
  }

  /// Number of stored entries (all entries for a dense matrix).
  pub fn nnz(&self) -> usize {
    match self {
      StateMatrix::Dense(m) => m.len(),
      StateMatrix::Sparse(m) => m.nnz(),
    }
  }

  pub fn to_dense(&self) -> Array2<f64> {
    match self {
      StateMatrix::Dense(m) => m.clone(),
      StateMatrix::Sparse(m) => {
        let mut dense = Array2::zeros(m.shape());
        for (&val, (row, col)) in m.iter() {
          dense[(row, col)] += val;
        }
        dense
      }
    }
  }

  pub fn row_sums(&self) -> Array1<f64> {
    match self {
      StateMatrix::Dense(m) => m.rows().into_iter().map(|r| r.sum()).collect(),
      StateMatrix::Sparse(m) => {
        let mut sums = Array1::zeros(m.rows());
        for (&val, (row, _)) in m.iter() {
          sums[row] += val;
        }
        sums
      }
    }
  }

  pub fn column_sums(&self) -> Array1<f64> {
    match self {
      StateMatrix::Dense(m) => m.columns().into_iter().map(|c| c.sum()).collect(),
      StateMatrix::Sparse(m) => {
        let mut sums = Array1::zeros(m.cols());
        for (&val, (_, col)) in m.iter() {
          sums[col] += val;
        }
        sums
      }
    }
  }

  pub fn sum(&self) -> f64 {
    match self {
      StateMatrix::Dense(m) => m.sum(),
      StateMatrix::Sparse(m) => m.data().iter().sum(),
    }
  }

  /// Whether the matrix equals its transpose within `tol`.
  pub fn is_symmetric(&self, tol: f64) -> bool {
    let (rows, cols) = self.shape();
    if rows != cols {
      return false;
    }
    match self {
      StateMatrix::Dense(m) => {
        (0..rows).all(|i| (0..i).all(|j| (m[(i, j)] - m[(j, i)]).abs() <= tol))
      }
      StateMatrix::Sparse(m) => m
        .iter()
        .all(|(&val, (row, col))| (val - self.get(col, row)).abs() <= tol),
    }
  }

  pub(crate) fn to_dmatrix(&self) -> DMatrix<f64> {
    let (rows, cols) = self.shape();
    match self {
      StateMatrix::Dense(m) => DMatrix::from_fn(rows, cols, |i, j| m[(i, j)]),
      StateMatrix::Sparse(m) => {
        let mut out = DMatrix::zeros(rows, cols);
        for (&val, (row, col)) in m.iter() {
          out[(row, col)] += val;
        }
        out
      }
    }
  }

  /// Product with a dense block of column vectors.
  pub(crate) fn mul_block(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
    match self {
      StateMatrix::Dense(_) => self.to_dmatrix() * x,
      StateMatrix::Sparse(m) => {
        let mut out = DMatrix::zeros(m.rows(), x.ncols());
        for (&val, (row, col)) in m.iter() {
          for k in 0..x.ncols() {
            out[(row, k)] += val * x[(col, k)];
          }
        }
        out
      }
    }
  }
}
