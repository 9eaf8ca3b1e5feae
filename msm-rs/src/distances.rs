use nalgebra::Matrix3;
use nalgebra::Vector3;
use ndarray::ArrayView1;
use ndarray::ArrayView2;

/// Euclidean (L2) distance: sqrt(sum((x_i - y_i)^2))
#[inline]
pub fn euclidean(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
  sqeuclidean(x, y).sqrt()
}

/// Squared Euclidean distance - avoids the sqrt
#[inline(always)]
pub fn sqeuclidean(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
  // Iterator form lets the compiler vectorize the loop
  x.iter()
    .zip(y.iter())
    .map(|(a, b)| {
      let diff = a - b;
      diff * diff
    })
    .sum()
}

/// Manhattan (L1) distance.
#[inline]
pub fn cityblock(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
  x.iter().zip(y.iter()).map(|(a, b)| (a - b).abs()).sum()
}

/// Chebyshev (L-infinity) distance.
#[inline]
pub fn chebyshev(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
  x.iter()
    .zip(y.iter())
    .map(|(a, b)| (a - b).abs())
    .fold(0.0, f64::max)
}

/// Canberra distance. Coordinates where both values are zero contribute 0.
#[inline]
pub fn canberra(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
  x.iter()
    .zip(y.iter())
    .map(|(a, b)| {
      let denom = a.abs() + b.abs();
      if denom > 0.0 { (a - b).abs() / denom } else { 0.0 }
    })
    .sum()
}

/// Bray-Curtis dissimilarity. Two all-zero vectors are at distance 0.
#[inline]
pub fn braycurtis(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
  let (num, denom) = x
    .iter()
    .zip(y.iter())
    .fold((0.0, 0.0), |(num, denom), (a, b)| {
      (num + (a - b).abs(), denom + (a + b).abs())
    });
  if denom > 0.0 { num / denom } else { 0.0 }
}

/// Fraction of coordinates that differ.
#[inline]
pub fn hamming(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
  if x.is_empty() {
    return 0.0;
  }
  let differing = x.iter().zip(y.iter()).filter(|(a, b)| a != b).count();
  differing as f64 / x.len() as f64
}

/// Jaccard distance on the boolean (non-zero) pattern of both vectors.
#[inline]
pub fn jaccard(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
  let (differing, nonzero) = x
    .iter()
    .zip(y.iter())
    .fold((0usize, 0usize), |(differing, nonzero), (a, b)| {
      let (a, b) = (*a != 0.0, *b != 0.0);
      (differing + (a != b) as usize, nonzero + (a || b) as usize)
    });
  if nonzero > 0 {
    differing as f64 / nonzero as f64
  } else {
    0.0
  }
}

fn centroid(frame: &ArrayView2<f64>) -> Vector3<f64> {
  let n = frame.shape()[0] as f64;
  let mut c = Vector3::zeros();
  for atom in frame.outer_iter() {
    c += Vector3::new(atom[0], atom[1], atom[2]);
  }
  c / n
}

/*
  Minimal root-mean-square deviation between two frames of the same atoms.

  Both frames are translated to their centroids and the optimal rotation is
  found with the Kabsch method. Only the singular values of the 3x3
  correlation matrix are needed: the optimal overlap is the sum of the
  singular values, with the smallest one negated when the best orthogonal
  transform would be a reflection.

  Parameters
  ----------
  a, b: arrays of shape (n_atoms, 3)

  Returns
  -------
  The RMSD after superposition, in the units of the coordinates.
*/
pub fn rmsd(a: ArrayView2<f64>, b: ArrayView2<f64>) -> f64 {
  let n_atoms = a.shape()[0] as f64;
  let ca = centroid(&a);
  let cb = centroid(&b);

  let mut correlation = Matrix3::<f64>::zeros();
  let mut g_a = 0.0;
  let mut g_b = 0.0;
  for (ra, rb) in a.outer_iter().zip(b.outer_iter()) {
    let pa = Vector3::new(ra[0], ra[1], ra[2]) - ca;
    let pb = Vector3::new(rb[0], rb[1], rb[2]) - cb;
    g_a += pa.norm_squared();
    g_b += pb.norm_squared();
    correlation += pa * pb.transpose();
  }

  let singular = correlation.singular_values();
  let smallest = singular.iter().copied().fold(f64::INFINITY, f64::min);
  let mut overlap: f64 = singular.iter().sum();
  if correlation.determinant() < 0.0 {
    overlap -= 2.0 * smallest;
  }

  let msd = (g_a + g_b - 2.0 * overlap) / n_atoms;
  msd.max(0.0).sqrt()
}
