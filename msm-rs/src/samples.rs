use crate::error::MsmError;
use crate::error::Result;
use ndarray::Array2;
use ndarray::Array3;

/// An ordered set of samples. Order encodes time and is preserved end to end.
#[derive(Debug, Clone)]
pub enum SampleSet {
  /// Fixed-length feature vectors, shape (n_samples, n_features).
  Vectors(Array2<f64>),
  /// Structural frames, shape (n_frames, n_atoms, 3).
  Frames(Array3<f64>),
}

impl SampleSet {
  pub fn len(&self) -> usize {
    match self {
      SampleSet::Vectors(x) => x.shape()[0],
      SampleSet::Frames(x) => x.shape()[0],
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Reshape flat rows of `3 * n_atoms` coordinates into frames.
  pub fn frames_from_rows(rows: Array2<f64>, n_atoms: usize) -> Result<Self> {
    let (n_frames, width) = rows.dim();
    if n_atoms == 0 || width != n_atoms * 3 {
      return Err(MsmError::MalformedSample {
        index: 0,
        reason: format!("expected {} coordinates per row, got {width}", n_atoms * 3),
      });
    }
    let flat: Vec<f64> = rows.into_iter().collect();
    let frames = Array3::from_shape_vec((n_frames, n_atoms, 3), flat).map_err(|e| {
      MsmError::MalformedSample {
        index: 0,
        reason: e.to_string(),
      }
    })?;
    Ok(SampleSet::Frames(frames))
  }

  /// Reject sets the distance oracle cannot work with: no samples, zero-width
  /// samples, frames without xyz coordinates, or non-finite values.
  pub fn validate(&self) -> Result<()> {
    if self.is_empty() {
      return Err(MsmError::EmptySampleSet);
    }
    match self {
      SampleSet::Vectors(x) => {
        if x.shape()[1] == 0 {
          return Err(MsmError::MalformedSample {
            index: 0,
            reason: "samples have no features".into(),
          });
        }
        for (index, row) in x.outer_iter().enumerate() {
          if row.iter().any(|v| !v.is_finite()) {
            return Err(MsmError::MalformedSample {
              index,
              reason: "non-finite feature".into(),
            });
          }
        }
      }
      SampleSet::Frames(x) => {
        if x.shape()[1] == 0 || x.shape()[2] != 3 {
          return Err(MsmError::MalformedSample {
            index: 0,
            reason: format!("frames must be n_atoms x 3, got {:?}", &x.shape()[1..]),
          });
        }
        for (index, frame) in x.outer_iter().enumerate() {
          if frame.iter().any(|v| !v.is_finite()) {
            return Err(MsmError::MalformedSample {
              index,
              reason: "non-finite coordinate".into(),
            });
          }
        }
      }
    }
    Ok(())
  }
}
