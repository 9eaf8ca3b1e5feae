//! Plain-text persistence for labels, indices, matrices and timescale tables.
//!
//! Files are whitespace separated with one record per line. Blank lines and
//! lines starting with `#` are ignored when reading.

use crate::cluster::k_centers::Clustering;
use crate::error::MsmError;
use crate::error::Result;
use crate::msm::implied_timescales::LagTimescales;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use std::fmt::Display;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

fn records<R: BufRead>(reader: R) -> impl Iterator<Item = (usize, std::io::Result<String>)> {
  reader
    .lines()
    .enumerate()
    .map(|(i, line)| (i + 1, line))
    .filter(|(_, line)| match line {
      Ok(l) => {
        let t = l.trim();
        !t.is_empty() && !t.starts_with('#')
      }
      Err(_) => true,
    })
}

fn parse_token<T: FromStr>(token: &str, line: usize) -> Result<T>
where
  T::Err: Display,
{
  token.parse().map_err(|e: T::Err| MsmError::Parse {
    line,
    reason: format!("{token:?}: {e}"),
  })
}

/// Parse every whitespace-separated token into one flat column.
pub fn parse_column<T: FromStr, R: BufRead>(reader: R) -> Result<Vec<T>>
where
  T::Err: Display,
{
  let mut values = Vec::new();
  for (line_no, line) in records(reader) {
    for token in line?.split_whitespace() {
      values.push(parse_token(token, line_no)?);
    }
  }
  Ok(values)
}

/// Parse a rectangular matrix, one row per line.
pub fn parse_matrix<R: BufRead>(reader: R) -> Result<Array2<f64>> {
  let mut values = Vec::new();
  let mut width = None;
  let mut n_rows = 0;
  for (line_no, line) in records(reader) {
    let line = line?;
    let row: Vec<f64> = line
      .split_whitespace()
      .map(|t| parse_token(t, line_no))
      .collect::<Result<_>>()?;
    match width {
      None => width = Some(row.len()),
      Some(w) if w != row.len() => {
        return Err(MsmError::Parse {
          line: line_no,
          reason: format!("expected {w} columns, got {}", row.len()),
        });
      }
      Some(_) => {}
    }
    values.extend(row);
    n_rows += 1;
  }
  let width = width.unwrap_or(0);
  Array2::from_shape_vec((n_rows, width), values).map_err(|e| MsmError::Parse {
    line: 0,
    reason: e.to_string(),
  })
}

/// Write one value per line.
pub fn write_column<T: Display, W: Write>(mut writer: W, values: impl IntoIterator<Item = T>) -> Result<()> {
  for v in values {
    writeln!(writer, "{v}")?;
  }
  writer.flush()?;
  Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>> {
  Ok(BufReader::new(File::open(path)?))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
  Ok(BufWriter::new(File::create(path)?))
}

pub fn read_labels(path: impl AsRef<Path>) -> Result<Array1<i32>> {
  Ok(Array1::from(parse_column(open(path.as_ref())?)?))
}

pub fn write_labels(path: impl AsRef<Path>, labels: ArrayView1<i32>) -> Result<()> {
  write_column(create(path.as_ref())?, labels.iter())
}

/// Read non-negative integers: center indices or segment lengths.
pub fn read_indices(path: impl AsRef<Path>) -> Result<Vec<usize>> {
  parse_column(open(path.as_ref())?)
}

pub fn write_indices(path: impl AsRef<Path>, indices: &[usize]) -> Result<()> {
  write_column(create(path.as_ref())?, indices.iter())
}

/// Read a float matrix such as feature vectors or flattened coordinates.
pub fn read_matrix(path: impl AsRef<Path>) -> Result<Array2<f64>> {
  parse_matrix(open(path.as_ref())?)
}

/// Read a flat column of floats such as a per-sample coordinate.
pub fn read_values(path: impl AsRef<Path>) -> Result<Vec<f64>> {
  parse_column(open(path.as_ref())?)
}

/// Write `assignments_kcenters_n_<k>.txt` and `cluster_centers_kcenters_n_<k>.txt`
/// into `dir`, where `k` is the number of centers actually selected.
///
/// Returns the assignment and center paths.
pub fn write_clustering(dir: impl AsRef<Path>, clustering: &Clustering) -> Result<(PathBuf, PathBuf)> {
  let k = clustering.n_clusters();
  let assignments = dir.as_ref().join(format!("assignments_kcenters_n_{k}.txt"));
  let centers = dir.as_ref().join(format!("cluster_centers_kcenters_n_{k}.txt"));
  write_labels(&assignments, clustering.labels.view())?;
  write_indices(&centers, &clustering.centers)?;
  Ok((assignments, centers))
}

/// Format a timescale table: one `"<lag> <timescale>"` row per mode.
pub fn write_timescale_rows<W: Write>(mut writer: W, lag: &LagTimescales) -> Result<()> {
  for (lag_time, timescale) in lag.rows() {
    writeln!(writer, "{lag_time} {timescale:.6}")?;
  }
  writer.flush()?;
  Ok(())
}

/// Write `lag.<tau>.tau.dat` into `dir` and return its path.
pub fn write_timescales(dir: impl AsRef<Path>, lag: &LagTimescales) -> Result<PathBuf> {
  let path = dir.as_ref().join(format!("lag.{}.tau.dat", lag.lag_time));
  write_timescale_rows(create(&path)?, lag)?;
  Ok(path)
}
