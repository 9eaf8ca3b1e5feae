use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use msm_rs::ImpliedTimescales;
use msm_rs::KCenters;
use msm_rs::LagTimescales;
use msm_rs::MarkovStateModel;
use msm_rs::MatrixStorage;
use msm_rs::MetricKind;
use msm_rs::MsmConfig;
use msm_rs::OutlierPolicy;
use msm_rs::SampleSet;
use msm_rs::SeedPolicy;
use msm_rs::SpectralConfig;
use msm_rs::cluster::labels::count_states;
use msm_rs::cluster::labels::state_populations;
use msm_rs::io;
use msm_rs::merge_assignments;
use ndarray::Array1;
use ndarray::Array2;
use plotters::prelude::*;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "msm", about = "Markov state models from trajectory data")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Cluster samples with k-centers and write assignments and centers
  Cluster(ClusterArgs),
  /// Merge a refinement pass into prior assignments
  Merge(MergeArgs),
  /// Fit a Markov state model at one lag time
  Msm(MsmArgs),
  /// Sweep lag times and write implied timescales
  Timescales(TimescaleArgs),
  /// Scatter plot of assignments over two coordinates
  Plot(PlotArgs),
  /// Run the whole pipeline on synthetic multi-well trajectories
  Tutorial(TutorialArgs),
}

#[derive(Args)]
struct ClusterArgs {
  /// Whitespace-separated samples, one per line
  #[arg(short, long)]
  input: PathBuf,

  /// Distance metric
  #[arg(short, long, default_value = "euclidean")]
  metric: MetricKind,

  /// Number of clusters
  #[arg(short = 'k', long, default_value = "8")]
  n_clusters: usize,

  /// Index of the first center (default: drawn at random)
  #[arg(short, long)]
  seed: Option<usize>,

  /// RNG seed used when the first center is drawn at random
  #[arg(long, default_value = "0")]
  rng_seed: u64,

  /// Reshape each row into a frame of this many atoms (for rmsd)
  #[arg(long)]
  atoms: Option<usize>,

  /// Directory for the assignment and center files
  #[arg(short, long, default_value = ".")]
  output_dir: PathBuf,

  /// Optional scatter plot: x coordinate file
  #[arg(long, requires = "plot_y")]
  plot_x: Option<PathBuf>,

  /// Optional scatter plot: y coordinate file
  #[arg(long, requires = "plot_x")]
  plot_y: Option<PathBuf>,
}

#[derive(Args)]
struct MergeArgs {
  /// Assignments from the refinement pass
  #[arg(long)]
  new: PathBuf,

  /// Assignments from the previous pass
  #[arg(long)]
  old: PathBuf,

  /// Output assignment file
  #[arg(short, long, default_value = "assignments_merged.txt")]
  output: PathBuf,

  /// Mark samples of replaced clusters that became outliers as outliers
  /// instead of keeping their previous label
  #[arg(long)]
  drop_outliers: bool,
}

#[derive(Args)]
struct KineticArgs {
  /// Assignment file, one label per line (-1 for outliers)
  #[arg(short, long)]
  assignments: PathBuf,

  /// Trajectory lengths, one per line (default: one trajectory)
  #[arg(short, long)]
  lengths: Option<PathBuf>,

  /// Use sparse matrices and the iterative eigensolver
  #[arg(long)]
  sparse: bool,
}

#[derive(Args)]
struct MsmArgs {
  #[command(flatten)]
  data: KineticArgs,

  /// Lag time in steps
  #[arg(short = 't', long, default_value = "1")]
  lag: usize,

  /// Number of eigenvalues to report
  #[arg(short, long, default_value = "5")]
  n_modes: usize,
}

#[derive(Args)]
struct TimescaleArgs {
  #[command(flatten)]
  data: KineticArgs,

  /// Lag times 1..max_lag are evaluated
  #[arg(short, long, default_value = "50")]
  max_lag: usize,

  /// Timescales per lag (default: all)
  #[arg(short, long)]
  n_timescales: Option<usize>,

  /// Directory for the lag.<tau>.tau.dat files
  #[arg(short, long, default_value = ".")]
  output_dir: PathBuf,

  /// Optional SVG plot of the timescales against lag time
  #[arg(long)]
  plot: Option<PathBuf>,
}

#[derive(Args)]
struct PlotArgs {
  #[arg(short, long)]
  assignments: PathBuf,

  /// x coordinate per sample
  #[arg(short)]
  x: PathBuf,

  /// y coordinate per sample
  #[arg(short)]
  y: PathBuf,

  /// Output SVG path
  #[arg(short, long, default_value = "clusters.svg")]
  output: PathBuf,
}

#[derive(Args)]
struct TutorialArgs {
  /// Number of independent trajectories
  #[arg(long, default_value = "10")]
  n_trajectories: usize,

  /// Steps per trajectory
  #[arg(long, default_value = "1000")]
  length: usize,

  /// Number of k-centers states
  #[arg(short = 'k', long, default_value = "30")]
  n_clusters: usize,

  /// Model lag time
  #[arg(short = 't', long, default_value = "5")]
  lag: usize,

  /// Upper bound of the lag sweep
  #[arg(short, long, default_value = "20")]
  max_lag: usize,

  #[arg(long, default_value = "42")]
  seed: u64,

  #[arg(short, long, default_value = "tutorial")]
  output_dir: PathBuf,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  match Cli::parse().command {
    Command::Cluster(args) => cluster(args),
    Command::Merge(args) => merge(args),
    Command::Msm(args) => msm(args),
    Command::Timescales(args) => timescales(args),
    Command::Plot(args) => plot(args),
    Command::Tutorial(args) => tutorial(args),
  }
}

fn storage(sparse: bool) -> MatrixStorage {
  if sparse {
    MatrixStorage::Sparse
  } else {
    MatrixStorage::Dense
  }
}

fn load_kinetic(args: &KineticArgs) -> Result<(Array1<i32>, Option<Vec<usize>>)> {
  let labels = io::read_labels(&args.assignments)
    .with_context(|| format!("reading {}", args.assignments.display()))?;
  let lengths = args
    .lengths
    .as_ref()
    .map(|path| io::read_indices(path).with_context(|| format!("reading {}", path.display())))
    .transpose()?;
  Ok((labels, lengths))
}

fn load_coordinates(x: &Path, y: &Path) -> Result<Array2<f64>> {
  let x = io::read_values(x).with_context(|| format!("reading {}", x.display()))?;
  let y = io::read_values(y).with_context(|| format!("reading {}", y.display()))?;
  if x.len() != y.len() {
    bail!("coordinate files differ in length: {} vs {}", x.len(), y.len());
  }
  Ok(Array2::from_shape_fn((x.len(), 2), |(i, c)| if c == 0 { x[i] } else { y[i] }))
}

fn cluster(args: ClusterArgs) -> Result<()> {
  let start = Instant::now();
  let rows = io::read_matrix(&args.input)
    .with_context(|| format!("reading {}", args.input.display()))?;
  let samples = match args.atoms {
    Some(n_atoms) => SampleSet::frames_from_rows(rows, n_atoms)?,
    None => SampleSet::Vectors(rows),
  };
  println!(
    "Loaded {} samples in {:.2}s",
    samples.len(),
    start.elapsed().as_secs_f32()
  );

  let seed = args.seed.map_or(SeedPolicy::Random, SeedPolicy::Fixed);
  let clustering = KCenters::builder()
    .samples(&samples)
    .n_clusters(args.n_clusters)
    .metric(&args.metric)
    .seed(seed)
    .build()
    .exec(&mut StdRng::seed_from_u64(args.rng_seed))?;

  fs::create_dir_all(&args.output_dir)?;
  let k = clustering.n_clusters();
  let (assignments, centers) = io::write_clustering(&args.output_dir, &clustering)?;

  println!(
    "{} clusters, radius {:.4} ({})",
    clustering.n_clusters(),
    clustering.radius(),
    args.metric
  );
  println!("  Assignments: {}", assignments.display());
  println!("  Centers: {}", centers.display());

  if let (Some(x), Some(y)) = (&args.plot_x, &args.plot_y) {
    let coords = load_coordinates(x, y)?;
    let output = args.output_dir.join(format!("kcenters_n_{k}.svg"));
    plot_clusters(&coords, &clustering.labels.to_vec(), &output)?;
    println!("  Plot: {}", output.display());
  }
  Ok(())
}

fn merge(args: MergeArgs) -> Result<()> {
  let new = io::read_labels(&args.new)?;
  let old = io::read_labels(&args.old)?;
  let policy = if args.drop_outliers {
    OutlierPolicy::Drop
  } else {
    OutlierPolicy::Keep
  };
  let merged = merge_assignments(new.view(), old.view(), policy)?;
  io::write_labels(&args.output, merged.view())?;
  println!(
    "Merged {} samples: {} -> {} states",
    merged.len(),
    count_states(old.view()),
    count_states(merged.view())
  );
  println!("  Output: {}", args.output.display());
  Ok(())
}

fn msm(args: MsmArgs) -> Result<()> {
  let (labels, lengths) = load_kinetic(&args.data)?;
  let fitted = MarkovStateModel::new(MsmConfig {
    lag_time: args.lag,
    storage: storage(args.data.sparse),
  })
  .fit(labels.view(), lengths.as_deref())?;

  let estimate = fitted.estimate();
  println!(
    "{} states ({} occupied), {} transitions at lag {}",
    fitted.n_states(),
    fitted.n_microstates(),
    estimate.n_transitions,
    fitted.lag_time()
  );
  println!(
    "  Deviation from detailed balance: {:.4}",
    estimate.reversibility_deviation
  );

  println!();
  println!("Populations:");
  for (state, p) in fitted.populations().iter().enumerate() {
    println!("  {state:>4} {p:.6}");
  }

  let spectral = SpectralConfig {
    n_modes: args.n_modes,
    ..Default::default()
  };
  let eigen = fitted.eigensystem(&spectral)?;
  let ts = fitted.implied_timescales(&spectral)?;
  println!();
  println!("Eigenvalues:");
  for (k, lambda) in eigen.eigenvalues.iter().enumerate() {
    println!("  {k:>4} {lambda:.6}");
  }
  println!("Implied timescales:");
  for (_, t) in ts.rows() {
    println!("  {t:.6}");
  }
  if ts.n_invalid > 0 {
    println!("  ({} modes without a timescale)", ts.n_invalid);
  }
  Ok(())
}

fn timescales(args: TimescaleArgs) -> Result<()> {
  let (labels, lengths) = load_kinetic(&args.data)?;
  let start = Instant::now();
  let sweep = ImpliedTimescales::builder()
    .labels(labels.view())
    .segment_lengths(lengths.as_deref())
    .max_lag(args.max_lag)
    .n_timescales(args.n_timescales)
    .storage(storage(args.data.sparse))
    .build()
    .exec()?;
  println!(
    "Swept {} lag times in {:.2}s",
    sweep.len(),
    start.elapsed().as_secs_f32()
  );

  write_sweep(&args.output_dir, &sweep)?;
  if let Some(output) = &args.plot {
    plot_timescales(&sweep, output)?;
    println!("  Plot: {}", output.display());
  }
  Ok(())
}

fn write_sweep(dir: &Path, sweep: &[LagTimescales]) -> Result<()> {
  fs::create_dir_all(dir)?;
  for lag in sweep {
    io::write_timescales(dir, lag)?;
  }
  println!("  Timescale files: {}/lag.<tau>.tau.dat", dir.display());
  Ok(())
}

fn plot(args: PlotArgs) -> Result<()> {
  let labels = io::read_labels(&args.assignments)?;
  let coords = load_coordinates(&args.x, &args.y)?;
  if coords.nrows() != labels.len() {
    bail!(
      "{} coordinates for {} assignments",
      coords.nrows(),
      labels.len()
    );
  }
  plot_clusters(&coords, &labels.to_vec(), &args.output)?;
  println!("Plot saved to {}", args.output.display());
  Ok(())
}

/// Overdamped hops between three wells in the plane, with the well centers
/// as metastable states. Returns positions and trajectory lengths.
fn generate_wells(args: &TutorialArgs) -> (Array2<f64>, Vec<usize>) {
  let wells = [(-3.0, 0.0), (3.0, 0.0), (0.0, 4.0)];
  let hop_probability = [0.01, 0.02, 0.05];
  let mut rng = StdRng::seed_from_u64(args.seed);

  let n = args.n_trajectories * args.length;
  let mut positions = Array2::zeros((n, 2));
  let mut row = 0;
  for _ in 0..args.n_trajectories {
    let mut well = rng.random_range(0..wells.len());
    for _ in 0..args.length {
      if rng.random::<f64>() < hop_probability[well] {
        well = (well + rng.random_range(1..wells.len())) % wells.len();
      }
      // Sum of uniforms as cheap bell-shaped noise
      let mut noise = || (0..3).map(|_| rng.random::<f64>()).sum::<f64>() - 1.5;
      positions[(row, 0)] = wells[well].0 + noise();
      positions[(row, 1)] = wells[well].1 + noise();
      row += 1;
    }
  }
  (positions, vec![args.length; args.n_trajectories])
}

fn tutorial(args: TutorialArgs) -> Result<()> {
  if args.n_trajectories == 0 || args.length == 0 {
    bail!("need at least one non-empty trajectory");
  }
  println!("Markov state model tutorial");
  println!("===========================");
  println!(
    "{} trajectories of {} steps over three wells",
    args.n_trajectories, args.length
  );
  println!();
  fs::create_dir_all(&args.output_dir)?;

  let (positions, lengths) = generate_wells(&args);
  let samples = SampleSet::Vectors(positions.clone());

  println!("Clustering (k-centers, k={})...", args.n_clusters);
  let start = Instant::now();
  let clustering = KCenters::builder()
    .samples(&samples)
    .n_clusters(args.n_clusters)
    .metric(&MetricKind::Euclidean)
    .build()
    .exec(&mut StdRng::seed_from_u64(args.seed))?;
  println!(
    "  {} clusters, radius {:.3}, in {:.2}s",
    clustering.n_clusters(),
    clustering.radius(),
    start.elapsed().as_secs_f32()
  );
  io::write_clustering(&args.output_dir, &clustering)?;
  let plot_path = args.output_dir.join("clusters.svg");
  plot_clusters(&positions, &clustering.labels.to_vec(), &plot_path)?;
  println!("  Plot: {}", plot_path.display());
  println!();

  println!("Fitting Markov state model at lag {}...", args.lag);
  let fitted = MarkovStateModel::new(MsmConfig {
    lag_time: args.lag,
    ..Default::default()
  })
  .fit(clustering.labels.view(), Some(lengths.as_slice()))?;
  let sizes = state_populations(clustering.labels.view(), fitted.n_states());
  let largest = sizes.iter().copied().max().unwrap_or(0);
  println!(
    "  {} states, largest holds {} samples",
    fitted.n_states(),
    largest
  );
  let ts = fitted.implied_timescales(&SpectralConfig {
    n_modes: 4,
    ..Default::default()
  })?;
  for (i, t) in ts.timescales.iter().enumerate() {
    println!("  Mode {}: {:.2} steps", i + 1, t);
  }
  println!();

  println!("Sweeping lag times 1..{}...", args.max_lag);
  let sweep = ImpliedTimescales::builder()
    .labels(clustering.labels.view())
    .segment_lengths(Some(lengths.as_slice()))
    .max_lag(args.max_lag)
    .n_timescales(Some(3))
    .build()
    .exec()?;
  write_sweep(&args.output_dir, &sweep)?;
  let plot_path = args.output_dir.join("timescales.svg");
  plot_timescales(&sweep, &plot_path)?;
  println!("  Plot: {}", plot_path.display());
  println!();
  info!(output_dir = %args.output_dir.display(), "tutorial complete");
  println!("Done!");
  Ok(())
}

const COLORS: [RGBColor; 10] = [
  RGBColor(228, 26, 28),   // Red
  RGBColor(55, 126, 184),  // Blue
  RGBColor(77, 175, 74),   // Green
  RGBColor(152, 78, 163),  // Purple
  RGBColor(255, 127, 0),   // Orange
  RGBColor(255, 255, 51),  // Yellow
  RGBColor(166, 86, 40),   // Brown
  RGBColor(247, 129, 191), // Pink
  RGBColor(0, 0, 0),       // Black
  RGBColor(0, 139, 139),   // Teal
];

const OUTLIER_COLOR: RGBColor = RGBColor(190, 190, 190);

fn padded_range(values: impl Iterator<Item = f64> + Clone) -> std::ops::Range<f64> {
  let min = values.clone().fold(f64::INFINITY, f64::min);
  let max = values.fold(f64::NEG_INFINITY, f64::max);
  if !min.is_finite() || !max.is_finite() {
    return 0.0..1.0;
  }
  let padding = ((max - min) * 0.05).max(1e-6);
  min - padding..max + padding
}

/// Scatter plot of 2D coordinates colored by state label
fn plot_clusters(coords: &Array2<f64>, labels: &[i32], output_path: &Path) -> Result<()> {
  let root = SVGBackend::new(output_path, (1024, 1024)).into_drawing_area();
  root.fill(&WHITE)?;

  let x_range = padded_range(coords.column(0).iter().copied());
  let y_range = padded_range(coords.column(1).iter().copied());

  let mut chart = ChartBuilder::on(&root)
    .caption(
      format!("{} states", count_states(ndarray::ArrayView1::from(labels))),
      ("sans-serif", 40).into_font(),
    )
    .margin(10)
    .x_label_area_size(40)
    .y_label_area_size(50)
    .build_cartesian_2d(x_range, y_range)?;

  chart.configure_mesh().x_desc("x").y_desc("y").draw()?;

  chart.draw_series(coords.outer_iter().zip(labels.iter()).map(|(p, &label)| {
    let color = if label < 0 {
      OUTLIER_COLOR
    } else {
      COLORS[label as usize % COLORS.len()]
    };
    Circle::new((p[0], p[1]), 2, color.filled())
  }))?;

  root.present()?;
  Ok(())
}

/// Implied timescales against lag time, one line per mode
fn plot_timescales(sweep: &[LagTimescales], output_path: &Path) -> Result<()> {
  let root = SVGBackend::new(output_path, (1024, 768)).into_drawing_area();
  root.fill(&WHITE)?;

  let max_lag = sweep.iter().map(|l| l.lag_time).max().unwrap_or(1) as f64;
  let max_t = sweep
    .iter()
    .flat_map(|l| l.timescales.iter().copied())
    .fold(0.0, f64::max)
    .max(1.0);
  let n_modes = sweep.iter().map(|l| l.timescales.len()).max().unwrap_or(0);

  let mut chart = ChartBuilder::on(&root)
    .caption("Implied timescales", ("sans-serif", 40).into_font())
    .margin(10)
    .x_label_area_size(40)
    .y_label_area_size(60)
    .build_cartesian_2d(0.0..max_lag + 1.0, 0.0..max_t * 1.05)?;

  chart
    .configure_mesh()
    .x_desc("Lag time")
    .y_desc("Timescale")
    .draw()?;

  for mode in 0..n_modes {
    let color = COLORS[mode % COLORS.len()];
    let points: Vec<(f64, f64)> = sweep
      .iter()
      .filter_map(|l| l.timescales.get(mode).map(|&t| (l.lag_time as f64, t)))
      .collect();
    chart
      .draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))?
      .label(format!("Mode {}", mode + 1))
      .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
    chart.draw_series(
      points
        .into_iter()
        .map(|(x, y)| Circle::new((x, y), 3, color.filled())),
    )?;
  }

  chart
    .configure_series_labels()
    .border_style(&BLACK)
    .background_style(&WHITE.mix(0.8))
    .position(SeriesLabelPosition::UpperLeft)
    .draw()?;

  root.present()?;
  Ok(())
}
