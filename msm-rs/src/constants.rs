// Constants shared by the clustering and kinetic-model stages

/// Label of a sample that is not assigned to any state.
pub const OUTLIER: i32 = -1;

/// Fraction of a prior cluster that must keep a valid label in the refined
/// pass before the cluster is replaced by the refined labels.
pub const RETAIN_THRESHOLD: f64 = 0.7;

/// Largest imaginary component that is dropped silently when only the real
/// part of an eigenpair is reported.
pub const IMAGINARY_TOLERANCE: f64 = 1e-8;
