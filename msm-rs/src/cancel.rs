use crate::error::MsmError;
use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// Cooperative cancellation flag shared between a running computation and
/// whoever wants to stop it.
///
/// Long loops (center selection, lag sweeps) poll the token between
/// iterations and return [`MsmError::Cancelled`] once it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  flag: Arc<AtomicBool>,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  /// Request cancellation. Every clone of this token observes it.
  pub fn cancel(&self) {
    self.flag.store(true, Ordering::Relaxed);
  }

  pub fn is_cancelled(&self) -> bool {
    self.flag.load(Ordering::Relaxed)
  }

  pub(crate) fn check(token: Option<&CancelToken>) -> Result<()> {
    match token {
      Some(t) if t.is_cancelled() => Err(MsmError::Cancelled),
      _ => Ok(()),
    }
  }
}
