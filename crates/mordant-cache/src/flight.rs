//! Single-flight fetch coordination.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mordant_config::{AssetId, FailureKind};
use tokio::fs::{self, File};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::store::CacheInner;

/// How an in-flight fetch ended, as seen by the callers waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
  /// The asset is now present at its canonical path.
  Committed(CacheEntry),
  /// The leader gave up; waiters should report the same failure.
  Failed(FailureKind),
  /// The leader went away without a verdict (cancelled or dropped). Waiters
  /// may start a fetch of their own.
  Abandoned,
}

/// Result of [`CacheStore::begin_fetch`](crate::CacheStore::begin_fetch).
#[derive(Debug)]
pub enum FetchSlot {
  /// The caller owns the fetch.
  Leader(FetchTicket),
  /// Someone else is fetching; wait for their outcome.
  Follower(FetchWaiter),
  /// The asset was committed in the meantime.
  Ready(CacheEntry),
}

/// Exclusive right to fetch one asset.
///
/// Dropping a ticket without committing it removes its temp file and releases
/// the slot with [`FetchOutcome::Abandoned`]. This covers every exit path,
/// including the future that owns it being cancelled.
pub struct FetchTicket {
  inner: Arc<CacheInner>,
  id: AssetId,
  temp_path: PathBuf,
  canonical_path: PathBuf,
  finished: bool,
}

impl FetchTicket {
  pub(crate) fn new(
    inner: Arc<CacheInner>,
    id: AssetId,
    temp_path: PathBuf,
    canonical_path: PathBuf,
  ) -> Self {
    Self {
      inner,
      id,
      temp_path,
      canonical_path,
      finished: false,
    }
  }

  pub fn id(&self) -> &AssetId {
    &self.id
  }

  /// Where fetched bytes are written before commit.
  pub fn temp_path(&self) -> &Path {
    &self.temp_path
  }

  /// Where the asset lands on commit.
  pub fn canonical_path(&self) -> &Path {
    &self.canonical_path
  }

  /// Create the temp file, truncating anything a previous attempt wrote.
  pub async fn create_temp_file(&self) -> Result<File, CacheError> {
    if let Some(parent) = self.temp_path.parent() {
      fs::create_dir_all(parent).await?;
    }
    Ok(File::create(&self.temp_path).await?)
  }

  /// Remove the temp file and wake every waiter with `outcome`.
  pub(crate) fn finish(&mut self, outcome: FetchOutcome) {
    self.finished = true;
    self.remove_temp();
    self.inner.release(&self.id, outcome);
  }

  fn remove_temp(&self) {
    match std::fs::remove_file(&self.temp_path) {
      Ok(()) => debug!(path = %self.temp_path.display(), "removed temp file"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => warn!(path = %self.temp_path.display(), error = %e, "failed to remove temp file"),
    }
  }
}

impl Drop for FetchTicket {
  fn drop(&mut self) {
    if !self.finished {
      self.finish(FetchOutcome::Abandoned);
    }
  }
}

impl std::fmt::Debug for FetchTicket {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FetchTicket")
      .field("id", &self.id)
      .field("temp_path", &self.temp_path)
      .finish()
  }
}

/// Handle on another caller's in-flight fetch.
#[derive(Debug)]
pub struct FetchWaiter {
  id: AssetId,
  receiver: watch::Receiver<Option<FetchOutcome>>,
}

impl FetchWaiter {
  pub(crate) fn new(id: AssetId, receiver: watch::Receiver<Option<FetchOutcome>>) -> Self {
    Self { id, receiver }
  }

  pub fn id(&self) -> &AssetId {
    &self.id
  }

  /// Wait for the leader to finish.
  pub async fn wait(mut self) -> FetchOutcome {
    match self.receiver.wait_for(Option::is_some).await {
      Ok(outcome) => (*outcome).clone().unwrap_or(FetchOutcome::Abandoned),
      // Sender dropped without a verdict.
      Err(_) => FetchOutcome::Abandoned,
    }
  }
}
