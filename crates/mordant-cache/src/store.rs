use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mordant_config::{AssetId, FailureKind};
use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::entry::{CacheEntry, CacheState, IndexRecord};
use crate::error::CacheError;
use crate::flight::{FetchOutcome, FetchSlot, FetchTicket, FetchWaiter};

const META_DIR: &str = ".mordant";
const INDEX_DIR: &str = "index";
const TEMP_SUFFIX: &str = ".part";

type FlightMap = HashMap<AssetId, watch::Sender<Option<FetchOutcome>>>;

pub(crate) struct CacheInner {
  root: PathBuf,
  index: Mutex<HashMap<AssetId, IndexRecord>>,
  in_flight: Mutex<FlightMap>,
}

impl CacheInner {
  /// Drop the flight for `id` and wake its waiters.
  pub(crate) fn release(&self, id: &AssetId, outcome: FetchOutcome) {
    let sender = lock(&self.in_flight).remove(id);
    if let Some(sender) = sender {
      sender.send_replace(Some(outcome));
    }
  }
}

// Nothing held under these locks can be left half-updated by a panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Local asset cache rooted at one directory.
///
/// Cheap to clone; clones share the index and the in-flight table, so every
/// provisioning call in a process should use clones of one store.
#[derive(Clone)]
pub struct CacheStore {
  inner: Arc<CacheInner>,
}

impl CacheStore {
  /// Open (creating if needed) the cache at `root`.
  ///
  /// Temp files left behind by an interrupted process are deleted and the
  /// metadata index is reloaded from disk.
  pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
    let root = root.into();
    fs::create_dir_all(&root).await?;

    let meta_dir = root.join(META_DIR);
    let swept = sweep_temp_files(&root, &meta_dir).await?;
    if swept > 0 {
      info!(root = %root.display(), count = swept, "removed stale temp files");
    }

    let mut records = Vec::new();
    let index_dir = meta_dir.join(INDEX_DIR);
    if fs::try_exists(&index_dir).await? {
      read_index_dir(&index_dir, &mut records).await?;
    }

    let mut index = HashMap::new();
    for record in records {
      let id = record.id();
      if let Err(message) = id.check_path_safe() {
        warn!(asset = %id, %message, "ignoring index record");
        continue;
      }
      index.insert(id, record);
    }
    debug!(root = %root.display(), assets = index.len(), "opened cache");

    Ok(Self {
      inner: Arc::new(CacheInner {
        root,
        index: Mutex::new(index),
        in_flight: Mutex::new(HashMap::new()),
      }),
    })
  }

  pub fn root(&self) -> &Path {
    &self.inner.root
  }

  /// The canonical path for `id`: `{root}/{category}/{name}`.
  pub fn canonical_path(&self, id: &AssetId) -> Result<PathBuf, CacheError> {
    id.check_path_safe()
      .map_err(|message| CacheError::InvalidIdentity {
        id: id.clone(),
        message,
      })?;

    let mut path = self.inner.root.join(&id.category);
    for component in id.name.split('/') {
      path.push(component);
    }
    Ok(path)
  }

  /// Whether a fetch ticket for `id` is outstanding.
  pub fn is_fetching(&self, id: &AssetId) -> bool {
    lock(&self.inner.in_flight).contains_key(id)
  }

  /// Every asset the index knows about, sorted.
  pub fn indexed(&self) -> Vec<AssetId> {
    let mut ids: Vec<AssetId> = lock(&self.inner.index).keys().cloned().collect();
    ids.sort();
    ids
  }

  /// Report the state of `id` without changing anything but the index.
  ///
  /// A non-empty file with no index record (placed by hand, or committed by a
  /// version without an index) is adopted at its current size.
  pub async fn lookup(&self, id: &AssetId) -> Result<CacheEntry, CacheError> {
    let local_path = self.canonical_path(id)?;
    let entry = |size, state| CacheEntry {
      id: id.clone(),
      local_path: local_path.clone(),
      size,
      state,
    };

    if self.is_fetching(id) {
      return Ok(entry(0, CacheState::Fetching));
    }

    let metadata = match fs::metadata(&local_path).await {
      Ok(metadata) => metadata,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        self.forget(id).await;
        return Ok(entry(0, CacheState::Absent));
      }
      Err(e) => return Err(e.into()),
    };

    let size = metadata.len();
    if !metadata.is_file() || size == 0 {
      return Ok(entry(size, CacheState::Corrupt));
    }

    let recorded = lock(&self.inner.index).get(id).map(|record| record.size);
    match recorded {
      Some(recorded) if recorded == size => Ok(entry(size, CacheState::Present)),
      Some(recorded) => {
        warn!(asset = %id, recorded, on_disk = size, "cached asset size changed since commit");
        Ok(entry(size, CacheState::Corrupt))
      }
      None => {
        debug!(asset = %id, size, "adopting unindexed asset");
        if let Err(e) = self.record(id, size, None).await {
          warn!(asset = %id, error = %e, "failed to persist index record");
        }
        Ok(entry(size, CacheState::Present))
      }
    }
  }

  /// Claim the right to fetch `id`, or join the caller that already has it.
  pub fn begin_fetch(&self, id: &AssetId) -> Result<FetchSlot, CacheError> {
    let canonical_path = self.canonical_path(id)?;

    let mut in_flight = lock(&self.inner.in_flight);
    if let Some(sender) = in_flight.get(id) {
      return Ok(FetchSlot::Follower(FetchWaiter::new(
        id.clone(),
        sender.subscribe(),
      )));
    }

    if let Some(entry) = self.committed_entry(id, &canonical_path) {
      return Ok(FetchSlot::Ready(entry));
    }

    let (sender, _) = watch::channel(None);
    in_flight.insert(id.clone(), sender);
    drop(in_flight);

    let temp_path = temp_path_for(&canonical_path);
    debug!(asset = %id, temp = %temp_path.display(), "began fetch");
    Ok(FetchSlot::Leader(FetchTicket::new(
      self.inner.clone(),
      id.clone(),
      temp_path,
      canonical_path,
    )))
  }

  /// Publish the ticket's temp file at the canonical path.
  ///
  /// `size` is the byte count the writer produced; if the temp file doesn't
  /// hold exactly that many (non-zero) bytes nothing is published.
  pub async fn commit(
    &self,
    mut ticket: FetchTicket,
    size: u64,
    source: Option<&str>,
  ) -> Result<CacheEntry, CacheError> {
    let id = ticket.id().clone();

    if let Err(err) = self.verify(&ticket, size).await {
      let failure = match &err {
        CacheError::SizeMismatch { .. } => FailureKind::Integrity {
          message: err.to_string(),
        },
        _ => FailureKind::Storage {
          message: err.to_string(),
        },
      };
      ticket.finish(FetchOutcome::Failed(failure));
      return Err(err);
    }

    if let Err(e) = fs::rename(ticket.temp_path(), ticket.canonical_path()).await {
      ticket.finish(FetchOutcome::Failed(FailureKind::Storage {
        message: e.to_string(),
      }));
      return Err(e.into());
    }

    if let Err(e) = self.record(&id, size, source).await {
      warn!(asset = %id, error = %e, "failed to persist index record");
    }

    let entry = CacheEntry {
      id,
      local_path: ticket.canonical_path().to_path_buf(),
      size,
      state: CacheState::Present,
    };
    info!(asset = %entry.id, size, "committed asset");
    ticket.finish(FetchOutcome::Committed(entry.clone()));
    Ok(entry)
  }

  /// Check that the ticket's temp file holds exactly `size` bytes.
  ///
  /// Leaves the ticket in flight, so the caller can write the temp file
  /// again after a [`CacheError::SizeMismatch`].
  pub async fn verify(&self, ticket: &FetchTicket, size: u64) -> Result<(), CacheError> {
    let actual = fs::metadata(ticket.temp_path()).await?.len();
    if actual != size || size == 0 {
      return Err(CacheError::SizeMismatch {
        id: ticket.id().clone(),
        expected: size,
        actual,
      });
    }
    Ok(())
  }

  /// Give up on a fetch. Waiters see [`FetchOutcome::Abandoned`].
  pub fn abort(&self, ticket: FetchTicket) {
    drop(ticket);
  }

  /// Give up on a fetch with a verdict waiters should share.
  pub fn fail(&self, mut ticket: FetchTicket, kind: FailureKind) {
    ticket.finish(FetchOutcome::Failed(kind));
  }

  fn committed_entry(&self, id: &AssetId, path: &Path) -> Option<CacheEntry> {
    let recorded = lock(&self.inner.index).get(id).map(|record| record.size)?;
    let size = std::fs::metadata(path).ok().filter(|m| m.is_file())?.len();
    (size > 0 && size == recorded).then(|| CacheEntry {
      id: id.clone(),
      local_path: path.to_path_buf(),
      size,
      state: CacheState::Present,
    })
  }

  fn record_path(&self, id: &AssetId) -> PathBuf {
    let mut path = self.inner.root.join(META_DIR).join(INDEX_DIR).join(&id.category);
    for component in id.name.split('/') {
      path.push(component);
    }
    let mut file_name = path.file_name().map(OsString::from).unwrap_or_default();
    file_name.push(".json");
    path.set_file_name(file_name);
    path
  }

  async fn record(&self, id: &AssetId, size: u64, source: Option<&str>) -> Result<(), CacheError> {
    let record = IndexRecord {
      category: id.category.clone(),
      name: id.name.clone(),
      size,
      source: source.map(str::to_string),
    };
    lock(&self.inner.index).insert(id.clone(), record.clone());

    let path = self.record_path(id);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }
    let mut tmp_name = path.file_name().map(OsString::from).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let json = serde_json::to_vec_pretty(&record).map_err(std::io::Error::other)?;
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, &path).await?;
    Ok(())
  }

  async fn forget(&self, id: &AssetId) {
    if lock(&self.inner.index).remove(id).is_none() {
      return;
    }
    match fs::remove_file(self.record_path(id)).await {
      Ok(()) => debug!(asset = %id, "dropped index record"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => warn!(asset = %id, error = %e, "failed to drop index record"),
    }
  }
}

impl std::fmt::Debug for CacheStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CacheStore")
      .field("root", &self.inner.root)
      .finish_non_exhaustive()
  }
}

/// `{dir}/.{file_name}.{uuid}.part`, hidden and unique per ticket.
fn temp_path_for(canonical: &Path) -> PathBuf {
  let file_name = canonical
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default();
  canonical.with_file_name(format!(".{}.{}{}", file_name, uuid::Uuid::new_v4(), TEMP_SUFFIX))
}

fn is_temp_file(path: &Path) -> bool {
  path
    .file_name()
    .and_then(|name| name.to_str())
    .is_some_and(|name| name.starts_with('.') && name.ends_with(TEMP_SUFFIX))
}

async fn sweep_temp_files(dir: &Path, skip: &Path) -> Result<usize, std::io::Error> {
  let mut removed = 0;
  let mut entries = fs::read_dir(dir).await?;
  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    let file_type = entry.file_type().await?;
    if file_type.is_dir() {
      if path != skip {
        removed += Box::pin(sweep_temp_files(&path, skip)).await?;
      }
    } else if is_temp_file(&path) {
      fs::remove_file(&path).await?;
      removed += 1;
    }
  }
  Ok(removed)
}

async fn read_index_dir(dir: &Path, records: &mut Vec<IndexRecord>) -> Result<(), std::io::Error> {
  let mut entries = fs::read_dir(dir).await?;
  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    if entry.file_type().await?.is_dir() {
      Box::pin(read_index_dir(&path, records)).await?;
      continue;
    }

    match path.extension().and_then(|ext| ext.to_str()) {
      Some("json") => {
        let bytes = fs::read(&path).await?;
        match serde_json::from_slice::<IndexRecord>(&bytes) {
          Ok(record) => records.push(record),
          Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable index record"),
        }
      }
      // Half-written record from an interrupted commit.
      Some("tmp") => fs::remove_file(&path).await?,
      _ => {}
    }
  }
  Ok(())
}
