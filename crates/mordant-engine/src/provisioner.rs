//! The provisioning pipeline.
//!
//! Each requirement runs `validate -> lookup -> begin_fetch -> stream -> commit`.
//! Requirements run concurrently up to the caller's limit; the cache's
//! single-flight tickets make sure concurrent callers asking for the same asset
//! share one download.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use mordant_cache::{CacheError, CacheState, CacheStore, FetchOutcome, FetchSlot, FetchTicket};
use mordant_config::{AssetRequirement, FailureKind, RequirementSet, Settings};
use mordant_fetch::Fetcher;
use mordant_registry::Registry;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::clock::{Clock, TokioClock};
use crate::error::ProvisionError;
use crate::events::{NoopNotifier, ProvisionEvent, ProvisionNotifier};
use crate::layout::RemoteLayout;
use crate::outcome::{RequirementOutcome, ResolvedSet, assemble};
use crate::retry::{RetryPolicy, RetryStep};

/// Corrupt observations tolerated per requirement per call. A corrupt file
/// found in the cache counts as one.
const INTEGRITY_BUDGET: u32 = 2;

/// Tuning for fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionerConfig {
  pub retry: RetryPolicy,
  /// Limit for one fetch attempt, from request to last byte.
  pub attempt_timeout: Duration,
  /// Emit a progress event each time this many more bytes arrive.
  pub progress_interval_bytes: u64,
}

impl Default for ProvisionerConfig {
  fn default() -> Self {
    Self::from_settings(&Settings::default())
  }
}

impl ProvisionerConfig {
  pub fn from_settings(settings: &Settings) -> Self {
    Self {
      retry: RetryPolicy::from_settings(settings),
      attempt_timeout: Duration::from_millis(settings.attempt_timeout_ms),
      progress_interval_bytes: settings.progress_interval_bytes,
    }
  }
}

/// Why a single fetch attempt failed.
#[derive(Debug)]
enum AttemptError {
  /// Worth retrying after a backoff.
  Transient(String),
  /// The bytes are wrong; retry without backoff while the budget lasts.
  Corrupt(String),
  /// Local disk trouble; not retried.
  Storage(String),
}

/// Resolves requirements into local paths.
///
/// Generic over `N: ProvisionNotifier` so callers choose how events are
/// observed. `Provisioner::new` discards them.
pub struct Provisioner<N: ProvisionNotifier = NoopNotifier> {
  registry: Arc<Registry>,
  cache: CacheStore,
  fetcher: Arc<dyn Fetcher>,
  layout: RemoteLayout,
  clock: Arc<dyn Clock>,
  config: ProvisionerConfig,
  notifier: N,
}

impl Provisioner<NoopNotifier> {
  pub fn new(
    registry: Arc<Registry>,
    cache: CacheStore,
    fetcher: Arc<dyn Fetcher>,
    layout: RemoteLayout,
  ) -> Self {
    Self {
      registry,
      cache,
      fetcher,
      layout,
      clock: Arc::new(TokioClock),
      config: ProvisionerConfig::default(),
      notifier: NoopNotifier,
    }
  }
}

impl<N: ProvisionNotifier> Provisioner<N> {
  /// Replace the notifier.
  pub fn with_notifier<M: ProvisionNotifier>(self, notifier: M) -> Provisioner<M> {
    Provisioner {
      registry: self.registry,
      cache: self.cache,
      fetcher: self.fetcher,
      layout: self.layout,
      clock: self.clock,
      config: self.config,
      notifier,
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_config(mut self, config: ProvisionerConfig) -> Self {
    self.config = config;
    self
  }

  pub fn cache(&self) -> &CacheStore {
    &self.cache
  }

  pub fn registry(&self) -> &Registry {
    &self.registry
  }

  /// Make every requirement present locally.
  ///
  /// Runs at most `concurrency` requirements at once (zero is treated as one).
  /// A failing requirement does not stop the others; if any failed, the error
  /// lists all of them. Cancelling `cancel` stops every in-flight fetch and
  /// removes its temp file before this returns.
  pub async fn provision(
    &self,
    requirements: &[AssetRequirement],
    concurrency: usize,
    cancel: CancellationToken,
  ) -> Result<ResolvedSet, ProvisionError> {
    let unique: RequirementSet = requirements.iter().cloned().collect();
    let limit = concurrency.max(1);
    debug!(requirements = unique.len(), concurrency = limit, "provisioning");

    let jobs: Vec<_> = unique
      .iter()
      .map(|req| {
        async move {
          let outcome = self.resolve(req).await;
          (req.id.clone(), outcome)
        }
        .boxed()
      })
      .collect();
    let work = futures::stream::iter(jobs)
      .buffer_unordered(limit)
      .collect::<HashMap<_, _>>();

    let outcomes = tokio::select! {
      biased;
      _ = cancel.cancelled() => {
        info!("provisioning cancelled");
        return Err(ProvisionError::Cancelled);
      }
      outcomes = work => outcomes,
    };

    let resolved = assemble(unique.as_slice(), outcomes).map_err(ProvisionError::Failed)?;
    info!(assets = resolved.len(), "all assets provisioned");
    Ok(resolved)
  }

  async fn resolve(&self, req: &AssetRequirement) -> RequirementOutcome {
    let result = self.resolve_inner(req).await;
    if let Err(failure) = &result {
      self.notifier.notify(ProvisionEvent::Failed {
        id: req.id.clone(),
        failure: failure.clone(),
      });
    }
    result
  }

  async fn resolve_inner(&self, req: &AssetRequirement) -> RequirementOutcome {
    self.registry.validate(req).map_err(FailureKind::from)?;

    let id = &req.id;
    let mut corruptions = 0;
    loop {
      let entry = self.cache.lookup(id).await.map_err(storage_failure)?;
      match entry.state {
        CacheState::Present => {
          self.notifier.notify(ProvisionEvent::CacheHit {
            id: id.clone(),
            path: entry.local_path.clone(),
          });
          return Ok(entry.local_path);
        }
        CacheState::Corrupt => {
          corruptions += 1;
          warn!(asset = %id, size = entry.size, "cached asset is corrupt, fetching again");
        }
        CacheState::Absent | CacheState::Fetching => {}
      }

      match self.cache.begin_fetch(id).map_err(storage_failure)? {
        FetchSlot::Leader(ticket) => return self.fetch(req, ticket, corruptions).await,
        FetchSlot::Ready(entry) => {
          self.notifier.notify(ProvisionEvent::CacheHit {
            id: id.clone(),
            path: entry.local_path.clone(),
          });
          return Ok(entry.local_path);
        }
        FetchSlot::Follower(waiter) => {
          debug!(asset = %id, "waiting for in-flight fetch");
          match waiter.wait().await {
            FetchOutcome::Committed(entry) => {
              self.notifier.notify(ProvisionEvent::CacheHit {
                id: id.clone(),
                path: entry.local_path.clone(),
              });
              return Ok(entry.local_path);
            }
            FetchOutcome::Failed(failure) => return Err(failure),
            // The leader went away; start over and maybe lead.
            FetchOutcome::Abandoned => corruptions = 0,
          }
        }
      }
    }
  }

  /// Drive fetch attempts for a ticket until commit or a final failure.
  async fn fetch(
    &self,
    req: &AssetRequirement,
    ticket: FetchTicket,
    mut corruptions: u32,
  ) -> RequirementOutcome {
    let id = &req.id;
    let Some(url) = self.layout.locate(req) else {
      let failure = FailureKind::NoRemote;
      self.cache.fail(ticket, failure.clone());
      return Err(failure);
    };

    let mut attempt = 0;
    let mut network_failures = 0;
    loop {
      attempt += 1;
      self.notifier.notify(ProvisionEvent::FetchStarted {
        id: id.clone(),
        url: url.to_string(),
        attempt,
      });

      let error = match self.attempt(&ticket, &url).await {
        Ok(size) => return self.commit(ticket, size, &url).await,
        Err(error) => error,
      };

      match error {
        AttemptError::Storage(message) => {
          let failure = FailureKind::Storage { message };
          self.cache.fail(ticket, failure.clone());
          return Err(failure);
        }
        AttemptError::Corrupt(message) => {
          corruptions += 1;
          if corruptions >= INTEGRITY_BUDGET {
            let failure = FailureKind::Integrity { message };
            self.cache.fail(ticket, failure.clone());
            return Err(failure);
          }
          warn!(asset = %id, attempt, %message, "download failed verification, fetching again");
        }
        AttemptError::Transient(message) => {
          network_failures += 1;
          match self.config.retry.after_failure(network_failures) {
            RetryStep::Backoff(delay) => {
              self.notifier.notify(ProvisionEvent::RetryScheduled {
                id: id.clone(),
                attempt,
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error: message,
              });
              self.clock.sleep(delay).await;
            }
            RetryStep::GiveUp => {
              let failure = FailureKind::Network {
                attempts: network_failures,
                message,
              };
              self.cache.fail(ticket, failure.clone());
              return Err(failure);
            }
          }
        }
      }
    }
  }

  /// One attempt: stream the remote body into the ticket's temp file.
  ///
  /// Returns the number of bytes written once they pass verification.
  async fn attempt(&self, ticket: &FetchTicket, url: &Url) -> Result<u64, AttemptError> {
    let file = ticket
      .create_temp_file()
      .await
      .map_err(|e| AttemptError::Storage(e.to_string()))?;

    let limit = self.config.attempt_timeout;
    let size = match tokio::time::timeout(limit, self.stream_to(ticket, url, file)).await {
      Ok(result) => result?,
      Err(_) => {
        return Err(AttemptError::Transient(format!(
          "attempt timed out after {}s",
          limit.as_secs_f64()
        )));
      }
    };

    self.cache.verify(ticket, size).await.map_err(|e| match e {
      e @ CacheError::SizeMismatch { .. } => AttemptError::Corrupt(e.to_string()),
      e => AttemptError::Storage(e.to_string()),
    })?;
    Ok(size)
  }

  async fn stream_to(
    &self,
    ticket: &FetchTicket,
    url: &Url,
    mut file: tokio::fs::File,
  ) -> Result<u64, AttemptError> {
    let id = ticket.id();
    let body = self
      .fetcher
      .open(url)
      .await
      .map_err(|e| AttemptError::Transient(e.to_string()))?;
    let total = body.total;
    let mut stream = body.stream;

    let interval = self.config.progress_interval_bytes.max(1);
    let mut fetched: u64 = 0;
    let mut next_report = interval;

    while let Some(chunk) = stream.next().await {
      let chunk = chunk.map_err(|e| AttemptError::Transient(e.to_string()))?;
      fetched += chunk.len() as u64;
      if let Some(total) = total
        && fetched > total
      {
        return Err(AttemptError::Corrupt(format!(
          "received more than the advertised {} bytes",
          total
        )));
      }

      file
        .write_all(&chunk)
        .await
        .map_err(|e| AttemptError::Storage(e.to_string()))?;

      if fetched >= next_report {
        next_report = (fetched / interval + 1) * interval;
        self.notifier.notify(ProvisionEvent::Progress {
          id: id.clone(),
          bytes_fetched: fetched,
          bytes_total: total,
        });
      }
    }

    file
      .flush()
      .await
      .map_err(|e| AttemptError::Storage(e.to_string()))?;
    file
      .sync_all()
      .await
      .map_err(|e| AttemptError::Storage(e.to_string()))?;
    drop(file);

    if fetched == 0 {
      return Err(AttemptError::Corrupt("remote returned an empty body".to_string()));
    }
    if let Some(total) = total
      && fetched < total
    {
      return Err(AttemptError::Transient(format!(
        "connection closed after {} of {} bytes",
        fetched, total
      )));
    }

    self.notifier.notify(ProvisionEvent::Progress {
      id: id.clone(),
      bytes_fetched: fetched,
      bytes_total: total,
    });
    Ok(fetched)
  }

  async fn commit(&self, ticket: FetchTicket, size: u64, url: &Url) -> RequirementOutcome {
    let id = ticket.id().clone();
    match self.cache.commit(ticket, size, Some(url.as_str())).await {
      Ok(entry) => {
        self.notifier.notify(ProvisionEvent::Committed {
          id,
          path: entry.local_path.clone(),
          size: entry.size,
        });
        Ok(entry.local_path)
      }
      Err(e @ CacheError::SizeMismatch { .. }) => Err(FailureKind::Integrity {
        message: e.to_string(),
      }),
      Err(e) => Err(storage_failure(e)),
    }
  }
}

fn storage_failure(err: CacheError) -> FailureKind {
  FailureKind::Storage {
    message: err.to_string(),
  }
}

