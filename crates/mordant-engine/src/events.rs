//! Provisioning events and notifiers for observability.
//!
//! Events are emitted while requirements are resolved so callers can render
//! progress, log, or record what happened. Notifiers never influence control
//! flow.

use std::path::PathBuf;
use std::sync::Arc;

use mordant_config::{AssetId, FailureKind};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Events emitted while provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvisionEvent {
  /// The asset was already present, or another caller just committed it.
  CacheHit { id: AssetId, path: PathBuf },

  /// A fetch attempt has started.
  FetchStarted {
    id: AssetId,
    url: String,
    attempt: u32,
  },

  /// Bytes have arrived for an in-progress fetch.
  Progress {
    id: AssetId,
    bytes_fetched: u64,
    bytes_total: Option<u64>,
  },

  /// A fetch attempt failed and another is scheduled after `delay_ms`.
  RetryScheduled {
    id: AssetId,
    attempt: u32,
    delay_ms: u64,
    error: String,
  },

  /// The asset was fetched and published at its canonical path.
  Committed { id: AssetId, path: PathBuf, size: u64 },

  /// The requirement failed for good.
  Failed { id: AssetId, failure: FailureKind },
}

/// Receives provisioning events.
///
/// `notify` is called inline from fetch tasks, so implementations should
/// return quickly.
pub trait ProvisionNotifier: Send + Sync {
  fn notify(&self, event: ProvisionEvent);
}

impl<N: ProvisionNotifier + ?Sized> ProvisionNotifier for Arc<N> {
  fn notify(&self, event: ProvisionEvent) {
    (**self).notify(event)
  }
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ProvisionNotifier for NoopNotifier {
  fn notify(&self, _event: ProvisionEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ProvisionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ProvisionEvent>) -> Self {
    Self { sender }
  }
}

impl ProvisionNotifier for ChannelNotifier {
  fn notify(&self, event: ProvisionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

/// Writes events to the `tracing` subscriber.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl ProvisionNotifier for TracingNotifier {
  fn notify(&self, event: ProvisionEvent) {
    match event {
      ProvisionEvent::CacheHit { id, path } => {
        debug!(asset = %id, path = %path.display(), "cache hit")
      }
      ProvisionEvent::FetchStarted { id, url, attempt } => {
        info!(asset = %id, %url, attempt, "fetching")
      }
      ProvisionEvent::Progress {
        id,
        bytes_fetched,
        bytes_total,
      } => match bytes_total {
        Some(total) if total > 0 => info!(
          asset = %id,
          bytes = bytes_fetched,
          total,
          "{:.1}%",
          bytes_fetched as f64 * 100.0 / total as f64
        ),
        _ => info!(asset = %id, bytes = bytes_fetched, "downloading"),
      },
      ProvisionEvent::RetryScheduled {
        id,
        attempt,
        delay_ms,
        error,
      } => warn!(asset = %id, attempt, delay_ms, %error, "fetch failed, retrying"),
      ProvisionEvent::Committed { id, path, size } => {
        info!(asset = %id, path = %path.display(), size, "asset ready")
      }
      ProvisionEvent::Failed { id, failure } => {
        warn!(asset = %id, kind = failure.label(), %failure, "asset failed")
      }
    }
  }
}
