//! Mordant Fetch
//!
//! This crate provides the remote side of asset provisioning: a [`Fetcher`]
//! opens a URL and hands back a stream of bytes plus the advertised length.
//!
//! The trait uses async streaming so multi-gigabyte weight files never have
//! to fit in memory. [`HttpFetcher`] is the production implementation; tests
//! substitute their own.

mod http;

pub use http::HttpFetcher;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use url::Url;

/// A boxed stream of bytes from a remote source.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, FetchError>> + Send>>;

/// Error type for remote fetches. Every variant is treated as transient.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
  /// The server answered with a non-success status.
  #[error("{url} returned status {status}")]
  Status { url: String, status: u16 },

  /// Connection, TLS, or body read failure in the HTTP client.
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// Any other transport failure.
  #[error("transport error: {0}")]
  Transport(String),
}

/// An opened remote body.
pub struct RemoteBody {
  /// Length advertised by the remote, if any.
  pub total: Option<u64>,
  pub stream: ByteStream,
}

impl std::fmt::Debug for RemoteBody {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RemoteBody")
      .field("total", &self.total)
      .finish_non_exhaustive()
  }
}

/// Source of remote asset bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
  /// Start fetching `url`.
  ///
  /// Returns once the remote has accepted the request; the body arrives
  /// through the returned stream.
  async fn open(&self, url: &Url) -> Result<RemoteBody, FetchError>;
}
