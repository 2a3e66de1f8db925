use mordant_config::AssetId;
use thiserror::Error;

/// Error type for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
  /// The identity can't be mapped to a path inside the cache root.
  #[error("invalid asset identity {id}: {message}")]
  InvalidIdentity { id: AssetId, message: String },

  /// The temp file didn't hold the number of bytes the writer reported.
  #[error("size mismatch for {id}: expected {expected} bytes, found {actual}")]
  SizeMismatch {
    id: AssetId,
    expected: u64,
    actual: u64,
  },

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
