use mordant_config::FailureKind;
use thiserror::Error;

/// Errors that can occur when loading the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// IO error when reading the registry file.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// Failed to parse the registry JSON.
  #[error("invalid registry: {0}")]
  InvalidRegistry(#[from] serde_json::Error),

  /// A category or asset name that can't be used as a cache path.
  #[error("invalid registry entry '{entry}': {message}")]
  InvalidEntry { entry: String, message: String },
}

/// Why a requirement failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
  /// Named asset absent from its category's sanctioned set.
  #[error("{category}/{name} is not registered (sanctioned: [{}])", .sanctioned.join(", "))]
  Unregistered {
    category: String,
    name: String,
    sanctioned: Vec<String>,
  },

  /// Direct URL outside the allowed hosts or schemes.
  #[error("{url} is not an allowed download source")]
  DisallowedSource { url: String, host: String },
}

impl From<Rejection> for FailureKind {
  fn from(rejection: Rejection) -> Self {
    match rejection {
      Rejection::Unregistered {
        category,
        sanctioned,
        ..
      } => FailureKind::Unregistered {
        category,
        sanctioned,
      },
      Rejection::DisallowedSource { host, .. } => FailureKind::DisallowedSource { host },
    }
  }
}
