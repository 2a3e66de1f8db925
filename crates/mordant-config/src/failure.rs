use serde::Serialize;
use thiserror::Error;

/// Why a single asset requirement could not be provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
  /// A named asset that is not in the registry. Never retried.
  #[error("not a registered {category} asset (sanctioned: [{}])", .sanctioned.join(", "))]
  Unregistered {
    category: String,
    sanctioned: Vec<String>,
  },

  /// A direct URL whose host is outside the configured allow-list.
  #[error("download host '{host}' is not allowed")]
  DisallowedSource { host: String },

  /// A named asset with no remote location to fetch it from.
  #[error("no remote location configured for named assets")]
  NoRemote,

  /// Transient fetch errors that persisted through every retry.
  #[error("network failure after {attempts} attempt(s): {message}")]
  Network { attempts: u32, message: String },

  /// Size mismatch or empty result that recurred after a re-fetch.
  #[error("integrity failure: {message}")]
  Integrity { message: String },

  /// Local filesystem error while writing or committing the asset.
  #[error("storage failure: {message}")]
  Storage { message: String },
}

impl FailureKind {
  /// Short label naming the failure class, for reports.
  pub fn label(&self) -> &'static str {
    match self {
      FailureKind::Unregistered { .. } => "UnregisteredAsset",
      FailureKind::DisallowedSource { .. } => "DisallowedSource",
      FailureKind::NoRemote => "NoRemote",
      FailureKind::Network { .. } => "NetworkFailure",
      FailureKind::Integrity { .. } => "IntegrityFailure",
      FailureKind::Storage { .. } => "StorageFailure",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unregistered_message_lists_sanctioned_names() {
    let kind = FailureKind::Unregistered {
      category: "loras".to_string(),
      sanctioned: vec!["a.safetensors".to_string(), "b.safetensors".to_string()],
    };
    assert_eq!(
      kind.to_string(),
      "not a registered loras asset (sanctioned: [a.safetensors, b.safetensors])"
    );
    assert_eq!(kind.label(), "UnregisteredAsset");
  }

  #[test]
  fn test_serialize_tagged() {
    let kind = FailureKind::Network {
      attempts: 4,
      message: "connection reset".to_string(),
    };
    let json = serde_json::to_value(&kind).unwrap();
    assert_eq!(json["kind"], "network");
    assert_eq!(json["attempts"], 4);
  }
}
