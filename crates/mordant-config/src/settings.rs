use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SettingsError {
  #[error("failed to read settings file: {0}")]
  Io(#[from] std::io::Error),

  #[error("invalid settings: {0}")]
  Invalid(#[from] serde_json::Error),
}

/// Engine settings, loaded from `config.json` in the data directory.
///
/// Every field has a default, so an empty object (or no file at all) is a
/// valid configuration.
///
/// ```json
/// {
///   "remote_base_url": "https://models.example.com/",
///   "concurrency": 8,
///   "allowed_url_hosts": ["huggingface.co"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Root of the default remote layout for named assets:
  /// `{remote_base_url}/{category}/{name}`.
  pub remote_base_url: Option<String>,

  /// Number of requirements resolved in parallel.
  pub concurrency: usize,

  /// Fetch attempts per requirement before a network failure is final.
  pub max_attempts: u32,

  /// Delay before the first retry; doubles on every further retry.
  pub initial_backoff_ms: u64,

  /// Upper bound for the retry delay.
  pub max_backoff_ms: u64,

  /// Time limit for a single fetch attempt.
  pub attempt_timeout_ms: u64,

  /// Emit a progress event every time this many more bytes have arrived.
  pub progress_interval_bytes: u64,

  /// If set, direct URLs must point at one of these hosts.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub allowed_url_hosts: Option<Vec<String>>,

  /// Bearer token for authenticated remotes.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub auth_token: Option<String>,

  /// Hosts that receive `auth_token`, in addition to the host of
  /// `remote_base_url`. Requests to any other host go out unauthenticated.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub auth_hosts: Vec<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      remote_base_url: None,
      concurrency: 4,
      max_attempts: 4,
      initial_backoff_ms: 500,
      max_backoff_ms: 30_000,
      attempt_timeout_ms: 60 * 60 * 1000,
      progress_interval_bytes: 50 * 1024 * 1024,
      allowed_url_hosts: None,
      auth_token: None,
      auth_hosts: Vec::new(),
    }
  }
}

impl Settings {
  pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
    Ok(serde_json::from_str(json)?)
  }

  /// Hosts that may receive `auth_token`: the remote base host plus
  /// `auth_hosts`, lowercased.
  pub fn token_hosts(&self) -> Vec<String> {
    let base_host = self
      .remote_base_url
      .as_deref()
      .and_then(|base| Url::parse(base).ok())
      .and_then(|url| url.host_str().map(str::to_string));

    let mut hosts: Vec<String> = base_host
      .into_iter()
      .chain(self.auth_hosts.iter().map(|h| h.to_ascii_lowercase()))
      .collect();
    hosts.dedup();
    hosts
  }

  /// Load settings from a file, falling back to defaults if it doesn't exist.
  pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
    match std::fs::read_to_string(path) {
      Ok(content) => Self::from_json_str(&content),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
      Err(e) => Err(SettingsError::Io(e)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_object_uses_defaults() {
    let settings = Settings::from_json_str("{}").unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.concurrency, 4);
  }

  #[test]
  fn test_partial_override() {
    let settings = Settings::from_json_str(
      r#"{ "concurrency": 8, "allowed_url_hosts": ["huggingface.co"] }"#,
    )
    .unwrap();
    assert_eq!(settings.concurrency, 8);
    assert_eq!(settings.max_attempts, 4);
    assert_eq!(
      settings.allowed_url_hosts,
      Some(vec!["huggingface.co".to_string()])
    );
  }

  #[test]
  fn test_token_hosts() {
    let settings = Settings::from_json_str(
      r#"{
        "remote_base_url": "https://models.example.com/assets/",
        "auth_token": "hf_abc",
        "auth_hosts": ["HuggingFace.co"]
      }"#,
    )
    .unwrap();
    assert_eq!(
      settings.token_hosts(),
      vec!["models.example.com".to_string(), "huggingface.co".to_string()]
    );

    assert!(Settings::default().token_hosts().is_empty());
  }

  #[test]
  fn test_missing_file_is_default() {
    let settings =
      Settings::load_or_default(Path::new("/nonexistent/mordant/config.json")).unwrap();
    assert_eq!(settings, Settings::default());
  }
}
