use std::fmt;

use mordant_config::{AssetId, FailureKind};
use serde::Serialize;
use thiserror::Error;

/// One requirement that could not be provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetFailure {
  #[serde(flatten)]
  pub id: AssetId,
  pub failure: FailureKind,
}

impl fmt::Display for AssetFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}: {}", self.id, self.failure.label(), self.failure)
  }
}

/// Every failed requirement of a call, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailureReport {
  pub failures: Vec<AssetFailure>,
}

impl FailureReport {
  pub fn len(&self) -> usize {
    self.failures.len()
  }

  pub fn is_empty(&self) -> bool {
    self.failures.is_empty()
  }

  pub fn get(&self, id: &AssetId) -> Option<&FailureKind> {
    self
      .failures
      .iter()
      .find(|f| &f.id == id)
      .map(|f| &f.failure)
  }
}

impl fmt::Display for FailureReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} asset(s) could not be provisioned:", self.failures.len())?;
    for failure in &self.failures {
      write!(f, "\n  {}", failure)?;
    }
    Ok(())
  }
}

/// Error type for a provisioning call.
#[derive(Debug, Error)]
pub enum ProvisionError {
  /// The caller cancelled the call. No requirement-level failures are reported.
  #[error("provisioning cancelled")]
  Cancelled,

  /// At least one requirement failed.
  #[error("{0}")]
  Failed(FailureReport),
}

impl ProvisionError {
  pub fn report(&self) -> Option<&FailureReport> {
    match self {
      ProvisionError::Failed(report) => Some(report),
      ProvisionError::Cancelled => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn report() -> FailureReport {
    FailureReport {
      failures: vec![
        AssetFailure {
          id: AssetId::new("loras", "bad.safetensors"),
          failure: FailureKind::Unregistered {
            category: "loras".to_string(),
            sanctioned: vec!["good.safetensors".to_string()],
          },
        },
        AssetFailure {
          id: AssetId::new("vae", "ae.safetensors"),
          failure: FailureKind::Network {
            attempts: 4,
            message: "connection reset".to_string(),
          },
        },
      ],
    }
  }

  #[test]
  fn test_report_lists_every_failure() {
    let message = ProvisionError::Failed(report()).to_string();
    let lines: Vec<&str> = message.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "2 asset(s) could not be provisioned:");
    assert!(lines[1].contains("loras/bad.safetensors: UnregisteredAsset"));
    assert!(lines[1].contains("good.safetensors"));
    assert!(lines[2].contains("vae/ae.safetensors: NetworkFailure"));
  }

  #[test]
  fn test_report_json_shape() {
    let json = serde_json::to_value(report()).unwrap();
    let first = &json["failures"][0];
    assert_eq!(first["category"], "loras");
    assert_eq!(first["name"], "bad.safetensors");
    assert_eq!(first["failure"]["kind"], "unregistered");
    assert_eq!(first["failure"]["sanctioned"][0], "good.safetensors");
  }
}
