use std::fmt;

use thiserror::Error;

/// A node whose configuration its handler refuses to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedNode {
  pub node_id: String,
  pub class_type: String,
  pub reason: String,
}

impl fmt::Display for UnsupportedNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "node '{}' ({}): {}",
      self.node_id, self.class_type, self.reason
    )
  }
}

#[derive(Debug, Error)]
pub enum ScanError {
  /// One or more nodes are configured in a way their handler rejects.
  #[error("unsupported nodes in workflow:\n{}", format_nodes(.nodes))]
  UnsupportedNodes { nodes: Vec<UnsupportedNode> },

  /// IO error when reading a handler manifest.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// Failed to parse a handler manifest.
  #[error("invalid handler manifest: {0}")]
  InvalidManifest(#[from] serde_json::Error),
}

fn format_nodes(nodes: &[UnsupportedNode]) -> String {
  nodes
    .iter()
    .map(|n| format!("  - {}", n))
    .collect::<Vec<_>>()
    .join("\n")
}
