//! Input value types for workflow node configuration.
//!
//! Node inputs are whatever the graph author wrote: literal strings, numbers,
//! booleans, or a link to another node's output.
//!
//! # Examples
//!
//! ```json
//! {
//!   "ckpt_name": "sd_xl_base_1.0.safetensors",
//!   "strength_model": 0.8,
//!   "model": ["4", 0]
//! }
//! ```
//!
//! Here `"ckpt_name"` is a [`InputValue::Text`], `"strength_model"` is a
//! [`InputValue::Number`], and `"model"` is an edge ([`InputValue::Link`]) to
//! output slot `0` of node `"4"`.

use serde::{Deserialize, Serialize};

/// A reference to another node's output: `[node_id, output_slot]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLink(pub String, pub u32);

/// A single node input value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
  Text(String),
  Number(serde_json::Number),
  Bool(bool),
  Link(NodeLink),
  /// Anything else (nested objects, arrays that are not links, null).
  Other(serde_json::Value),
}

impl InputValue {
  /// Returns the string content for text inputs.
  pub fn as_str(&self) -> Option<&str> {
    match self {
      InputValue::Text(s) => Some(s),
      _ => None,
    }
  }

  /// Returns the upstream link for edge inputs.
  pub fn as_link(&self) -> Option<&NodeLink> {
    match self {
      InputValue::Link(link) => Some(link),
      _ => None,
    }
  }
}

impl From<&str> for InputValue {
  fn from(value: &str) -> Self {
    InputValue::Text(value.to_string())
  }
}
