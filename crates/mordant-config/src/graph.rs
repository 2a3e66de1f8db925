use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::input::InputValue;

/// Node inputs keyed by field name.
///
/// Sorted so that field traversal (and therefore requirement discovery) is
/// deterministic.
pub type NodeInputs = BTreeMap<String, InputValue>;

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("invalid workflow json: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("invalid node '{node_id}': {message}")]
  InvalidNode { node_id: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  /// Node id, taken from the key in the workflow document.
  #[serde(skip)]
  pub id: String,
  pub class_type: String,
  #[serde(default)]
  pub inputs: NodeInputs,
}

impl NodeDef {
  pub fn new(id: impl Into<String>, class_type: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      class_type: class_type.into(),
      inputs: NodeInputs::new(),
    }
  }

  /// Builder-style helper for setting an input.
  pub fn with_input(mut self, field: impl Into<String>, value: impl Into<InputValue>) -> Self {
    self.inputs.insert(field.into(), value.into());
    self
  }
}

/// A workflow graph: node id -> node, in document order.
///
/// Serialized as a JSON object keyed by node id:
///
/// ```json
/// {
///   "4": { "class_type": "CheckpointLoaderSimple", "inputs": { "ckpt_name": "base.safetensors" } },
///   "10": { "class_type": "LoraLoader", "inputs": { "lora_name": "detail.safetensors", "model": ["4", 0] } }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
  try_from = "serde_json::Map<String, serde_json::Value>",
  into = "serde_json::Map<String, serde_json::Value>"
)]
pub struct WorkflowGraph {
  nodes: Vec<NodeDef>,
}

impl WorkflowGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Parse a graph from its JSON document.
  pub fn from_json_str(json: &str) -> Result<Self, GraphError> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
    Self::try_from(map)
  }

  /// Append a node, replacing any existing node with the same id.
  pub fn insert(&mut self, node: NodeDef) {
    match self.nodes.iter_mut().find(|n| n.id == node.id) {
      Some(existing) => *existing = node,
      None => self.nodes.push(node),
    }
  }

  /// Builder-style variant of [`insert`](Self::insert).
  pub fn with_node(mut self, node: NodeDef) -> Self {
    self.insert(node);
    self
  }

  pub fn get(&self, node_id: &str) -> Option<&NodeDef> {
    self.nodes.iter().find(|n| n.id == node_id)
  }

  /// Iterate nodes in document order.
  pub fn nodes(&self) -> impl Iterator<Item = &NodeDef> {
    self.nodes.iter()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

impl TryFrom<serde_json::Map<String, serde_json::Value>> for WorkflowGraph {
  type Error = GraphError;

  fn try_from(map: serde_json::Map<String, serde_json::Value>) -> Result<Self, Self::Error> {
    let mut nodes = Vec::with_capacity(map.len());
    for (node_id, value) in map {
      let mut node: NodeDef =
        serde_json::from_value(value).map_err(|e| GraphError::InvalidNode {
          node_id: node_id.clone(),
          message: e.to_string(),
        })?;
      node.id = node_id;
      nodes.push(node);
    }
    Ok(Self { nodes })
  }
}

impl From<WorkflowGraph> for serde_json::Map<String, serde_json::Value> {
  fn from(graph: WorkflowGraph) -> Self {
    graph
      .nodes
      .into_iter()
      .map(|node| {
        let id = node.id.clone();
        let value = serde_json::json!({
          "class_type": node.class_type,
          "inputs": node.inputs,
        });
        (id, value)
      })
      .collect()
  }
}
