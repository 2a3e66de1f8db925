use std::collections::HashMap;
use std::sync::Arc;

use mordant_config::{AssetRequirement, NodeInputs};

/// Per-node-type dependency discovery.
///
/// Handlers are pure: they look only at the node's inputs and never perform
/// I/O. Any closure `Fn(&NodeInputs) -> Vec<AssetRequirement>` is a handler.
pub trait NodeHandler: Send + Sync {
  /// Assets the node needs beyond what its inputs name literally.
  fn discover(&self, inputs: &NodeInputs) -> Vec<AssetRequirement>;

  /// Assets this node type always needs once installed, whether or not a
  /// graph uses it yet.
  fn preload(&self) -> Vec<AssetRequirement> {
    Vec::new()
  }

  /// Reject node configurations this node type cannot run.
  fn check(&self, _inputs: &NodeInputs) -> Result<(), String> {
    Ok(())
  }

  /// The asset category this node type assigns to an input field.
  ///
  /// Takes precedence over the scanner's [`FieldRoles`](crate::FieldRoles).
  fn field_category(&self, _field: &str) -> Option<&str> {
    None
  }
}

impl<F> NodeHandler for F
where
  F: Fn(&NodeInputs) -> Vec<AssetRequirement> + Send + Sync,
{
  fn discover(&self, inputs: &NodeInputs) -> Vec<AssetRequirement> {
    self(inputs)
  }
}

/// Mapping from node `class_type` to its handler.
///
/// Populated once at startup and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct HandlerTable {
  handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl HandlerTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a handler, replacing any previous one for the same type.
  pub fn register(&mut self, class_type: impl Into<String>, handler: impl NodeHandler + 'static) {
    self.handlers.insert(class_type.into(), Arc::new(handler));
  }

  /// Builder-style variant of [`register`](Self::register).
  pub fn with_handler(
    mut self,
    class_type: impl Into<String>,
    handler: impl NodeHandler + 'static,
  ) -> Self {
    self.register(class_type, handler);
    self
  }

  /// Merge another table into this one. Entries in `other` win.
  pub fn extend(&mut self, other: HandlerTable) {
    self.handlers.extend(other.handlers);
  }

  pub fn get(&self, class_type: &str) -> Option<&Arc<dyn NodeHandler>> {
    self.handlers.get(class_type)
  }

  pub fn contains(&self, class_type: &str) -> bool {
    self.handlers.contains_key(class_type)
  }

  /// Registered node types, sorted.
  pub fn class_types(&self) -> Vec<&str> {
    let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
    types.sort_unstable();
    types
  }

  pub fn len(&self) -> usize {
    self.handlers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.handlers.is_empty()
  }
}

impl std::fmt::Debug for HandlerTable {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("HandlerTable")
      .field("class_types", &self.class_types())
      .finish()
  }
}
