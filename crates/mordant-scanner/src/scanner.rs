use std::sync::Arc;

use mordant_config::{AssetRequirement, InputValue, NodeDef, RequirementSet, WorkflowGraph};
use tracing::{debug, trace};

use crate::error::{ScanError, UnsupportedNode};
use crate::handler::HandlerTable;
use crate::roles::{FieldRoles, classify_text, parse_remote_url};

/// Walks a workflow graph and collects the assets it needs.
#[derive(Debug, Clone)]
pub struct Scanner {
  handlers: Arc<HandlerTable>,
  roles: FieldRoles,
}

impl Scanner {
  /// Create a scanner with the default field roles.
  pub fn new(handlers: Arc<HandlerTable>) -> Self {
    Self {
      handlers,
      roles: FieldRoles::default(),
    }
  }

  pub fn with_roles(mut self, roles: FieldRoles) -> Self {
    self.roles = roles;
    self
  }

  pub fn handlers(&self) -> &HandlerTable {
    &self.handlers
  }

  /// Collect every asset requirement in the graph.
  ///
  /// Never fails: node types without a handler contribute only their literal
  /// inputs. The result is de-duplicated by identity and ordered by discovery
  /// (document order of nodes, then sorted field order, then handler output).
  pub fn scan(&self, graph: &WorkflowGraph) -> RequirementSet {
    let mut found = RequirementSet::new();
    for node in graph.nodes() {
      self.scan_node(node, &mut found);
    }
    debug!(
      nodes = graph.len(),
      requirements = found.len(),
      "scanned workflow graph"
    );
    found
  }

  /// Collect the requirements of a single node into `found`.
  pub fn scan_node(&self, node: &NodeDef, found: &mut RequirementSet) {
    let handler = self.handlers.get(&node.class_type);

    for (field, value) in &node.inputs {
      let InputValue::Text(text) = value else {
        continue;
      };

      let category = handler
        .and_then(|h| h.field_category(field))
        .or_else(|| self.roles.category_for(&node.class_type, field));
      let requirement = match category {
        Some(category) => classify_text(category, text),
        None => parse_remote_url(text)
          .and_then(|url| AssetRequirement::from_url(self.roles.url_category(), url)),
      };

      if let Some(req) = requirement {
        trace!(node_id = %node.id, field = %field, asset = %req.id, "literal requirement");
        found.insert(req);
      }
    }

    match handler {
      Some(handler) => {
        let implicit = handler.discover(&node.inputs);
        trace!(
          node_id = %node.id,
          class_type = %node.class_type,
          count = implicit.len(),
          "handler requirements"
        );
        found.extend(implicit);
      }
      None => {
        trace!(node_id = %node.id, class_type = %node.class_type, "no handler for node type");
      }
    }
  }

  /// Ask each node's handler whether it can run the node as configured.
  ///
  /// Reports every offending node, not just the first.
  pub fn check_supported(&self, graph: &WorkflowGraph) -> Result<(), ScanError> {
    let nodes: Vec<UnsupportedNode> = graph
      .nodes()
      .filter_map(|node| {
        let handler = self.handlers.get(&node.class_type)?;
        handler
          .check(&node.inputs)
          .err()
          .map(|reason| UnsupportedNode {
            node_id: node.id.clone(),
            class_type: node.class_type.clone(),
            reason,
          })
      })
      .collect();

    if nodes.is_empty() {
      Ok(())
    } else {
      Err(ScanError::UnsupportedNodes { nodes })
    }
  }

  /// Assets every installed handler needs regardless of any graph.
  ///
  /// Ordered by node type name so the result is deterministic.
  pub fn preload_requirements(&self) -> RequirementSet {
    let mut found = RequirementSet::new();
    for class_type in self.handlers.class_types() {
      if let Some(handler) = self.handlers.get(class_type) {
        found.extend(handler.preload());
      }
    }
    found
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use mordant_config::{AssetId, AssetSource, NodeInputs};

  fn scanner(table: HandlerTable) -> Scanner {
    Scanner::new(Arc::new(table))
  }

  fn ids(set: &RequirementSet) -> Vec<AssetId> {
    set.iter().map(|r| r.id.clone()).collect()
  }

  #[test]
  fn test_literal_role_fields() {
    let graph = WorkflowGraph::new()
      .with_node(NodeDef::new("4", "CheckpointLoaderSimple").with_input("ckpt_name", "base.safetensors"))
      .with_node(
        NodeDef::new("10", "LoraLoader")
          .with_input("lora_name", "detail.safetensors")
          .with_input("text", "not an asset"),
      );

    let found = scanner(HandlerTable::new()).scan(&graph);
    assert_eq!(
      ids(&found),
      vec![
        AssetId::new("checkpoints", "base.safetensors"),
        AssetId::new("loras", "detail.safetensors"),
      ]
    );
  }

  #[test]
  fn test_url_in_role_field_keeps_category() {
    let graph = WorkflowGraph::new().with_node(
      NodeDef::new("1", "VAELoader")
        .with_input("vae_name", "https://example.com/files/ae.safetensors"),
    );

    let found = scanner(HandlerTable::new()).scan(&graph);
    let req = &found.as_slice()[0];
    assert_eq!(req.id, AssetId::new("vae", "ae.safetensors"));
    assert!(matches!(req.source, AssetSource::DirectUrl(_)));
  }

  #[test]
  fn test_url_in_plain_field_uses_url_category() {
    let graph = WorkflowGraph::new().with_node(
      NodeDef::new("1", "DownloadAndLoad").with_input("source", "https://example.com/a/model.gguf"),
    );

    let found = scanner(HandlerTable::new()).scan(&graph);
    assert_eq!(ids(&found), vec![AssetId::new("downloads", "model.gguf")]);
  }

  #[test]
  fn test_non_text_inputs_are_ignored() {
    let mut node = NodeDef::new("1", "LoraLoader");
    node.inputs.insert(
      "lora_name".to_string(),
      InputValue::Link(mordant_config::NodeLink("2".to_string(), 0)),
    );
    node.inputs.insert(
      "strength_model".to_string(),
      serde_json::from_str("0.5").unwrap(),
    );
    let graph = WorkflowGraph::new().with_node(node);

    assert!(scanner(HandlerTable::new()).scan(&graph).is_empty());
  }

  #[test]
  fn test_handler_discovers_implicit_lora() {
    let table = HandlerTable::new().with_handler("WanVideoSampler", |_: &NodeInputs| {
      vec![AssetRequirement::named("loras", "lightx2v_rank64.safetensors")]
    });
    let graph = WorkflowGraph::new()
      .with_node(NodeDef::new("3", "WanVideoSampler").with_input("steps", "not-a-file"));

    let found = scanner(table).scan(&graph);
    assert_eq!(
      ids(&found),
      vec![AssetId::new("loras", "lightx2v_rank64.safetensors")]
    );
  }

  #[test]
  fn test_url_in_manifest_field_is_found_once() {
    let manifest = crate::HandlerManifest::from_json_str(
      r#"{ "WanVideoModelLoader": { "fields": { "model": "unet" } } }"#,
    )
    .unwrap();
    let graph = WorkflowGraph::new().with_node(
      NodeDef::new("1", "WanVideoModelLoader")
        .with_input("model", "https://huggingface.co/o/r/resolve/main/wan.gguf"),
    );

    let found = scanner(manifest.into_table()).scan(&graph);
    assert_eq!(ids(&found), vec![AssetId::new("unet", "wan.gguf")]);
    assert!(matches!(found.as_slice()[0].source, AssetSource::DirectUrl(_)));
  }

  #[test]
  fn test_handler_field_role_overrides_default_roles() {
    struct VaeAsUnet;
    impl crate::NodeHandler for VaeAsUnet {
      fn discover(&self, _inputs: &NodeInputs) -> Vec<AssetRequirement> {
        Vec::new()
      }

      fn field_category(&self, field: &str) -> Option<&str> {
        (field == "vae_name").then_some("unet")
      }
    }

    let graph = WorkflowGraph::new()
      .with_node(NodeDef::new("1", "VAELoader").with_input("vae_name", "wan.gguf"));
    let found = scanner(HandlerTable::new().with_handler("VAELoader", VaeAsUnet)).scan(&graph);
    assert_eq!(ids(&found), vec![AssetId::new("unet", "wan.gguf")]);
  }

  #[test]
  fn test_unknown_node_type_is_not_an_error() {
    let graph = WorkflowGraph::new().with_node(NodeDef::new("1", "BrandNewNode"));
    let scanner = scanner(HandlerTable::new());
    assert!(scanner.scan(&graph).is_empty());
    assert!(scanner.check_supported(&graph).is_ok());
  }

  #[test]
  fn test_same_asset_from_three_nodes_collapses() {
    let graph = WorkflowGraph::new()
      .with_node(NodeDef::new("1", "LoraLoader").with_input("lora_name", "shared.safetensors"))
      .with_node(NodeDef::new("2", "LoraLoader").with_input("lora_name", "shared.safetensors"))
      .with_node(
        NodeDef::new("3", "LoraLoaderModelOnly").with_input("lora_name", "shared.safetensors"),
      );

    let found = scanner(HandlerTable::new()).scan(&graph);
    assert_eq!(found.len(), 1);
  }

  #[test]
  fn test_check_supported_reports_every_node() {
    let manifest = crate::HandlerManifest::from_json_str(
      r#"{ "Sampler": { "unsupported": { "mode": ["legacy"] } } }"#,
    )
    .unwrap();
    let graph = WorkflowGraph::new()
      .with_node(NodeDef::new("1", "Sampler").with_input("mode", "legacy"))
      .with_node(NodeDef::new("2", "Sampler").with_input("mode", "fast"))
      .with_node(NodeDef::new("3", "Sampler").with_input("mode", "legacy"));

    match scanner(manifest.into_table()).check_supported(&graph) {
      Err(ScanError::UnsupportedNodes { nodes }) => {
        let ids: Vec<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
      }
      other => panic!("expected UnsupportedNodes, got {:?}", other),
    }
  }

  #[test]
  fn test_preload_requirements_sorted_by_type() {
    let manifest = crate::HandlerManifest::from_json_str(
      r#"{
        "Zeta": { "preload": [{ "category": "vae", "name": "z.safetensors" }] },
        "Alpha": { "preload": [{ "category": "vae", "name": "a.safetensors" }] }
      }"#,
    )
    .unwrap();
    let found = scanner(manifest.into_table()).preload_requirements();
    assert_eq!(
      ids(&found),
      vec![
        AssetId::new("vae", "a.safetensors"),
        AssetId::new("vae", "z.safetensors"),
      ]
    );
  }
}
