use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use mordant_config::{AssetRequirement, InputValue, NodeInputs};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::ScanError;
use crate::handler::{HandlerTable, NodeHandler};
use crate::roles::classify_text;

/// A handler described as data instead of code.
///
/// This is what the node installer writes out for node packs that don't need
/// custom discovery logic:
///
/// ```json
/// {
///   "fields": { "high_noise_model": "unet", "low_noise_model": "unet" },
///   "requires": [{ "category": "vae", "name": "wan_2.1_vae.safetensors" }],
///   "preload": [{
///     "category": "loras",
///     "name": "lightx2v_rank64.safetensors",
///     "url": "https://huggingface.co/Kijai/WanVideo_comfy/resolve/main/lightx2v_rank64.safetensors"
///   }],
///   "unsupported": { "attention_mode": ["sageattn"] }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclaredHandler {
  /// Extra asset-carrying input fields for this node type: field -> category.
  pub fields: BTreeMap<String, String>,

  /// Assets needed by every node of this type.
  pub requires: Vec<AssetRequirement>,

  /// Assets needed as soon as the node pack is installed.
  pub preload: Vec<AssetRequirement>,

  /// Input values this node type cannot run with: field -> rejected values.
  pub unsupported: BTreeMap<String, Vec<String>>,
}

impl NodeHandler for DeclaredHandler {
  fn discover(&self, inputs: &NodeInputs) -> Vec<AssetRequirement> {
    let from_fields = self.fields.iter().filter_map(|(field, category)| {
      inputs
        .get(field)
        .and_then(InputValue::as_str)
        .and_then(|value| classify_text(category, value))
    });
    from_fields.chain(self.requires.iter().cloned()).collect()
  }

  fn preload(&self) -> Vec<AssetRequirement> {
    self.preload.clone()
  }

  fn field_category(&self, field: &str) -> Option<&str> {
    self.fields.get(field).map(String::as_str)
  }

  fn check(&self, inputs: &NodeInputs) -> Result<(), String> {
    for (field, rejected) in &self.unsupported {
      if let Some(value) = inputs.get(field).and_then(InputValue::as_str)
        && rejected.iter().any(|r| r == value)
      {
        return Err(format!("{} = '{}' is not supported", field, value));
      }
    }
    Ok(())
  }
}

/// A set of declared handlers keyed by node `class_type`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerManifest {
  pub handlers: HashMap<String, DeclaredHandler>,
}

impl HandlerManifest {
  pub fn from_json_str(json: &str) -> Result<Self, ScanError> {
    Ok(serde_json::from_str(json)?)
  }

  /// Load a manifest from a JSON file.
  pub async fn load(path: &Path) -> Result<Self, ScanError> {
    let content = fs::read_to_string(path).await?;
    Self::from_json_str(&content)
  }

  /// Register every declared handler into a table.
  pub fn into_table(self) -> HandlerTable {
    let mut table = HandlerTable::new();
    for (class_type, handler) in self.handlers {
      table.register(class_type, handler);
    }
    table
  }
}
