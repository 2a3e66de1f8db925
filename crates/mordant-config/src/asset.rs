//! Asset identities and requirements.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Identity of an asset: its category plus its name within that category.
///
/// Two requirements with the same identity are the same asset, regardless of
/// where they were discovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId {
  /// Coarse role of the asset, e.g. "loras" or "vae".
  pub category: String,
  /// File name within the category, e.g. "detail_tweaker.safetensors".
  pub name: String,
}

impl AssetId {
  pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      category: category.into(),
      name: name.into(),
    }
  }

  /// Check that the identity maps to a path inside a cache root.
  ///
  /// The category must be a single non-hidden path component. The name may
  /// contain `/`-separated subdirectories, but no empty or dot-prefixed
  /// components (this covers `.` and `..`) and no backslashes.
  pub fn check_path_safe(&self) -> Result<(), String> {
    let category = &self.category;
    if category.is_empty()
      || category.starts_with('.')
      || category.contains(['/', '\\'])
    {
      return Err(format!("invalid category '{}'", category));
    }
    if self.name.is_empty() || self.name.contains('\\') {
      return Err(format!("invalid asset name '{}'", self.name));
    }
    // Dot-prefixed names are reserved for the cache's temp files.
    for component in self.name.split('/') {
      if component.is_empty() || component.starts_with('.') {
        return Err(format!("invalid asset name '{}'", self.name));
      }
    }
    Ok(())
  }
}

impl fmt::Display for AssetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.category, self.name)
  }
}

/// Where the bytes for an asset come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
  /// Resolve via the registry and the default remote layout.
  Named,
  /// Explicit remote location supplied in the graph. Bypasses registry
  /// membership checks.
  DirectUrl(Url),
}

/// A single asset the workflow needs before it can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RequirementDef", into = "RequirementDef")]
pub struct AssetRequirement {
  pub id: AssetId,
  pub source: AssetSource,
}

impl AssetRequirement {
  pub fn named(category: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: AssetId::new(category, name),
      source: AssetSource::Named,
    }
  }

  /// Build a direct-URL requirement, deriving the asset name from the last
  /// path segment of the URL.
  ///
  /// Returns `None` when the URL has no usable file name
  /// (e.g. `https://example.com/`).
  pub fn from_url(category: impl Into<String>, url: Url) -> Option<Self> {
    let name = url
      .path_segments()
      .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
      .map(str::to_string)?;
    Some(Self {
      id: AssetId::new(category, name),
      source: AssetSource::DirectUrl(url),
    })
  }

  /// The explicit URL, if this requirement carries one.
  pub fn url(&self) -> Option<&Url> {
    match &self.source {
      AssetSource::DirectUrl(url) => Some(url),
      AssetSource::Named => None,
    }
  }
}

/// Flat, serializable form of a requirement:
/// `{ "category": "...", "name": "...", "url": "..." }`.
///
/// Used by handler manifests and the CLI's scan output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementDef {
  pub category: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<Url>,
}

impl From<RequirementDef> for AssetRequirement {
  fn from(def: RequirementDef) -> Self {
    let source = match def.url {
      Some(url) => AssetSource::DirectUrl(url),
      None => AssetSource::Named,
    };
    Self {
      id: AssetId::new(def.category, def.name),
      source,
    }
  }
}

impl From<AssetRequirement> for RequirementDef {
  fn from(req: AssetRequirement) -> Self {
    let url = match req.source {
      AssetSource::DirectUrl(url) => Some(url),
      AssetSource::Named => None,
    };
    Self {
      category: req.id.category,
      name: req.id.name,
      url,
    }
  }
}

/// An insertion-ordered set of requirements, de-duplicated by [`AssetId`].
///
/// The first requirement seen for an identity wins; later duplicates are
/// dropped. Iteration order is discovery order.
#[derive(Debug, Clone, Default)]
pub struct RequirementSet {
  items: Vec<AssetRequirement>,
  seen: HashSet<AssetId>,
}

impl RequirementSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert a requirement. Returns `false` if its identity was already present.
  pub fn insert(&mut self, req: AssetRequirement) -> bool {
    if self.seen.contains(&req.id) {
      return false;
    }
    self.seen.insert(req.id.clone());
    self.items.push(req);
    true
  }

  pub fn contains(&self, id: &AssetId) -> bool {
    self.seen.contains(id)
  }

  pub fn iter(&self) -> std::slice::Iter<'_, AssetRequirement> {
    self.items.iter()
  }

  pub fn as_slice(&self) -> &[AssetRequirement] {
    &self.items
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn into_vec(self) -> Vec<AssetRequirement> {
    self.items
  }
}

impl Extend<AssetRequirement> for RequirementSet {
  fn extend<T: IntoIterator<Item = AssetRequirement>>(&mut self, iter: T) {
    for req in iter {
      self.insert(req);
    }
  }
}

impl FromIterator<AssetRequirement> for RequirementSet {
  fn from_iter<T: IntoIterator<Item = AssetRequirement>>(iter: T) -> Self {
    let mut set = Self::new();
    set.extend(iter);
    set
  }
}

impl<'a> IntoIterator for &'a RequirementSet {
  type Item = &'a AssetRequirement;
  type IntoIter = std::slice::Iter<'a, AssetRequirement>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_path_safety() {
    assert!(AssetId::new("loras", "a.safetensors").check_path_safe().is_ok());
    assert!(AssetId::new("loras", "SDXL/a.safetensors").check_path_safe().is_ok());
    assert!(AssetId::new("loras", "../a.safetensors").check_path_safe().is_err());
    assert!(AssetId::new("loras", "/etc/passwd").check_path_safe().is_err());
    assert!(AssetId::new("loras", "a//b").check_path_safe().is_err());
    assert!(AssetId::new(".mordant", "a").check_path_safe().is_err());
    assert!(AssetId::new("a/b", "c").check_path_safe().is_err());
    assert!(AssetId::new("", "c").check_path_safe().is_err());
  }

  #[test]
  fn test_hidden_names_are_not_path_safe() {
    assert!(AssetId::new("unet", ".wan.gguf.1234.part").check_path_safe().is_err());
    assert!(AssetId::new("loras", "SDXL/.hidden.safetensors").check_path_safe().is_err());
    assert!(AssetId::new("loras", "SDXL/v1.0.safetensors").check_path_safe().is_ok());
  }

  #[test]
  fn test_from_url_uses_last_segment() {
    let url = Url::parse(
      "https://huggingface.co/Comfy-Org/Wan_2.1/resolve/main/split_files/vae/wan_2.1_vae.safetensors?download=true",
    )
    .unwrap();
    let req = AssetRequirement::from_url("vae", url.clone()).unwrap();
    assert_eq!(req.id, AssetId::new("vae", "wan_2.1_vae.safetensors"));
    assert_eq!(req.url(), Some(&url));
  }

  #[test]
  fn test_from_url_trailing_slash() {
    let url = Url::parse("https://example.com/models/vae/ae.safetensors/").unwrap();
    let req = AssetRequirement::from_url("vae", url).unwrap();
    assert_eq!(req.id.name, "ae.safetensors");
  }

  #[test]
  fn test_from_url_without_file_name() {
    let url = Url::parse("https://example.com/").unwrap();
    assert!(AssetRequirement::from_url("vae", url).is_none());
  }

  #[test]
  fn test_set_first_discovery_wins() {
    let url = Url::parse("https://example.com/loras/a.safetensors").unwrap();
    let mut set = RequirementSet::new();
    assert!(set.insert(AssetRequirement::named("loras", "a.safetensors")));
    assert!(!set.insert(AssetRequirement::from_url("loras", url).unwrap()));
    assert!(set.insert(AssetRequirement::named("vae", "a.safetensors")));

    assert_eq!(set.len(), 2);
    assert_eq!(set.as_slice()[0].source, AssetSource::Named);
  }

  #[test]
  fn test_requirement_json_shape() {
    let named: AssetRequirement =
      serde_json::from_str(r#"{"category":"loras","name":"a.safetensors"}"#).unwrap();
    assert_eq!(named, AssetRequirement::named("loras", "a.safetensors"));

    let direct: AssetRequirement = serde_json::from_str(
      r#"{"category":"unet","name":"x.gguf","url":"https://example.com/x.gguf"}"#,
    )
    .unwrap();
    assert!(direct.url().is_some());

    let json = serde_json::to_value(&named).unwrap();
    assert!(json.get("url").is_none());
  }
}
