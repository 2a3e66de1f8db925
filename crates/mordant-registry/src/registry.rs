use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use mordant_config::{AssetId, AssetRequirement, AssetSource};
use tokio::fs;
use tracing::debug;

use crate::error::{Rejection, RegistryError};
use crate::policy::UrlPolicy;

/// The set of assets sanctioned for use, partitioned by category.
///
/// Loaded once at process start from a JSON artifact shaped like:
///
/// ```json
/// {
///   "checkpoints": ["sd_xl_base_1.0.safetensors"],
///   "loras": ["detail_tweaker.safetensors", "lightx2v_rank64.safetensors"]
/// }
/// ```
///
/// The registry is read-only once built; editing it is an administrative act
/// done outside the engine.
#[derive(Debug, Clone, Default)]
pub struct Registry {
  categories: HashMap<String, BTreeSet<String>>,
  url_policy: UrlPolicy,
}

impl Registry {
  /// Build a registry from a category -> names mapping.
  pub fn new<C, N, S>(categories: C) -> Result<Self, RegistryError>
  where
    C: IntoIterator<Item = (S, N)>,
    N: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut map: HashMap<String, BTreeSet<String>> = HashMap::new();
    for (category, names) in categories {
      let category = category.into();
      let entry = map.entry(category.clone()).or_default();
      for name in names {
        let id = AssetId::new(category.clone(), name);
        id.check_path_safe()
          .map_err(|message| RegistryError::InvalidEntry {
            entry: id.to_string(),
            message,
          })?;
        entry.insert(id.name);
      }
    }
    Ok(Self {
      categories: map,
      url_policy: UrlPolicy::default(),
    })
  }

  /// Parse a registry from its JSON form.
  pub fn from_json_str(json: &str) -> Result<Self, RegistryError> {
    let raw: HashMap<String, Vec<String>> = serde_json::from_str(json)?;
    Self::new(raw)
  }

  /// Load a registry from a JSON file.
  pub async fn load(path: &Path) -> Result<Self, RegistryError> {
    let content = fs::read_to_string(path).await?;
    let registry = Self::from_json_str(&content)?;
    debug!(
      path = %path.display(),
      categories = registry.categories.len(),
      "loaded asset registry"
    );
    Ok(registry)
  }

  /// Replace the policy applied to direct-URL requirements.
  pub fn with_url_policy(mut self, policy: UrlPolicy) -> Self {
    self.url_policy = policy;
    self
  }

  pub fn url_policy(&self) -> &UrlPolicy {
    &self.url_policy
  }

  /// Check a requirement against the trust boundary.
  ///
  /// Named requirements must be listed under their category. Direct-URL
  /// requirements skip the name check but must satisfy the URL policy.
  pub fn validate(&self, req: &AssetRequirement) -> Result<(), Rejection> {
    match &req.source {
      AssetSource::Named => {
        if self.contains(&req.id) {
          Ok(())
        } else {
          Err(Rejection::Unregistered {
            category: req.id.category.clone(),
            name: req.id.name.clone(),
            sanctioned: self.sanctioned(&req.id.category),
          })
        }
      }
      AssetSource::DirectUrl(url) => {
        if self.url_policy.permits(url) {
          Ok(())
        } else {
          Err(Rejection::DisallowedSource {
            url: url.to_string(),
            host: url.host_str().unwrap_or_default().to_string(),
          })
        }
      }
    }
  }

  /// Whether the identity is sanctioned.
  pub fn contains(&self, id: &AssetId) -> bool {
    self
      .categories
      .get(&id.category)
      .is_some_and(|names| names.contains(&id.name))
  }

  /// Sanctioned names for a category, sorted. Empty for unknown categories.
  pub fn sanctioned(&self, category: &str) -> Vec<String> {
    self
      .categories
      .get(category)
      .map(|names| names.iter().cloned().collect())
      .unwrap_or_default()
  }

  /// All known categories, sorted.
  pub fn categories(&self) -> Vec<&str> {
    let mut categories: Vec<&str> = self.categories.keys().map(String::as_str).collect();
    categories.sort_unstable();
    categories
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  const REGISTRY: &str = r#"{
    "loras": ["b.safetensors", "a.safetensors"],
    "vae": ["ae.safetensors"]
  }"#;

  #[test]
  fn test_named_member_validates() {
    let registry = Registry::from_json_str(REGISTRY).unwrap();
    let req = AssetRequirement::named("loras", "a.safetensors");
    assert_eq!(registry.validate(&req), Ok(()));
  }

  #[test]
  fn test_named_non_member_lists_sanctioned() {
    let registry = Registry::from_json_str(REGISTRY).unwrap();
    let req = AssetRequirement::named("loras", "evil.safetensors");
    assert_eq!(
      registry.validate(&req),
      Err(Rejection::Unregistered {
        category: "loras".to_string(),
        name: "evil.safetensors".to_string(),
        sanctioned: vec!["a.safetensors".to_string(), "b.safetensors".to_string()],
      })
    );
  }

  #[test]
  fn test_named_in_wrong_category_is_rejected() {
    let registry = Registry::from_json_str(REGISTRY).unwrap();
    let req = AssetRequirement::named("vae", "a.safetensors");
    assert!(matches!(
      registry.validate(&req),
      Err(Rejection::Unregistered { .. })
    ));
  }

  #[test]
  fn test_unknown_category_has_empty_sanctioned_list() {
    let registry = Registry::from_json_str(REGISTRY).unwrap();
    let req = AssetRequirement::named("controlnet", "canny.safetensors");
    match registry.validate(&req) {
      Err(Rejection::Unregistered { sanctioned, .. }) => assert!(sanctioned.is_empty()),
      other => panic!("expected Unregistered, got {:?}", other),
    }
  }

  #[test]
  fn test_direct_url_bypasses_name_check() {
    let registry = Registry::from_json_str(REGISTRY).unwrap();
    let url = Url::parse("https://example.com/unet/model.gguf").unwrap();
    let req = AssetRequirement::from_url("unet", url).unwrap();
    assert_eq!(registry.validate(&req), Ok(()));
  }

  #[test]
  fn test_direct_url_policy_rejects_host() {
    let registry = Registry::from_json_str(REGISTRY)
      .unwrap()
      .with_url_policy(UrlPolicy::allow_hosts(["huggingface.co"]));
    let url = Url::parse("https://example.com/unet/model.gguf").unwrap();
    let req = AssetRequirement::from_url("unet", url).unwrap();
    match registry.validate(&req) {
      Err(Rejection::DisallowedSource { host, .. }) => assert_eq!(host, "example.com"),
      other => panic!("expected DisallowedSource, got {:?}", other),
    }
  }

  #[test]
  fn test_rejects_path_traversal_entries() {
    let result = Registry::from_json_str(r#"{ "loras": ["../../etc/passwd"] }"#);
    assert!(matches!(result, Err(RegistryError::InvalidEntry { .. })));
  }

  #[test]
  fn test_categories_sorted() {
    let registry = Registry::from_json_str(REGISTRY).unwrap();
    assert_eq!(registry.categories(), vec!["loras", "vae"]);
  }

  #[tokio::test]
  async fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    std::fs::write(&path, REGISTRY).unwrap();

    let registry = Registry::load(&path).await.unwrap();
    assert!(registry.contains(&AssetId::new("vae", "ae.safetensors")));
  }

  #[tokio::test]
  async fn test_load_missing_file() {
    let result = Registry::load(Path::new("/nonexistent/registry.json")).await;
    assert!(matches!(result, Err(RegistryError::Io(_))));
  }
}
