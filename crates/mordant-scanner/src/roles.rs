//! Asset-carrying input fields.
//!
//! Graph authors name weights through conventionally named input fields
//! (`ckpt_name`, `lora_name`, `vae_name`, ...). A field's role decides which
//! registry category a file name found there belongs to.

use std::collections::HashMap;
use std::path::Path;

use mordant_config::AssetRequirement;
use url::Url;

/// Category used for URL-valued inputs in fields with no known role.
pub const DEFAULT_URL_CATEGORY: &str = "downloads";

const GLOBAL_ROLES: &[(&str, &str)] = &[
  ("ckpt_name", "checkpoints"),
  ("lora_name", "loras"),
  ("vae_name", "vae"),
  ("unet_name", "unet"),
  ("clip_name", "text_encoders"),
  ("clip_name1", "text_encoders"),
  ("clip_name2", "text_encoders"),
  ("clip_name3", "text_encoders"),
  ("control_net_name", "controlnet"),
  ("style_model_name", "style_models"),
  ("gligen_name", "gligen"),
  ("hypernetwork_name", "hypernetworks"),
  ("upscale_model_name", "upscale_models"),
];

const CLASS_ROLES: &[(&str, &str, &str)] = &[
  ("UpscaleModelLoader", "model_name", "upscale_models"),
  ("CLIPVisionLoader", "clip_name", "clip_vision"),
  ("UnetLoaderGGUF", "unet_name", "unet"),
];

/// Field name -> category table.
///
/// Class-specific roles take precedence over global ones, so a generic field
/// like `model_name` can be an asset for one node type and plain text for
/// another.
#[derive(Debug, Clone)]
pub struct FieldRoles {
  global: HashMap<String, String>,
  per_class: HashMap<(String, String), String>,
  url_category: String,
}

impl Default for FieldRoles {
  fn default() -> Self {
    let mut roles = Self::empty();
    for (field, category) in GLOBAL_ROLES {
      roles.add_global(*field, *category);
    }
    for (class_type, field, category) in CLASS_ROLES {
      roles.add_for_class(*class_type, *field, *category);
    }
    roles
  }
}

impl FieldRoles {
  /// A table with no roles at all.
  pub fn empty() -> Self {
    Self {
      global: HashMap::new(),
      per_class: HashMap::new(),
      url_category: DEFAULT_URL_CATEGORY.to_string(),
    }
  }

  pub fn add_global(&mut self, field: impl Into<String>, category: impl Into<String>) {
    self.global.insert(field.into(), category.into());
  }

  pub fn add_for_class(
    &mut self,
    class_type: impl Into<String>,
    field: impl Into<String>,
    category: impl Into<String>,
  ) {
    self
      .per_class
      .insert((class_type.into(), field.into()), category.into());
  }

  /// Category for URLs found in fields with no role.
  pub fn with_url_category(mut self, category: impl Into<String>) -> Self {
    self.url_category = category.into();
    self
  }

  pub fn url_category(&self) -> &str {
    &self.url_category
  }

  /// The category a field carries for a given node type, if any.
  pub fn category_for(&self, class_type: &str, field: &str) -> Option<&str> {
    self
      .per_class
      .get(&(class_type.to_string(), field.to_string()))
      .or_else(|| self.global.get(field))
      .map(String::as_str)
  }
}

/// Parse `value` as a remote http(s) URL.
pub fn parse_remote_url(value: &str) -> Option<Url> {
  let (scheme, _) = value.split_once("://")?;
  if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
    return None;
  }
  Url::parse(value).ok().filter(|u| u.host_str().is_some())
}

/// Whether `value` plausibly names a file: non-empty, no surrounding
/// whitespace, and a short alphanumeric extension.
pub fn is_filename_like(value: &str) -> bool {
  if value.is_empty() || value.trim() != value || value.contains('\n') {
    return false;
  }
  Path::new(value)
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| {
      !ext.is_empty() && ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric())
    })
}

/// Classify a text value found in a field that carries `category`.
///
/// URLs become direct-URL requirements; file names become named ones;
/// anything else (e.g. `"None"`, free text) yields nothing.
pub fn classify_text(category: &str, value: &str) -> Option<AssetRequirement> {
  if let Some(url) = parse_remote_url(value) {
    return AssetRequirement::from_url(category, url);
  }
  if is_filename_like(value) {
    return Some(AssetRequirement::named(category, value));
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use mordant_config::AssetSource;

  #[test]
  fn test_default_roles() {
    let roles = FieldRoles::default();
    assert_eq!(roles.category_for("LoraLoader", "lora_name"), Some("loras"));
    assert_eq!(
      roles.category_for("UpscaleModelLoader", "model_name"),
      Some("upscale_models")
    );
    assert_eq!(roles.category_for("SomethingElse", "model_name"), None);
    assert_eq!(
      roles.category_for("CLIPVisionLoader", "clip_name"),
      Some("clip_vision")
    );
    assert_eq!(
      roles.category_for("CLIPLoader", "clip_name"),
      Some("text_encoders")
    );
  }

  #[test]
  fn test_filename_like() {
    assert!(is_filename_like("model.safetensors"));
    assert!(is_filename_like("SDXL/detail.safetensors"));
    assert!(is_filename_like("RealESRGAN_x2.pth"));
    assert!(!is_filename_like("None"));
    assert!(!is_filename_like(""));
    assert!(!is_filename_like(" model.safetensors"));
    assert!(!is_filename_like("a photo of a cat."));
  }

  #[test]
  fn test_parse_remote_url() {
    assert!(parse_remote_url("https://example.com/a.bin").is_some());
    assert!(parse_remote_url("HTTPS://example.com/a.bin").is_some());
    assert!(parse_remote_url("ftp://example.com/a.bin").is_none());
    assert!(parse_remote_url("https://").is_none());
    assert!(parse_remote_url("model.safetensors").is_none());
  }

  #[test]
  fn test_parse_remote_url_with_non_ascii_host() {
    let url = parse_remote_url("http://ü.example/x.bin").unwrap();
    assert!(url.host_str().is_some_and(|h| h.starts_with("xn--")));

    let direct = classify_text("downloads", "http://ü.example/x.bin").unwrap();
    assert_eq!(direct.id.name, "x.bin");
  }

  #[test]
  fn test_classify_text() {
    let named = classify_text("loras", "detail.safetensors").unwrap();
    assert_eq!(named.source, AssetSource::Named);

    let direct = classify_text("loras", "https://example.com/loras/x.safetensors").unwrap();
    assert_eq!(direct.id.name, "x.safetensors");
    assert!(direct.url().is_some());

    assert!(classify_text("loras", "None").is_none());
  }
}
