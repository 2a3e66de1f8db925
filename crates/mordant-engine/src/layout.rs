use mordant_config::{AssetRequirement, AssetSource};
use url::Url;

/// Maps requirements to the URL their bytes are fetched from.
///
/// Direct-URL requirements carry their own location. Named requirements use
/// `{base}/{category}/{name}`, or have no remote at all when no base is
/// configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteLayout {
  base: Option<Url>,
}

impl RemoteLayout {
  pub fn new(base: Option<Url>) -> Self {
    Self { base }
  }

  /// Layout rooted at `base`.
  pub fn from_base(base: &str) -> Result<Self, url::ParseError> {
    Ok(Self::new(Some(Url::parse(base)?)))
  }

  pub fn base(&self) -> Option<&Url> {
    self.base.as_ref()
  }

  pub fn locate(&self, req: &AssetRequirement) -> Option<Url> {
    match &req.source {
      AssetSource::DirectUrl(url) => Some(url.clone()),
      AssetSource::Named => {
        let mut url = self.base.clone()?;
        url
          .path_segments_mut()
          .ok()?
          .pop_if_empty()
          .push(&req.id.category)
          .extend(req.id.name.split('/'));
        Some(url)
      }
    }
  }
}
