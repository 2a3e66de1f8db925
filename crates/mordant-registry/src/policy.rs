use url::Url;

/// Policy for direct-URL requirements.
///
/// Direct URLs skip the name registry, so this is the only gate they pass.
/// Only `http` and `https` are ever accepted. With an allow-list configured,
/// the host must equal an entry or be a subdomain of one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlPolicy {
  allowed_hosts: Option<Vec<String>>,
}

impl UrlPolicy {
  /// Accept any http(s) host.
  pub fn allow_all() -> Self {
    Self::default()
  }

  /// Accept only the given hosts (and their subdomains).
  pub fn allow_hosts<I, S>(hosts: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      allowed_hosts: Some(
        hosts
          .into_iter()
          .map(|h| h.into().to_ascii_lowercase())
          .collect(),
      ),
    }
  }

  pub fn permits(&self, url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
      return false;
    }
    let Some(host) = url.host_str() else {
      return false;
    };
    let host = host.to_ascii_lowercase();

    match &self.allowed_hosts {
      None => true,
      Some(allowed) => allowed.iter().any(|entry| {
        host == *entry
          || host
            .strip_suffix(entry.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
      }),
    }
  }
}
