use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use tracing::debug;
use url::Url;

use crate::{FetchError, Fetcher, RemoteBody};

/// HTTP(S) fetcher backed by `reqwest`.
///
/// Redirects are followed (model hosts commonly redirect to a CDN). A bearer
/// token, if configured, is only sent to the hosts it was issued for.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  auth: Option<BearerAuth>,
}

#[derive(Debug, Clone)]
struct BearerAuth {
  value: HeaderValue,
  hosts: Vec<String>,
}

impl BearerAuth {
  fn applies_to(&self, url: &Url) -> bool {
    url
      .host_str()
      .is_some_and(|host| self.hosts.iter().any(|h| h.eq_ignore_ascii_case(host)))
  }
}

impl HttpFetcher {
  pub fn new() -> Result<Self, FetchError> {
    Ok(Self {
      client: Self::client()?,
      auth: None,
    })
  }

  /// Create a fetcher that authenticates with `Authorization: Bearer <token>`
  /// against `hosts`. Requests to any other host carry no token.
  pub fn with_bearer_token<I, S>(token: &str, hosts: I) -> Result<Self, FetchError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
      .map_err(|e| FetchError::Transport(format!("invalid auth token: {}", e)))?;
    value.set_sensitive(true);

    Ok(Self {
      client: Self::client()?,
      auth: Some(BearerAuth {
        value,
        hosts: hosts.into_iter().map(Into::into).collect(),
      }),
    })
  }

  fn client() -> Result<reqwest::Client, FetchError> {
    Ok(
      reqwest::Client::builder()
        .user_agent(concat!("mordant/", env!("CARGO_PKG_VERSION")))
        .build()?,
    )
  }
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn open(&self, url: &Url) -> Result<RemoteBody, FetchError> {
    let mut request = self.client.get(url.clone());
    if let Some(auth) = &self.auth
      && auth.applies_to(url)
    {
      request = request.header(AUTHORIZATION, auth.value.clone());
    }
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
      return Err(FetchError::Status {
        url: url.to_string(),
        status: status.as_u16(),
      });
    }

    let total = response.content_length();
    debug!(url = %url, total = ?total, "remote accepted request");

    let stream = response.bytes_stream().map(|r| r.map_err(FetchError::Http));
    Ok(RemoteBody {
      total,
      stream: Box::pin(stream),
    })
  }
}
