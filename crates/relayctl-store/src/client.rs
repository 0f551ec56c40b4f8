//! Backend client: connection settings and request plumbing shared by the
//! session and table layers.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use tracing::warn;

use crate::error::StoreError;
use crate::models::{Announcement, Chain, RelayNode, RelayRule, Tenant, Tunnel};
use crate::session::{AuthApi, SessionEvents};
use crate::table::TableClient;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to one backend project.
///
/// Cheap to clone; clones share the session state, so signing in through any
/// clone authenticates them all.
#[derive(Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    base: String,
    api_key: String,
    session: SessionEvents,
}

impl StoreClient {
    /// Connect to a backend project at `base_url` (scheme + host, no path)
    /// using its public API key.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Self::with_client(http, base_url, api_key)
    }

    /// Like [`StoreClient::new`] with a caller-provided [`reqwest::Client`]
    /// (custom timeouts, proxies).
    pub fn with_client(
        http: reqwest::Client,
        base_url: &str,
        api_key: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let base = base_url.trim_end_matches('/').to_string();
        let parsed: reqwest::Url = base
            .parse()
            .map_err(|_| StoreError::InvalidUrl(base_url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StoreError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            http,
            base,
            api_key: api_key.into(),
            session: SessionEvents::new(),
        })
    }

    /// Session state and change notifications.
    pub fn session(&self) -> &SessionEvents {
        &self.session
    }

    /// Auth endpoint: sign-in, sign-out, refresh.
    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.clone())
    }

    pub fn relay_nodes(&self) -> TableClient<RelayNode> {
        TableClient::new(self.clone(), "relay_nodes")
    }

    pub fn tunnels(&self) -> TableClient<Tunnel> {
        TableClient::new(self.clone(), "tunnels")
    }

    pub fn chains(&self) -> TableClient<Chain> {
        TableClient::new(self.clone(), "chains")
    }

    pub fn relay_rules(&self) -> TableClient<RelayRule> {
        TableClient::new(self.clone(), "relay_rules")
    }

    pub fn tenants(&self) -> TableClient<Tenant> {
        TableClient::new(self.clone(), "tenants")
    }

    pub fn announcements(&self) -> TableClient<Announcement> {
        TableClient::new(self.clone(), "announcements")
    }

    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base, table)
    }

    pub(crate) fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base, path)
    }

    /// Start a request with the project key attached. The bearer token is the
    /// signed-in access token, falling back to the key itself so anonymous
    /// requests still pass the backend's gateway.
    pub(crate) fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = match self.session.current() {
            Some(session) => session.access_token,
            None => self.api_key.clone(),
        };
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    /// Turn a non-success response into [`StoreError::Api`], preserving the
    /// backend's own message when the body carries one.
    pub(crate) async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or_else(|| {
            if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body.clone()
            }
        });
        warn!(status = status.as_u16(), %message, "backend request failed");
        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// Pull the human-readable message out of a backend error body. The table
/// API uses `message`, the auth API `msg` or `error_description`.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    for key in ["message", "msg", "error_description", "error"] {
        if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
            return Some(text.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            StoreClient::new("ftp://example.com", "key"),
            Err(StoreError::InvalidUrl(_))
        ));
        assert!(matches!(
            StoreClient::new("not a url", "key"),
            Err(StoreError::InvalidUrl(_))
        ));
    }

    #[test]
    fn trims_trailing_slashes_from_base() {
        let client = StoreClient::new("https://proj.example.com/", "key").unwrap();
        assert_eq!(
            client.rest_url("chains"),
            "https://proj.example.com/rest/v1/chains"
        );
        assert_eq!(
            client.auth_url("token"),
            "https://proj.example.com/auth/v1/token"
        );
    }

    #[test]
    fn extracts_backend_error_messages() {
        assert_eq!(
            error_message(r#"{"message":"row level security"}"#).as_deref(),
            Some("row level security")
        );
        assert_eq!(
            error_message(r#"{"error_description":"Invalid login credentials"}"#).as_deref(),
            Some("Invalid login credentials")
        );
        assert_eq!(error_message("not json"), None);
    }
}
