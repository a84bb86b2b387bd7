//! Client configuration.

use std::time::Duration;

/// Configuration for the run protocol client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the document-processing backend.
    pub base_url: String,

    /// API key used when no user token is set.
    pub api_key: Option<String>,

    /// Bearer token for an authenticated user, if any.
    pub auth_token: Option<String>,

    /// Path of the server-sent event endpoint, joined to `base_url`.
    pub events_path: String,

    /// Timeout applied to the trigger request. The event stream itself is
    /// never timed out here; stalled-run policy belongs to the caller.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            api_key: None,
            auth_token: None,
            events_path: "/agui-sse".to_string(),
            request_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl ClientConfig {
    /// Create a config for the given backend.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_trailing_slash(base_url.into()),
            ..Self::default()
        }
    }

    /// Read `DOCRUN_BASE_URL` and `DOCRUN_API_KEY` from the environment,
    /// falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = match std::env::var("DOCRUN_BASE_URL") {
            Ok(url) => Self::new(url),
            Err(_) => Self::default(),
        };
        config.api_key = std::env::var("DOCRUN_API_KEY").ok();
        config
    }

    /// Builder method to set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Builder method to set a user auth token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Builder method to set the event endpoint path.
    pub fn with_events_path(mut self, path: impl Into<String>) -> Self {
        self.events_path = path.into();
        self
    }

    /// Builder method to set the trigger request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// The token to present as `Authorization: Bearer ...`, preferring a
    /// user token over the API key.
    pub fn bearer_token(&self) -> Option<&str> {
        self.auth_token.as_deref().or(self.api_key.as_deref())
    }

    /// Whether an authenticated user token is configured.
    pub fn is_authenticated(&self) -> bool {
        self.auth_token.is_some()
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trimmed() {
        let config = ClientConfig::new("http://localhost:5000/");
        assert_eq!(config.base_url, "http://localhost:5000");
    }

    #[test]
    fn test_bearer_prefers_auth_token() {
        let config = ClientConfig::new("http://x")
            .with_api_key("key")
            .with_auth_token("token");
        assert_eq!(config.bearer_token(), Some("token"));
        assert!(config.is_authenticated());
    }

    #[test]
    fn test_bearer_falls_back_to_api_key() {
        let config = ClientConfig::new("http://x").with_api_key("key");
        assert_eq!(config.bearer_token(), Some("key"));
        assert!(!config.is_authenticated());
    }
}
