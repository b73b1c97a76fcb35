//! Client configuration.
//!
//! The auth token and viewer identity are injected here at construction
//! time and passed explicitly to every component that needs them; nothing
//! reads ambient session state.

/// Connection settings shared by the API client and the stream source.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `http://127.0.0.1:5000/api`.
    pub base_url: String,
    /// Bearer token for REST calls; passed as a query parameter on the
    /// stream, where header injection is unavailable.
    pub token: String,
    /// The viewer's user id, when known. Enables the local own-post vote
    /// guard; the server check remains authoritative either way.
    pub user_id: Option<i64>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            token: token.into(),
            user_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: Option<i64>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Absolute URL for an API path (`path` starts with `/`).
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// The SSE stream endpoint, without the token query parameter.
    pub fn stream_url(&self) -> String {
        self.endpoint("/posts/stream")
    }
}
