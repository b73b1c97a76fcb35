//! REST API client: the baseline fetcher, the vote request, and the export
//! pass-through.
//!
//! The baseline fetch is the fallback and recount source for the stream:
//! its results enter the store through the same session channel the stream
//! feeds, never directly.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use floodwatch_core::types::{Report, VoteKind};

use crate::config::ClientConfig;
use crate::error::ClientError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Optional server-side feed filters, mapped to query parameters.
#[derive(Debug, Clone, Default)]
pub struct FeedFilter {
    pub hazard_type: Option<String>,
    pub urgency: Option<String>,
    pub location: Option<String>,
    pub verified_only: bool,
}

impl FeedFilter {
    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(hazard_type) = &self.hazard_type {
            query.push(("hazard_type", hazard_type.clone()));
        }
        if let Some(urgency) = &self.urgency {
            query.push(("urgency", urgency.clone()));
        }
        if let Some(location) = &self.location {
            query.push(("location", location.clone()));
        }
        if self.verified_only {
            query.push(("verified_only", "true".to_string()));
        }
        query
    }
}

/// Export format for the authority report dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(format!("invalid export format: {s} (expected json or csv)")),
        }
    }
}

/// The feed endpoint wraps its rows in a collection-named envelope; which
/// name depends on the route generation.
#[derive(Debug, Deserialize)]
struct PostsEnvelope {
    #[serde(alias = "reports", alias = "hotspots")]
    posts: Vec<Report>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Bearer-authenticated REST client. Cheap to clone; the underlying
/// connection pool is shared.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// One-shot full-collection fetch. Used for initial population before
    /// the stream's first snapshot, periodic fallback refresh, and the
    /// post-vote recount.
    pub async fn fetch_posts(&self, filter: &FeedFilter) -> Result<Vec<Report>, ClientError> {
        let url = self.config.endpoint("/posts");
        debug!(%url, "api: fetching posts");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.token)
            .query(&filter.to_query())
            .send()
            .await?;
        let response = Self::check(response).await?;
        let envelope: PostsEnvelope = response.json().await?;
        debug!(count = envelope.posts.len(), "api: posts fetched");
        Ok(envelope.posts)
    }

    /// Submit one vote. Returns only after the server has confirmed it;
    /// callers apply no local state until then.
    pub async fn cast_vote(&self, post_id: i64, kind: VoteKind) -> Result<(), ClientError> {
        let url = self.config.endpoint(&format!("/posts/{post_id}/vote"));
        debug!(%url, vote = %kind, "api: casting vote");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&serde_json::json!({ "vote_type": kind }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Opaque export pass-through: the body is returned verbatim and never
    /// reconciled into the store.
    pub async fn export_reports(&self, format: ExportFormat) -> Result<String, ClientError> {
        let url = self.config.endpoint("/auth/authority/reports/export");
        let response = self
            .http
            .get(&url)
            .query(&[("format", format.as_str()), ("token", self.config.token.as_str())])
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.text().await?)
    }

    /// Map non-success statuses onto the error taxonomy: 401/403 are auth
    /// rejections, anything else tries the server's `{"error": ...}` shape
    /// before falling back to the raw body.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ClientError::Auth {
                status: status.as_u16(),
            });
        }
        let body = response.text().await.unwrap_or_default();
        if let Ok(parsed) = serde_json::from_str::<ErrorBody>(&body) {
            return Err(ClientError::Rejected(parsed.error));
        }
        Err(ClientError::Unexpected {
            status: status.as_u16(),
            body,
        })
    }
}
