//! Error types for the client transports.

use thiserror::Error;

/// Errors surfaced by REST calls and vote coordination.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network-level failure (connect, timeout, body read).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// 401/403: the token is missing, expired, or insufficient. Never
    /// retried here; the session collaborator must re-authenticate.
    #[error("authentication rejected (status {status})")]
    Auth { status: u16 },

    /// A server-reported rejection, e.g. a self-vote. The message is shown
    /// to the user verbatim; no local state was mutated.
    #[error("{0}")]
    Rejected(String),

    /// Non-success status without a parseable `{"error": ...}` body.
    #[error("unexpected response (status {status}): {body}")]
    Unexpected { status: u16, body: String },

    /// Local own-post guard; mirrors the server's rejection message.
    #[error("Cannot vote on your own post")]
    OwnPost,
}

/// Errors terminating one stream connection attempt.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Auth rejections are terminal for the channel; no reconnect.
    #[error("stream authentication rejected (status {status})")]
    Auth { status: u16 },

    /// The peer sent more than `limit` bytes without an event boundary.
    /// Drops the connection; the normal reconnect path takes over.
    #[error("frame reassembly buffer exceeded {limit} bytes")]
    FrameOverflow { limit: usize },
}
