//! The push-channel message envelope.
//!
//! Every frame on the stream is a JSON object `{ "type": ..., "data": ... }`.
//! `snapshot` carries the full authoritative collection, `post` a single
//! entity to upsert, `keepalive` nothing at all. Anything else is a decode
//! error; the transport drops and logs it without disturbing the channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Report;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid stream frame: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// A decoded message from the post stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamMessage {
    /// Full-collection replace, in server display order.
    Snapshot(Vec<Report>),
    /// Single-entity upsert from the citizen post stream.
    Post(Report),
    /// Single-entity upsert from the authority hotspot stream. Same
    /// reconciliation semantics as `Post`; only the item kind differs.
    Hotspot(Report),
    /// Heartbeat emitted when the server has nothing to push. Consumed at
    /// the transport, never forwarded to the store.
    Keepalive,
}

/// Decode one frame payload. Unknown `type` tags and malformed JSON both
/// surface as [`MessageError::Invalid`].
pub fn decode_message(payload: &str) -> Result<StreamMessage, MessageError> {
    Ok(serde_json::from_str(payload)?)
}
