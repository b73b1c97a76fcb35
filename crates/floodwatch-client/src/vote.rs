//! Vote coordination: confirm-then-apply.
//!
//! Nothing local changes until the server confirms the vote. On success only
//! the caller's own per-post indicator is recorded; aggregate counts are
//! never computed here; the caller triggers a baseline refresh so the
//! server's tallies flow into the store through the usual snapshot path.

use std::collections::HashMap;

use tracing::info;

use floodwatch_core::types::{Report, VoteKind};

use crate::api::ApiClient;
use crate::error::ClientError;

pub struct VoteCoordinator {
    api: ApiClient,
    /// The viewer's confirmed vote per post id.
    votes: HashMap<i64, VoteKind>,
}

impl VoteCoordinator {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            votes: HashMap::new(),
        }
    }

    /// Cast a vote on a post, knowing its author when available.
    ///
    /// When the configured viewer id matches the author, refuses locally
    /// before any request goes out, a usability guard mirroring the
    /// server's own rejection, which stays authoritative. Any error leaves
    /// the indicator untouched.
    pub async fn cast(
        &mut self,
        post_id: i64,
        author: Option<i64>,
        kind: VoteKind,
    ) -> Result<VoteKind, ClientError> {
        if let (Some(author), Some(viewer)) = (author, self.api.config().user_id) {
            if author == viewer {
                return Err(ClientError::OwnPost);
            }
        }
        self.api.cast_vote(post_id, kind).await?;
        self.votes.insert(post_id, kind);
        info!(post_id, vote = %kind, "vote: confirmed by server");
        Ok(kind)
    }

    /// [`cast`](Self::cast) with the author taken from the report.
    pub async fn cast_on(
        &mut self,
        report: &Report,
        kind: VoteKind,
    ) -> Result<VoteKind, ClientError> {
        self.cast(report.id, report.user_id, kind).await
    }

    /// The viewer's confirmed vote on a post, if any. Drives the active
    /// state of the voting control.
    pub fn own_vote(&self, post_id: i64) -> Option<VoteKind> {
        self.votes.get(&post_id).copied()
    }
}
