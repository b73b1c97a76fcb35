//! The transport channel: a long-lived SSE subscription to the post stream.
//!
//! One connection per session. Frames are reassembled from the byte stream,
//! decoded, and forwarded in arrival order over the session channel; the
//! session loop is the single consumer, so store mutations never interleave.
//! Connection loss triggers reconnect with bounded exponential backoff;
//! malformed frames are dropped and logged without disturbing the channel;
//! auth rejections terminate the channel without retry.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use floodwatch_core::message::{StreamMessage, decode_message};

use crate::config::ClientConfig;
use crate::error::StreamError;
use crate::session::SessionEvent;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on buffered bytes awaiting an event boundary. A peer that
/// never sends a blank line gets disconnected instead of growing the buffer.
const MAX_FRAME_BYTES: usize = 1 << 20;

/// SSE source feeding the session loop.
pub struct PostStream {
    tx: mpsc::Sender<SessionEvent>,
    config: ClientConfig,
    http: reqwest::Client,
    cancel: CancellationToken,
}

impl PostStream {
    /// Build the stream source. Uses its own HTTP client: the subscription
    /// is long-lived, so only the connect phase gets a timeout.
    pub fn new(
        config: ClientConfig,
        tx: mpsc::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            tx,
            config,
            http,
            cancel,
        })
    }

    /// Connect and listen, reconnecting on failure with exponential backoff
    /// (3s doubling to a 60s cap; backoff resets on a successful
    /// connection; after 10 consecutive failures, logs drop to debug).
    ///
    /// Returns on cancellation, when the session receiver is gone, or with
    /// an error on auth rejection; that one is never retried.
    pub async fn run(&self) -> Result<(), StreamError> {
        const INITIAL_BACKOFF_SECS: u64 = 3;
        const MAX_BACKOFF_SECS: u64 = 60;
        const DEBUG_LOG_THRESHOLD: u32 = 10;

        let mut backoff_secs = INITIAL_BACKOFF_SECS;
        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("stream: cancellation requested, shutting down");
                    return Ok(());
                }
                result = self.connect_and_listen() => {
                    match result {
                        Ok(()) => {
                            info!("stream: connection closed");
                            backoff_secs = INITIAL_BACKOFF_SECS;
                            consecutive_failures = 0;
                        }
                        Err(StreamError::Auth { status }) => {
                            return Err(StreamError::Auth { status });
                        }
                        Err(e) => {
                            consecutive_failures = consecutive_failures.saturating_add(1);
                            if consecutive_failures >= DEBUG_LOG_THRESHOLD {
                                debug!(consecutive_failures, "stream: connection error: {e}");
                            } else {
                                warn!("stream: connection error: {e}");
                            }
                        }
                    }
                }
            }

            if self.tx.is_closed() {
                info!("stream: session receiver dropped, shutting down");
                return Ok(());
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("stream: cancellation during retry backoff");
                    return Ok(());
                }
                _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {
                    info!(
                        url = %self.config.stream_url(),
                        backoff_secs,
                        consecutive_failures,
                        "stream: reconnecting..."
                    );
                }
            }

            backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
        }
    }

    /// Single connection attempt: subscribe, then read frames until EOF,
    /// error, or cancellation.
    async fn connect_and_listen(&self) -> Result<(), StreamError> {
        let url = self.config.stream_url();
        let response = self
            .http
            .get(&url)
            .query(&[("token", self.config.token.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(StreamError::Auth {
                status: status.as_u16(),
            });
        }
        let response = response.error_for_status()?;
        info!(%url, "stream: connected");

        let mut body = Box::pin(response.bytes_stream());
        let mut buf: Vec<u8> = Vec::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Ok(());
                }
                chunk = body.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            buf.extend_from_slice(&bytes);
                            for payload in drain_frames(&mut buf) {
                                if !self.dispatch(&payload).await {
                                    return Ok(());
                                }
                            }
                            if buf.len() > MAX_FRAME_BYTES {
                                return Err(StreamError::FrameOverflow {
                                    limit: MAX_FRAME_BYTES,
                                });
                            }
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// Decode and forward one frame payload. Returns false when the session
    /// receiver is gone and the channel should wind down.
    async fn dispatch(&self, payload: &str) -> bool {
        match decode_message(payload) {
            Ok(StreamMessage::Keepalive) => {
                trace!("stream: keepalive");
                true
            }
            Ok(message) => self.tx.send(SessionEvent::Stream(message)).await.is_ok(),
            Err(e) => {
                warn!(error = %e, "stream: dropping malformed frame");
                true
            }
        }
    }
}

/// Extract complete SSE event payloads from the receive buffer, leaving any
/// trailing partial event in place. An event ends at a blank line; its
/// payload is the concatenation of the `data:` field lines. Field lines
/// other than `data:` (comments, event names) are ignored.
///
/// Line terminators may be LF, CRLF, or lone CR per the SSE grammar; the
/// buffer is normalized to LF before the boundary scan.
fn drain_frames(buf: &mut Vec<u8>) -> Vec<String> {
    normalize_newlines(buf);
    let mut payloads = Vec::new();
    while let Some(pos) = buf.windows(2).position(|w| w == b"\n\n") {
        let frame: Vec<u8> = buf.drain(..pos + 2).collect();
        let text = String::from_utf8_lossy(&frame);
        let mut data_lines = Vec::new();
        for line in text.lines() {
            if let Some(rest) = line.strip_prefix("data:") {
                data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
            }
        }
        if !data_lines.is_empty() {
            payloads.push(data_lines.join("\n"));
        }
    }
    payloads
}

/// Rewrite CRLF and lone CR terminators as LF. A trailing CR is kept as-is:
/// it may be the first half of a CRLF split across chunks, so it waits for
/// the next read.
fn normalize_newlines(buf: &mut Vec<u8>) {
    if !buf.contains(&b'\r') {
        return;
    }
    let tail_cr = buf.last() == Some(&b'\r');
    let upto = buf.len() - usize::from(tail_cr);
    let mut normalized = Vec::with_capacity(buf.len());
    let mut i = 0;
    while i < upto {
        if buf[i] == b'\r' {
            normalized.push(b'\n');
            if buf.get(i + 1) == Some(&b'\n') {
                i += 1;
            }
        } else {
            normalized.push(buf[i]);
        }
        i += 1;
    }
    if tail_cr {
        normalized.push(b'\r');
    }
    *buf = normalized;
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn push(buf: &mut Vec<u8>, s: &str) {
        buf.extend_from_slice(s.as_bytes());
    }

    #[test]
    fn drain_keeps_partial_event_buffered() {
        let mut buf = Vec::new();
        push(&mut buf, "data: {\"a\"");
        assert!(drain_frames(&mut buf).is_empty());
        push(&mut buf, ": 1}\n\ndata: tail");
        assert_eq!(drain_frames(&mut buf), vec!["{\"a\": 1}"]);
        assert_eq!(buf, b"data: tail");
    }

    #[test]
    fn drain_splits_multiple_events_in_one_chunk() {
        let mut buf = Vec::new();
        push(&mut buf, "data: one\n\ndata: two\n\n");
        assert_eq!(drain_frames(&mut buf), vec!["one", "two"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_ignores_non_data_field_lines() {
        let mut buf = Vec::new();
        push(&mut buf, ": comment\nevent: update\ndata: payload\n\n");
        assert_eq!(drain_frames(&mut buf), vec!["payload"]);
    }

    #[test]
    fn drain_joins_multi_line_data() {
        let mut buf = Vec::new();
        push(&mut buf, "data: line1\ndata: line2\n\n");
        assert_eq!(drain_frames(&mut buf), vec!["line1\nline2"]);
    }

    #[test]
    fn drain_tolerates_crlf_line_endings() {
        let mut buf = Vec::new();
        push(&mut buf, "data: payload\r\n\ndata: next\n\n");
        assert_eq!(drain_frames(&mut buf), vec!["payload", "next"]);
    }

    #[test]
    fn drain_handles_fully_crlf_framed_stream() {
        let mut buf = Vec::new();
        push(&mut buf, "data: one\r\n\r\ndata: two\r\n\r\n");
        assert_eq!(drain_frames(&mut buf), vec!["one", "two"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_handles_crlf_split_across_chunks() {
        let mut buf = Vec::new();
        // The chunk ends mid-CRLF; the trailing CR must wait for its LF.
        push(&mut buf, "data: payload\r");
        assert!(drain_frames(&mut buf).is_empty());
        push(&mut buf, "\n\r\n");
        assert_eq!(drain_frames(&mut buf), vec!["payload"]);
        assert!(buf.is_empty());
    }

    fn sse_body() -> String {
        [
            r#"data: {"type": "snapshot", "data": [{"id": 1, "title": "A"}, {"id": 2, "title": "B"}]}"#,
            "",
            "data: not json",
            "",
            r#"data: {"type": "keepalive"}"#,
            "",
            r#"data: {"type": "post", "data": {"id": 3, "title": "C"}}"#,
            "",
            "",
        ]
        .join("\n")
    }

    #[tokio::test]
    async fn stream_forwards_messages_in_order_and_drops_garbage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts/stream"))
            .and(query_param("token", "tok"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse_body(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::channel(16);
        let stream = PostStream::new(
            ClientConfig::new(server.uri(), "tok"),
            tx,
            CancellationToken::new(),
        )
        .unwrap();

        stream.connect_and_listen().await.unwrap();

        match rx.recv().await.unwrap() {
            SessionEvent::Stream(StreamMessage::Snapshot(reports)) => {
                assert_eq!(reports.len(), 2);
            }
            other => panic!("expected snapshot first, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            SessionEvent::Stream(StreamMessage::Post(report)) => assert_eq!(report.id, 3),
            other => panic!("expected post second, got {other:?}"),
        }
        // Malformed frame and keepalive were consumed, not forwarded.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn boundary_less_body_overflows_instead_of_buffering_forever() {
        let server = MockServer::start().await;
        let body = "a".repeat(MAX_FRAME_BYTES + 1024);
        Mock::given(method("GET"))
            .and(path("/posts/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let (tx, _rx) = mpsc::channel(16);
        let stream = PostStream::new(
            ClientConfig::new(server.uri(), "tok"),
            tx,
            CancellationToken::new(),
        )
        .unwrap();

        let err = stream.connect_and_listen().await.unwrap_err();
        assert!(matches!(err, StreamError::FrameOverflow { .. }));
    }

    #[tokio::test]
    async fn auth_rejection_is_terminal_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts/stream"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"error": "Invalid token"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (tx, _rx) = mpsc::channel(16);
        let stream = PostStream::new(
            ClientConfig::new(server.uri(), "expired"),
            tx,
            CancellationToken::new(),
        )
        .unwrap();

        let err = stream.run().await.unwrap_err();
        assert!(matches!(err, StreamError::Auth { status: 401 }));
    }

    #[tokio::test]
    async fn cancellation_stops_the_source() {
        let server = MockServer::start().await;
        // No mock mounted: a connect attempt would 404 and retry; the
        // pre-cancelled token must win first.
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stream =
            PostStream::new(ClientConfig::new(server.uri(), "tok"), tx, cancel).unwrap();

        stream.run().await.unwrap();
    }
}
