//! The session loop: the single consumer that owns the store and the map
//! projection.
//!
//! Every mutation (stream snapshot, stream upsert, baseline fetch result)
//! arrives on one mpsc channel and is applied to completion before the next
//! is taken, so no two mutations ever interleave. Events are applied in
//! arrival order with no reconciliation priority between the baseline
//! fetcher and the stream: a fetch issued before a stream snapshot can
//! resolve after a later stream event and transiently regress state. That
//! last-writer-wins race is accepted; see DESIGN.md.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use floodwatch_core::message::StreamMessage;
use floodwatch_core::projection::{MapProjection, MarkerSurface};
use floodwatch_core::store::ReportStore;
use floodwatch_core::types::Report;

/// One unit of work for the session loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A decoded message from the push channel.
    Stream(StreamMessage),
    /// A full collection from the baseline fetcher (initial population,
    /// fallback refresh, or post-vote recount).
    Baseline(Vec<Report>),
}

/// Owns the store, the projection, and the marker surface for the lifetime
/// of one view session. Dropped wholesale at teardown.
pub struct Session {
    store: ReportStore,
    projection: MapProjection,
    surface: Box<dyn MarkerSurface + Send>,
    rx: mpsc::Receiver<SessionEvent>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(
        rx: mpsc::Receiver<SessionEvent>,
        surface: Box<dyn MarkerSurface + Send>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store: ReportStore::new(),
            projection: MapProjection::new(),
            surface,
            rx,
            cancel,
        }
    }

    /// Main event loop. Runs until cancelled or every sender is gone, then
    /// releases all markers.
    pub async fn run(&mut self) {
        info!("session: event loop started");
        loop {
            tokio::select! {
                event = self.rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("session: all senders closed, shutting down");
                            break;
                        }
                    }
                }
                _ = self.cancel.cancelled() => {
                    info!("session: cancellation requested, shutting down");
                    break;
                }
            }
        }
        let released = self.projection.clear(self.surface.as_mut());
        debug!(released, "session: markers released at teardown");
    }

    /// Apply one event to completion, then bring the map in line with the
    /// store. Unchanged applies (idempotent upsert re-delivery) skip the
    /// resync.
    pub fn handle_event(&mut self, event: SessionEvent) {
        let changed = match event {
            SessionEvent::Stream(StreamMessage::Snapshot(reports)) => {
                let outcome = self.store.apply_snapshot(reports);
                info!(
                    len = outcome.len,
                    duplicates_dropped = outcome.duplicates_dropped,
                    "session: stream snapshot applied"
                );
                true
            }
            SessionEvent::Stream(
                StreamMessage::Post(report) | StreamMessage::Hotspot(report),
            ) => {
                let id = report.id;
                let outcome = self.store.apply_upsert(report);
                debug!(id, ?outcome, "session: upsert applied");
                outcome.changed()
            }
            // The transport consumes keepalives; tolerate one anyway.
            SessionEvent::Stream(StreamMessage::Keepalive) => false,
            SessionEvent::Baseline(reports) => {
                let outcome = self.store.apply_snapshot(reports);
                info!(len = outcome.len, "session: baseline snapshot applied");
                true
            }
        };

        if changed {
            let outcome = self.projection.sync(self.store.reports(), self.surface.as_mut());
            debug!(
                placed = outcome.placed,
                updated = outcome.updated,
                removed = outcome.removed,
                skipped_no_geo = outcome.skipped_no_geo,
                "session: map synced"
            );
        }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Mutable store access, e.g. to register list-render listeners before
    /// the loop starts.
    pub fn store_mut(&mut self) -> &mut ReportStore {
        &mut self.store
    }

    pub fn projection(&self) -> &MapProjection {
        &self.projection
    }
}
