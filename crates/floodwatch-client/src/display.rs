//! Terminal rendering of the feed and a logging marker surface for headless
//! runs.

use floodwatch_core::projection::{MarkerSpec, MarkerSurface};
use floodwatch_core::types::{Report, Urgency};
use tracing::info;

/// Urgency indicator symbols used in list output.
pub const INDICATOR_URGENT: &str = "▲";
pub const INDICATOR_CAUTION: &str = "◆";
pub const INDICATOR_SAFE: &str = "●";
pub const INDICATOR_UNCLASSIFIED: &str = "○";

pub fn urgency_indicator(urgency: Option<Urgency>) -> &'static str {
    match urgency {
        Some(Urgency::UrgentPanic) => INDICATOR_URGENT,
        Some(Urgency::AlertCaution) => INDICATOR_CAUTION,
        Some(Urgency::SafeNormal) => INDICATOR_SAFE,
        _ => INDICATOR_UNCLASSIFIED,
    }
}

/// One feed row: indicator, net score, title, location, status, timestamp.
pub fn format_report_line(report: &Report) -> String {
    let score = report.score();
    let sign = if score > 0 { "+" } else { "" };
    let location = report.location_name.as_deref().unwrap_or("no location");
    let status = report.status.as_deref().unwrap_or("processing");
    let when = report
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "time unknown".to_string());
    format!(
        "{} [{sign}{score}] {} | {} | {} | {when}",
        urgency_indicator(report.urgency),
        report.title,
        location,
        status,
    )
}

/// The whole feed, newest first as the store orders it.
pub fn format_feed(reports: &[Report]) -> String {
    if reports.is_empty() {
        return "no reports yet".to_string();
    }
    let mut out = format!("{} report(s)\n", reports.len());
    for report in reports {
        out.push_str(&format_report_line(report));
        out.push('\n');
    }
    out
}

/// Marker surface for headless sessions: marker lifecycle goes to the log
/// instead of a map widget.
#[derive(Debug, Default)]
pub struct LogSurface;

impl MarkerSurface for LogSurface {
    fn place(&mut self, spec: &MarkerSpec) {
        info!(
            id = spec.id,
            lat = spec.position.latitude,
            lon = spec.position.longitude,
            color = spec.color,
            title = %spec.title,
            "map: marker placed"
        );
    }

    fn update(&mut self, spec: &MarkerSpec) {
        info!(
            id = spec.id,
            lat = spec.position.latitude,
            lon = spec.position.longitude,
            "map: marker updated"
        );
    }

    fn remove(&mut self, id: i64) {
        info!(id, "map: marker removed");
    }
}
