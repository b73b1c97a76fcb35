//! Map projection: derives one marker per geolocated report from the store
//! contents and keeps rendered marker lifecycle in step with entity
//! lifecycle.
//!
//! Markers are keyed by report id and diffed against the previous sync
//! rather than rebuilt wholesale, so a single-item upsert touches a single
//! marker. The projection owns every marker it has placed; a marker whose
//! report leaves the geolocated set is removed in the same sync call, and
//! `clear` releases the rest at teardown.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::types::{Coordinates, Report, Urgency};

/// Everything a rendering surface needs to draw one marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    pub id: i64,
    pub position: Coordinates,
    pub title: String,
    pub color: &'static str,
    pub popup: String,
}

impl MarkerSpec {
    fn build(report: &Report, position: Coordinates) -> Self {
        Self {
            id: report.id,
            position,
            title: report.title.clone(),
            color: report.urgency.unwrap_or(Urgency::Unknown).color(),
            popup: popup_text(report),
        }
    }
}

/// Popup body shown when a marker is selected.
pub fn popup_text(report: &Report) -> String {
    let mut lines = vec![
        report.title.clone(),
        format!("Type: {}", report.flood_type.as_deref().unwrap_or("Unknown")),
        format!(
            "Urgency: {}",
            report.urgency.map(|u| u.as_str()).unwrap_or("Unknown")
        ),
        format!(
            "Location: {}",
            report.location_name.as_deref().unwrap_or("Unknown")
        ),
    ];
    if report.verified == Some(true) {
        lines.push("✓ Verified".to_string());
    }
    lines.join("\n")
}

/// Rendering backend the projection drives. Implementations hold the actual
/// drawn objects; the projection only ever addresses them by report id.
pub trait MarkerSurface {
    fn place(&mut self, spec: &MarkerSpec);
    fn update(&mut self, spec: &MarkerSpec);
    fn remove(&mut self, id: i64);
}

/// Statistics from one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub placed: usize,
    pub updated: usize,
    pub removed: usize,
    /// Markers left untouched because their report did not change.
    pub reused: usize,
    /// Reports excluded for lacking a valid coordinate pair.
    pub skipped_no_geo: usize,
}

struct Projected {
    report: Report,
    spec: MarkerSpec,
}

/// Id-keyed marker set derived from the store.
#[derive(Default)]
pub struct MapProjection {
    markers: HashMap<i64, Projected>,
}

impl MapProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the marker set in line with `reports`. After this returns, the
    /// projected set equals exactly the subset of `reports` with a valid
    /// coordinate pair.
    pub fn sync(&mut self, reports: &[Report], surface: &mut dyn MarkerSurface) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        let mut seen = HashSet::with_capacity(reports.len());

        for report in reports {
            let Some(position) = report.coordinates() else {
                outcome.skipped_no_geo += 1;
                continue;
            };
            if !seen.insert(report.id) {
                // Store guarantees unique ids; a duplicate here would mean
                // the caller bypassed it. Keep the first.
                continue;
            }
            match self.markers.entry(report.id) {
                Entry::Occupied(mut entry) => {
                    let existing = entry.get_mut();
                    if existing.report == *report {
                        outcome.reused += 1;
                    } else {
                        let spec = MarkerSpec::build(report, position);
                        surface.update(&spec);
                        existing.report = report.clone();
                        existing.spec = spec;
                        outcome.updated += 1;
                    }
                }
                Entry::Vacant(entry) => {
                    let spec = MarkerSpec::build(report, position);
                    surface.place(&spec);
                    entry.insert(Projected {
                        report: report.clone(),
                        spec,
                    });
                    outcome.placed += 1;
                }
            }
        }

        let stale: Vec<i64> = self
            .markers
            .keys()
            .copied()
            .filter(|id| !seen.contains(id))
            .collect();
        for id in stale {
            surface.remove(id);
            self.markers.remove(&id);
            outcome.removed += 1;
        }

        outcome
    }

    /// Resolve a surface selection (marker click) back to the projected
    /// report.
    pub fn select(&self, id: i64) -> Option<&Report> {
        self.markers.get(&id).map(|p| &p.report)
    }

    pub fn marker(&self, id: i64) -> Option<&MarkerSpec> {
        self.markers.get(&id).map(|p| &p.spec)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Remove every marker from the surface. Called at view teardown so no
    /// marker outlives the projection.
    pub fn clear(&mut self, surface: &mut dyn MarkerSurface) -> usize {
        let ids: Vec<i64> = self.markers.keys().copied().collect();
        for id in &ids {
            surface.remove(*id);
        }
        self.markers.clear();
        ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Surface that records lifecycle calls and mirrors the live marker set.
    #[derive(Default)]
    struct RecordingSurface {
        live: HashSet<i64>,
        events: Vec<String>,
    }

    impl MarkerSurface for RecordingSurface {
        fn place(&mut self, spec: &MarkerSpec) {
            assert!(self.live.insert(spec.id), "placed twice: {}", spec.id);
            self.events.push(format!("place {}", spec.id));
        }

        fn update(&mut self, spec: &MarkerSpec) {
            assert!(self.live.contains(&spec.id), "update of unplaced {}", spec.id);
            self.events.push(format!("update {}", spec.id));
        }

        fn remove(&mut self, id: i64) {
            assert!(self.live.remove(&id), "remove of unplaced {id}");
            self.events.push(format!("remove {id}"));
        }
    }

    fn geo(id: i64, lat: f64, lon: f64) -> Report {
        serde_json::from_str(&format!(
            r#"{{"id": {id}, "title": "r{id}", "latitude": {lat}, "longitude": {lon}}}"#
        ))
        .unwrap()
    }

    fn bare(id: i64) -> Report {
        serde_json::from_str(&format!(r#"{{"id": {id}, "title": "r{id}"}}"#)).unwrap()
    }

    #[test]
    fn only_geolocated_reports_get_markers() {
        let mut projection = MapProjection::new();
        let mut surface = RecordingSurface::default();

        let reports = vec![geo(1, 19.0, 72.8), bare(5), geo(2, 13.0, 80.2)];
        let outcome = projection.sync(&reports, &mut surface);

        assert_eq!(outcome.placed, 2);
        assert_eq!(outcome.skipped_no_geo, 1);
        assert_eq!(projection.len(), 2);
        assert!(projection.select(5).is_none());
        assert!(surface.live.contains(&1) && surface.live.contains(&2));
        assert!(!surface.live.contains(&5));
    }

    #[test]
    fn unchanged_markers_are_reused() {
        let mut projection = MapProjection::new();
        let mut surface = RecordingSurface::default();
        let reports = vec![geo(1, 19.0, 72.8), geo(2, 13.0, 80.2)];

        projection.sync(&reports, &mut surface);
        let outcome = projection.sync(&reports, &mut surface);

        assert_eq!(outcome.placed, 0);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.reused, 2);
        assert_eq!(surface.events, vec!["place 1", "place 2"]);
    }

    #[test]
    fn changed_report_updates_its_marker_only() {
        let mut projection = MapProjection::new();
        let mut surface = RecordingSurface::default();
        projection.sync(&[geo(1, 19.0, 72.8), geo(2, 13.0, 80.2)], &mut surface);

        let mut moved = geo(1, 20.0, 73.0);
        moved.title = "relocated".into();
        let outcome = projection.sync(&[moved, geo(2, 13.0, 80.2)], &mut surface);

        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.reused, 1);
        assert_eq!(projection.marker(1).unwrap().title, "relocated");
        assert!(surface.events.contains(&"update 1".to_string()));
    }

    #[test]
    fn report_leaving_the_set_releases_its_marker() {
        let mut projection = MapProjection::new();
        let mut surface = RecordingSurface::default();
        projection.sync(&[geo(1, 19.0, 72.8), geo(2, 13.0, 80.2)], &mut surface);

        // id 2 loses its coordinates, id 3 appears.
        let outcome = projection.sync(&[geo(1, 19.0, 72.8), bare(2), geo(3, 28.6, 77.2)], &mut surface);

        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.placed, 1);
        assert!(!surface.live.contains(&2));
        assert!(projection.select(2).is_none());
        assert_eq!(projection.len(), 2);
    }

    #[test]
    fn marker_set_equals_geolocated_subset() {
        let mut projection = MapProjection::new();
        let mut surface = RecordingSurface::default();
        let reports = vec![geo(1, 1.0, 1.0), bare(2), geo(3, 3.0, 3.0), bare(4)];

        projection.sync(&reports, &mut surface);

        let expected: HashSet<i64> = reports
            .iter()
            .filter(|r| r.coordinates().is_some())
            .map(|r| r.id)
            .collect();
        assert_eq!(surface.live, expected);
        assert!(projection.len() <= reports.len());
    }

    #[test]
    fn select_resolves_back_to_the_report() {
        let mut projection = MapProjection::new();
        let mut surface = RecordingSurface::default();
        projection.sync(&[geo(7, 9.9, 76.3)], &mut surface);

        let report = projection.select(7).unwrap();
        assert_eq!(report.id, 7);
        assert_eq!(report.title, "r7");
    }

    #[test]
    fn clear_releases_every_marker() {
        let mut projection = MapProjection::new();
        let mut surface = RecordingSurface::default();
        projection.sync(&[geo(1, 1.0, 1.0), geo(2, 2.0, 2.0)], &mut surface);

        let removed = projection.clear(&mut surface);

        assert_eq!(removed, 2);
        assert!(surface.live.is_empty());
        assert!(projection.is_empty());
    }

    #[test]
    fn popup_describes_the_report() {
        let report: Report = serde_json::from_str(
            r#"{"id": 1, "title": "Canal overflow", "flood_type": "Flash Flood",
                "urgency": "Urgent Panic", "location_name": "Andheri East",
                "latitude": 19.1, "longitude": 72.9, "verified": 1}"#,
        )
        .unwrap();

        let popup = popup_text(&report);
        assert!(popup.contains("Canal overflow"));
        assert!(popup.contains("Type: Flash Flood"));
        assert!(popup.contains("Urgency: Urgent Panic"));
        assert!(popup.contains("Location: Andheri East"));
        assert!(popup.contains("✓ Verified"));

        let mut projection = MapProjection::new();
        let mut surface = RecordingSurface::default();
        projection.sync(std::slice::from_ref(&report), &mut surface);
        assert_eq!(projection.marker(1).unwrap().color, "#EF4444");
    }
}
