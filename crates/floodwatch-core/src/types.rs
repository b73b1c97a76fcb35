//! Wire-level report types shared by the store, the projection, and the
//! client transports.
//!
//! The backend emits rows straight out of its database joins, so fields are
//! tolerant by default: coordinates may arrive as numbers or numeric strings,
//! `verified` as a bool or a 0/1 integer, and timestamps as either RFC 3339
//! or the SQLite `%Y-%m-%d %H:%M:%S` form.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Classifier urgency for a report. Free-form values from older pipeline
/// versions fall through to `Unknown` rather than failing deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Urgency {
    UrgentPanic,
    AlertCaution,
    SafeNormal,
    Unknown,
}

impl Urgency {
    /// Parse the classifier's display name. Anything unrecognized maps to
    /// `Unknown`; the stream must never reject a report over a label.
    pub fn from_name(s: &str) -> Self {
        match s {
            "Urgent Panic" => Self::UrgentPanic,
            "Alert Caution" => Self::AlertCaution,
            "Safe Normal" => Self::SafeNormal,
            _ => Self::Unknown,
        }
    }
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UrgentPanic => "Urgent Panic",
            Self::AlertCaution => "Alert Caution",
            Self::SafeNormal => "Safe Normal",
            Self::Unknown => "Unknown",
        }
    }

    /// Marker color for the map legend. Unknown urgency renders gray.
    pub fn color(self) -> &'static str {
        match self {
            Self::UrgentPanic => "#EF4444",
            Self::AlertCaution => "#F59E0B",
            Self::SafeNormal => "#10B981",
            Self::Unknown => "#6B7280",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Urgency {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Urgency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_name(&raw))
    }
}

/// Direction of a vote on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Up,
    Down,
}

impl VoteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            _ => Err(format!("invalid vote type: {s} (expected up or down)")),
        }
    }
}

/// A validated coordinate pair. Only constructed from reports whose latitude
/// and longitude are both present and finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A hazard report as tracked by the reconciliation store.
///
/// `id` is stable across updates and unique within a store. Vote counters
/// always hold server-computed values; the client never increments them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub longitude: Option<f64>,
    /// Pipeline status: "processing", "verified", ...
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "urgency_level")]
    pub urgency: Option<Urgency>,
    #[serde(default, alias = "hazard_type")]
    pub flood_type: Option<String>,
    /// Creation time as reported by the server. Hotspot rows omit it; no
    /// local clock ever substitutes, because `Report` equality decides
    /// upsert idempotence.
    #[serde(default, with = "flexible_ts")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    #[serde(default)]
    pub authenticity_score: Option<i64>,
    #[serde(default, deserialize_with = "de_lenient_bool")]
    pub verified: Option<bool>,
    #[serde(default)]
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

impl Report {
    /// The validated coordinate pair, if this report is geolocated.
    /// Reports without one still participate in the list view but are
    /// excluded from the map projection.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude))
                if latitude.is_finite() && longitude.is_finite() =>
            {
                Some(Coordinates { latitude, longitude })
            }
            _ => None,
        }
    }

    /// Net vote score as shown next to a post.
    pub fn score(&self) -> i64 {
        self.upvotes - self.downvotes
    }
}

/// Parse a timestamp in either RFC 3339 or SQLite `CURRENT_TIMESTAMP` form
/// (naive, interpreted as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Serde adapter for `created_at`: serializes as RFC 3339, deserializes
/// via [`parse_timestamp`]. Output is always RFC 3339, so a SQLite-form
/// input does not round-trip to its original text.
mod flexible_ts {
    use super::*;
    use serde::{Serializer, de};

    pub fn serialize<S>(dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match dt {
            Some(dt) => serializer.serialize_some(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("unrecognized timestamp: {raw}"))),
        }
    }
}

/// Accept a float, a numeric string, or null. Anything non-numeric or
/// non-finite becomes `None`: form input sometimes ships coordinates as
/// strings, and a bad coordinate must not reject the whole report.
fn de_lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Raw::Num(v)) if v.is_finite() => Some(v),
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    })
}

/// Accept a bool or a 0/1 integer (SQLite stores booleans as integers).
fn de_lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Int(i64),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    Ok(raw.map(|r| match r {
        Raw::Flag(b) => b,
        Raw::Int(i) => i != 0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_deserializes_minimal_row() {
        let report: Report = serde_json::from_str(
            r#"{"id": 1, "title": "Waterlogging near station", "created_at": "2026-08-30 11:42:07"}"#,
        )
        .unwrap();
        assert_eq!(report.id, 1);
        assert_eq!(report.upvotes, 0);
        assert_eq!(report.downvotes, 0);
        assert!(report.coordinates().is_none());
        assert_eq!(
            report.created_at.unwrap().to_rfc3339(),
            "2026-08-30T11:42:07+00:00"
        );
    }

    #[test]
    fn report_accepts_rfc3339_timestamp() {
        let report: Report = serde_json::from_str(
            r#"{"id": 2, "title": "t", "created_at": "2026-08-30T11:42:07+05:30"}"#,
        )
        .unwrap();
        assert_eq!(
            report.created_at.unwrap().to_rfc3339(),
            "2026-08-30T06:12:07+00:00"
        );
    }

    #[test]
    fn decoding_the_same_row_twice_yields_equal_reports() {
        // No field gets a decode-time stamp: a row without created_at stays
        // without one, so wire-identical frames compare equal.
        let raw = r#"{"id": 1, "title": "A"}"#;
        let first: Report = serde_json::from_str(raw).unwrap();
        let second: Report = serde_json::from_str(raw).unwrap();
        assert_eq!(first.created_at, None);
        assert_eq!(first, second);
    }

    #[test]
    fn sqlite_timestamp_serializes_as_rfc3339() {
        let report: Report = serde_json::from_str(
            r#"{"id": 9, "title": "t", "created_at": "2026-08-30 11:42:07.125"}"#,
        )
        .unwrap();
        let json = serde_json::to_string(&report).unwrap();
        // The textual form is normalized, not round-tripped.
        assert!(json.contains("2026-08-30T11:42:07.125+00:00"));
    }

    #[test]
    fn coordinates_accept_numeric_strings() {
        let report: Report = serde_json::from_str(
            r#"{"id": 3, "title": "t", "latitude": "19.0760", "longitude": 72.8777}"#,
        )
        .unwrap();
        let coords = report.coordinates().unwrap();
        assert!((coords.latitude - 19.076).abs() < 1e-9);
        assert!((coords.longitude - 72.8777).abs() < 1e-9);
    }

    #[test]
    fn non_numeric_coordinate_is_dropped_not_fatal() {
        let report: Report = serde_json::from_str(
            r#"{"id": 4, "title": "t", "latitude": "here", "longitude": 72.8}"#,
        )
        .unwrap();
        assert_eq!(report.latitude, None);
        // One missing coordinate disqualifies the pair.
        assert!(report.coordinates().is_none());
    }

    #[test]
    fn verified_accepts_integer_flag() {
        let report: Report =
            serde_json::from_str(r#"{"id": 5, "title": "t", "verified": 1}"#).unwrap();
        assert_eq!(report.verified, Some(true));
        let report: Report =
            serde_json::from_str(r#"{"id": 6, "title": "t", "verified": false}"#).unwrap();
        assert_eq!(report.verified, Some(false));
    }

    #[test]
    fn unknown_urgency_falls_through() {
        let report: Report = serde_json::from_str(
            r#"{"id": 7, "title": "t", "urgency": "Severe Flooding"}"#,
        )
        .unwrap();
        assert_eq!(report.urgency, Some(Urgency::Unknown));
        assert_eq!(report.urgency.unwrap().color(), "#6B7280");
    }

    #[test]
    fn urgency_roundtrips_display_names() {
        for (value, color) in [
            (Urgency::UrgentPanic, "#EF4444"),
            (Urgency::AlertCaution, "#F59E0B"),
            (Urgency::SafeNormal, "#10B981"),
        ] {
            let json = serde_json::to_string(&value).unwrap();
            let back: Urgency = serde_json::from_str(&json).unwrap();
            assert_eq!(back, value);
            assert_eq!(value.color(), color);
        }
    }

    #[test]
    fn vote_kind_parses_case_insensitive() {
        assert_eq!("UP".parse::<VoteKind>().unwrap(), VoteKind::Up);
        assert_eq!("down".parse::<VoteKind>().unwrap(), VoteKind::Down);
        assert!("sideways".parse::<VoteKind>().is_err());
    }

    #[test]
    fn score_is_upvotes_minus_downvotes() {
        let report: Report = serde_json::from_str(
            r#"{"id": 8, "title": "t", "upvotes": 7, "downvotes": 3}"#,
        )
        .unwrap();
        assert_eq!(report.score(), 4);
    }
}
