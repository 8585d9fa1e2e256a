//! Post-fetch result shaping: de-duplication and relevance filtering.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use vendorsync_client::PlaceRecord;

use crate::strategy::CategoryProfile;

/// Lodging and venue words; matched on whole words only.
static LODGING_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:hotels?|motels?|lodging|inns?|resorts?|venues?|halls?)\b").expect("static lodging pattern")
});

/// Provider types that mark lodging or event spaces.
const LODGING_TYPES: &[&str] = &["lodging", "hotel", "motel", "resort_hotel", "event_venue", "banquet_hall"];

/// Keep the first occurrence of each id, preserving order.
pub fn dedup_by_id(records: impl IntoIterator<Item = PlaceRecord>) -> Vec<PlaceRecord> {
    let mut seen = HashSet::new();
    records.into_iter().filter(|record| seen.insert(record.id.clone())).collect()
}

/// Whether a record looks like lodging or an event space.
pub fn is_lodging_or_venue(record: &PlaceRecord) -> bool {
    LODGING_NAME.is_match(&record.name) || record.types.iter().any(|t| LODGING_TYPES.contains(&t.as_str()))
}

/// Name plus types with underscores folded, so `event_venue` reads as two words.
fn searchable_text(record: &PlaceRecord) -> String {
    let mut text = record.name.clone();
    for t in &record.types {
        text.push(' ');
        text.push_str(&t.replace('_', " "));
    }
    text
}

/// Whether a record belongs in results for `profile`.
///
/// Venue categories keep everything. Other categories drop lodging and
/// venues, and keyword-strict categories additionally need a keyword hit in
/// the name or types.
pub fn is_relevant(record: &PlaceRecord, profile: &CategoryProfile) -> bool {
    if profile.is_venue() {
        return true;
    }
    if is_lodging_or_venue(record) {
        return false;
    }
    profile.matches_keyword(&searchable_text(record))
}

pub fn filter_relevant(records: Vec<PlaceRecord>, profile: &CategoryProfile) -> Vec<PlaceRecord> {
    let before = records.len();
    let kept: Vec<PlaceRecord> = records.into_iter().filter(|r| is_relevant(r, profile)).collect();
    if kept.len() < before {
        let removed = before - kept.len();
        tracing::debug!(category = %profile.id, removed, kept = kept.len(), "filtered irrelevant results");
    }
    kept
}
