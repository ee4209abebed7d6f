use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Category of a venue. `Parish` is used whenever the source says nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueType {
    #[default]
    Parish,
    Chapel,
    Shrine,
    Cathedral,
    Basilica,
}

impl VenueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueType::Parish => "parish",
            VenueType::Chapel => "chapel",
            VenueType::Shrine => "shrine",
            VenueType::Cathedral => "cathedral",
            VenueType::Basilica => "basilica",
        }
    }

    /// Parse a category label supplied by the listing source.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "parish" | "church" => Some(VenueType::Parish),
            "chapel" | "gongso" => Some(VenueType::Chapel),
            "shrine" => Some(VenueType::Shrine),
            "cathedral" => Some(VenueType::Cathedral),
            "basilica" => Some(VenueType::Basilica),
            _ => None,
        }
    }
}

impl fmt::Display for VenueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of extraction for one venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Listing data plus a non-empty schedule from the detail page
    Complete,
    /// Listing data exists but the detail page was unreachable or had no schedule
    Partial,
    /// No usable data; never persisted
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Complete => "complete",
            RecordStatus::Partial => "partial",
            RecordStatus::Failed => "failed",
        }
    }
}

/// Upstream source a record field was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Listing,
    Detail,
}

/// One line of a recurring schedule, e.g. label "주일미사", day "토", time "18:00".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub label: String,
    #[serde(default)]
    pub day: String,
    pub time: String,
}

impl ScheduleEntry {
    pub fn new(label: impl Into<String>, day: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            day: day.into(),
            time: time.into(),
        }
    }

    /// Human-readable form: `[label] day: time`, or `[label] time` when no day is known.
    pub fn display(&self) -> String {
        if self.day.is_empty() {
            format!("[{}] {}", self.label, self.time)
        } else {
            format!("[{}] {}: {}", self.label, self.day, self.time)
        }
    }
}

/// Canonical venue document. This is the unit written to the intermediate
/// artifact and upserted into the document store.
///
/// Fields added after the first artifact version carry `#[serde(default)]` so
/// older snapshots keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(rename = "type", default)]
    pub venue_type: VenueType,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
    /// `schedule` flattened for display in clients that do not render entries
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schedule_text: String,
    pub source_urls: BTreeMap<SourceKind, String>,
    pub status: RecordStatus,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt_phones: Vec<String>,
}

impl VenueRecord {
    /// Check the invariants every persisted record must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err(format!("record '{}' has an empty id", self.name));
        }
        if self.name.trim().is_empty() {
            return Err(format!("record '{}' has an empty name", self.id));
        }
        if self.status == RecordStatus::Failed {
            return Err(format!("record '{}' has status failed", self.id));
        }
        if !self.source_urls.contains_key(&SourceKind::Listing) {
            return Err(format!("record '{}' has no listing source url", self.id));
        }
        Ok(())
    }
}

/// Schedule rendered as a single line, entries separated by ` | `.
pub fn schedule_text(schedule: &[ScheduleEntry]) -> String {
    schedule
        .iter()
        .map(ScheduleEntry::display)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Validate every record and check that ids are unique across the dataset.
pub fn validate_dataset(records: &[VenueRecord]) -> Result<(), String> {
    let mut ids = HashSet::with_capacity(records.len());
    for record in records {
        record.validate()?;
        if !ids.insert(record.id.as_str()) {
            return Err(format!("duplicate record id '{}'", record.id));
        }
    }
    Ok(())
}
