use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::pipeline::ingestion::detail::DetailResult;
use crate::pipeline::ingestion::listing::ListingEntry;
use crate::types::{schedule_text, RecordStatus, SourceKind, VenueRecord, VenueType};

/// Trim and collapse every run of whitespace to one space.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased slug keeping letters and digits of any script, so Hangul names
/// stay readable as document ids.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "venue".to_string()
    } else {
        slug
    }
}

/// Infer the category from the venue name when the listing does not state one.
pub fn detect_type(name: &str) -> VenueType {
    let lower = name.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    if has(&["공소", "chapel"]) {
        VenueType::Chapel
    } else if has(&["성지", "shrine"]) {
        VenueType::Shrine
    } else if has(&["대성당", "cathedral"]) {
        VenueType::Cathedral
    } else if has(&["대성전", "basilica"]) {
        VenueType::Basilica
    } else {
        VenueType::Parish
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Combines a listing entry and its detail result into one canonical record.
///
/// Holds the ids handed out so far, so one `Merger` must be used per run.
#[derive(Debug, Default)]
pub struct Merger {
    used_ids: HashSet<String>,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, listing: &ListingEntry, detail: &DetailResult) -> VenueRecord {
        self.merge_at(listing, detail, Utc::now())
    }

    pub fn merge_at(
        &mut self,
        listing: &ListingEntry,
        detail: &DetailResult,
        fetched_at: DateTime<Utc>,
    ) -> VenueRecord {
        let name = normalize_name(&listing.name);
        let fields = match detail {
            DetailResult::Ok(fields) => Some(fields),
            _ => None,
        };

        let mut source_urls = BTreeMap::new();
        source_urls.insert(SourceKind::Listing, listing.listing_url.clone());
        if let Some(url) = detail.url() {
            source_urls.insert(SourceKind::Detail, url.to_string());
        }

        let address = non_empty(Some(listing.address.as_str()))
            .or_else(|| fields.and_then(|f| non_empty(f.address.as_deref())))
            .unwrap_or_default();

        let detail_phones: &[String] = fields.map(|f| f.phones.as_slice()).unwrap_or(&[]);
        let phone = non_empty(listing.phone.as_deref())
            .or_else(|| detail_phones.first().cloned());
        let alt_phones = detail_phones
            .iter()
            .filter(|p| Some(*p) != phone.as_ref())
            .cloned()
            .collect();

        let schedule = fields.map(|f| f.schedule.clone()).unwrap_or_default();
        let status = if name.is_empty() {
            RecordStatus::Failed
        } else if !schedule.is_empty() {
            RecordStatus::Complete
        } else {
            RecordStatus::Partial
        };

        let id = if status == RecordStatus::Failed {
            String::new()
        } else {
            self.assign_id(&name)
        };

        VenueRecord {
            id,
            venue_type: listing.venue_type.unwrap_or_else(|| detect_type(&name)),
            name,
            address,
            phone,
            lat: listing.lat,
            lng: listing.lng,
            schedule_text: schedule_text(&schedule),
            schedule,
            source_urls,
            status,
            fetched_at,
            source_key: listing.source_key.clone(),
            priest: non_empty(listing.priest.as_deref()),
            image_url: non_empty(listing.image_url.as_deref()),
            reference_url: fields.and_then(|f| f.reference_url.clone()),
            alt_phones,
        }
    }

    fn assign_id(&mut self, name: &str) -> String {
        let base = slugify(name);
        let mut id = base.clone();
        let mut suffix = 2;
        while self.used_ids.contains(&id) {
            id = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        if id != base {
            debug!("Id '{}' already taken, using '{}'", base, id);
        }
        self.used_ids.insert(id.clone());
        id
    }
}
