use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::FOLLOWUP_SUFFIX;
use crate::error::{Result, SyncError};
use crate::types::{validate_dataset, RecordStatus, SourceKind, VenueRecord};

/// One venue still missing its schedule, for a targeted re-crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_url: Option<String>,
}

/// Reads and writes the intermediate JSON artifact handed from collect to load.
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    path: PathBuf,
}

impl DatasetWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<stem>.missing.json` next to the artifact.
    pub fn followup_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "venues".to_string());
        self.path.with_file_name(format!("{}.{}.json", stem, FOLLOWUP_SUFFIX))
    }

    /// Replace the artifact with `records`. Readers see the old snapshot or the
    /// new one, never a partial file.
    pub fn write(&self, records: &[VenueRecord]) -> Result<()> {
        validate_dataset(records).map_err(SyncError::InvalidRecord)?;
        let body = serde_json::to_vec_pretty(records)?;
        write_atomic(&self.path, &body)?;
        info!("Wrote {} records to {}", records.len(), self.path.display());
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<VenueRecord>> {
        let bytes = fs::read(&self.path).map_err(|source| SyncError::Artifact {
            path: self.path.clone(),
            source,
        })?;
        let records: Vec<VenueRecord> =
            serde_json::from_slice(&bytes).map_err(|source| SyncError::ArtifactFormat {
                path: self.path.clone(),
                source,
            })?;
        debug!("Read {} records from {}", records.len(), self.path.display());
        Ok(records)
    }

    /// Write the follow-up report for every partial record. Returns how many were listed.
    pub fn write_followups(&self, records: &[VenueRecord]) -> Result<usize> {
        let followups: Vec<FollowUp> = records
            .iter()
            .filter(|r| r.status == RecordStatus::Partial)
            .map(|r| FollowUp {
                id: r.id.clone(),
                name: r.name.clone(),
                address: r.address.clone(),
                detail_url: r.source_urls.get(&SourceKind::Detail).cloned(),
            })
            .collect();
        let path = self.followup_path();
        write_atomic(&path, &serde_json::to_vec_pretty(&followups)?)?;
        if !followups.is_empty() {
            info!("{} records without a schedule listed in {}", followups.len(), path.display());
        }
        Ok(followups.len())
    }
}

/// Write to a hidden temp file in the target directory, fsync, then rename over the target.
fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    let artifact_err = |source| SyncError::Artifact {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(artifact_err)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let tmp_path = dir.join(format!(".{}.tmp", file_name));

    let result = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(body)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(source) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(artifact_err(source));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn record(id: &str, status: RecordStatus) -> VenueRecord {
        let mut source_urls = BTreeMap::new();
        source_urls.insert(SourceKind::Listing, "https://list.test/?PAGE=1".to_string());
        source_urls.insert(SourceKind::Detail, format!("https://detail.test/{}", id));
        VenueRecord {
            id: id.to_string(),
            name: format!("{} 성당", id),
            address: "서울".to_string(),
            phone: None,
            lat: Some(37.5),
            lng: Some(127.0),
            venue_type: Default::default(),
            schedule: vec![],
            schedule_text: String::new(),
            source_urls,
            status,
            fetched_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            source_key: None,
            priest: None,
            image_url: None,
            reference_url: None,
            alt_phones: vec![],
        }
    }

    #[test]
    fn test_overwrite_leaves_only_the_new_snapshot() {
        let dir = tempdir().unwrap();
        let writer = DatasetWriter::new(dir.path().join("nested/venues.json"));

        writer.write(&[record("a", RecordStatus::Partial)]).unwrap();
        writer
            .write(&[record("b", RecordStatus::Complete), record("c", RecordStatus::Partial)])
            .unwrap();

        let ids: Vec<String> = writer.read().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_rejects_invalid_records_and_keeps_old_file() {
        let dir = tempdir().unwrap();
        let writer = DatasetWriter::new(dir.path().join("venues.json"));
        writer.write(&[record("a", RecordStatus::Partial)]).unwrap();

        let err = writer.write(&[record("b", RecordStatus::Failed)]).unwrap_err();
        assert!(matches!(err, SyncError::InvalidRecord(_)));
        assert_eq!(writer.read().unwrap()[0].id, "a");
    }

    #[test]
    fn test_reads_older_artifact_without_optional_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("venues.json");
        fs::write(
            &path,
            r#"[{"id":"a","name":"A","sourceUrls":{"listing":"u"},"status":"complete","fetchedAt":"2025-01-01T00:00:00Z"}]"#,
        )
        .unwrap();

        let records = DatasetWriter::new(&path).read().unwrap();
        assert_eq!(records[0].address, "");
        assert!(records[0].schedule.is_empty());
        assert!(records[0].alt_phones.is_empty());
    }

    #[test]
    fn test_missing_or_corrupt_artifact_errors() {
        let dir = tempdir().unwrap();
        let missing = DatasetWriter::new(dir.path().join("none.json"));
        assert!(matches!(missing.read(), Err(SyncError::Artifact { .. })));

        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            DatasetWriter::new(&path).read(),
            Err(SyncError::ArtifactFormat { .. })
        ));
    }

    #[test]
    fn test_followups_list_partial_records() {
        let dir = tempdir().unwrap();
        let writer = DatasetWriter::new(dir.path().join("venues.json"));
        assert_eq!(writer.followup_path(), dir.path().join("venues.missing.json"));

        let count = writer
            .write_followups(&[record("a", RecordStatus::Complete), record("b", RecordStatus::Partial)])
            .unwrap();
        assert_eq!(count, 1);

        let followups: Vec<FollowUp> =
            serde_json::from_slice(&fs::read(writer.followup_path()).unwrap()).unwrap();
        assert_eq!(followups[0].id, "b");
        assert_eq!(followups[0].detail_url.as_deref(), Some("https://detail.test/b"));
    }
}
