use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::app::ports::DocumentStorePort;
use crate::error::{Result, SyncError};
use crate::pipeline::processing::merge::normalize_name;
use crate::pipeline::storage::dataset::DatasetWriter;
use crate::types::VenueRecord;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadMode {
    /// Upsert every record in the artifact
    Batch,
    /// Upsert the single record with this name (or id)
    HotFix { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Reading,
    Syncing,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedUpsert {
    pub id: String,
    pub error: String,
}

/// Per-record outcome of a load, sorted by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedUpsert>,
}

impl LoadSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn sort(&mut self) {
        self.succeeded.sort();
        self.failed.sort_by(|a, b| a.id.cmp(&b.id));
    }
}

/// Pushes the artifact into the document store.
pub struct Loader {
    dataset: DatasetWriter,
    store: Arc<dyn DocumentStorePort>,
    concurrency: usize,
    state: LoaderState,
}

impl Loader {
    pub fn new(dataset: DatasetWriter, store: Arc<dyn DocumentStorePort>, concurrency: usize) -> Self {
        Self {
            dataset,
            store,
            concurrency: concurrency.max(1),
            state: LoaderState::Idle,
        }
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    #[instrument(skip(self), fields(artifact = %self.dataset.path().display()))]
    pub async fn run(&mut self, mode: &LoadMode) -> Result<LoadSummary> {
        let result = self.run_inner(mode).await;
        self.state = if result.is_ok() {
            LoaderState::Done
        } else {
            LoaderState::Failed
        };
        result
    }

    async fn run_inner(&mut self, mode: &LoadMode) -> Result<LoadSummary> {
        self.state = LoaderState::Reading;
        let records = self.dataset.read()?;
        info!("Loaded {} records from the artifact", records.len());

        self.state = LoaderState::Syncing;
        match mode {
            LoadMode::Batch => Ok(self.sync_batch(records).await),
            LoadMode::HotFix { name } => self.sync_one(records, name).await,
        }
    }

    async fn sync_one(&self, records: Vec<VenueRecord>, name: &str) -> Result<LoadSummary> {
        let wanted = normalize_name(name).to_lowercase();
        let mut matches = records
            .into_iter()
            .filter(|r| r.name.to_lowercase() == wanted || r.id == name.trim());
        let record = matches
            .next()
            .ok_or_else(|| SyncError::RecordNotFound(name.to_string()))?;
        let others: Vec<String> = matches.map(|r| r.id).collect();
        if !others.is_empty() {
            warn!(
                "'{}' also matches {:?}; syncing only '{}', pass an id to pick another",
                name, others, record.id
            );
        }

        info!("Hot-fix: syncing '{}' ({})", record.name, record.id);
        match self.store.upsert(&record).await {
            Ok(()) => {
                crate::metrics::upsert(true);
                Ok(LoadSummary {
                    succeeded: vec![record.id],
                    failed: Vec::new(),
                })
            }
            Err(message) => {
                crate::metrics::upsert(false);
                Err(SyncError::RemoteWrite {
                    id: record.id,
                    message,
                })
            }
        }
    }

    /// Upsert every record with at most `concurrency` writes in flight. A failed
    /// write is recorded and the rest carry on. Every id ends up in exactly one
    /// of `succeeded` or `failed`.
    async fn sync_batch(&self, records: Vec<VenueRecord>) -> LoadSummary {
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let summary = Arc::new(Mutex::new(LoadSummary::default()));
        let mut tasks = JoinSet::new();

        for record in records {
            let semaphore = semaphore.clone();
            let summary = summary.clone();
            let store = self.store.clone();
            tasks.spawn(async move {
                // the semaphore is never closed, so acquiring cannot fail
                let _permit = semaphore.acquire_owned().await;
                let outcome = store.upsert(&record).await;
                crate::metrics::upsert(outcome.is_ok());
                let mut summary = summary.lock().await;
                match outcome {
                    Ok(()) => summary.succeeded.push(record.id),
                    Err(error) => {
                        warn!("Upsert of '{}' failed: {}", record.id, error);
                        summary.failed.push(FailedUpsert { id: record.id, error });
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Upsert task did not finish: {}", e);
            }
        }

        let mut summary = summary.lock().await.clone();
        let reported: HashSet<&str> = summary
            .succeeded
            .iter()
            .map(String::as_str)
            .chain(summary.failed.iter().map(|f| f.id.as_str()))
            .collect();
        let lost: Vec<FailedUpsert> = ids
            .iter()
            .filter(|id| !reported.contains(id.as_str()))
            .map(|id| FailedUpsert {
                id: id.clone(),
                error: "upsert task did not finish".to_string(),
            })
            .collect();
        for failure in &lost {
            crate::metrics::upsert(false);
            warn!("No outcome recorded for '{}', counting it as failed", failure.id);
        }
        summary.failed.extend(lost);
        summary.sort();

        info!(
            succeeded = ?summary.succeeded,
            failed = ?summary.failed.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(),
            "Batch sync finished: {} succeeded, {} failed",
            summary.succeeded.len(),
            summary.failed.len()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::in_memory_store::InMemoryStore;
    use crate::types::{RecordStatus, SourceKind};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn record(id: &str, name: &str) -> VenueRecord {
        let mut source_urls = BTreeMap::new();
        source_urls.insert(SourceKind::Listing, "https://list.test/".to_string());
        VenueRecord {
            id: id.into(),
            name: name.into(),
            address: String::new(),
            phone: None,
            lat: None,
            lng: None,
            venue_type: Default::default(),
            schedule: vec![],
            schedule_text: String::new(),
            source_urls,
            status: RecordStatus::Partial,
            fetched_at: Utc::now(),
            source_key: None,
            priest: None,
            image_url: None,
            reference_url: None,
            alt_phones: vec![],
        }
    }

    #[tokio::test]
    async fn test_state_ends_done_after_batch() {
        let dir = tempdir().unwrap();
        let dataset = DatasetWriter::new(dir.path().join("venues.json"));
        dataset.write(&[record("b", "B"), record("a", "A")]).unwrap();
        let store = InMemoryStore::new();

        let mut loader = Loader::new(dataset, Arc::new(store.clone()), 2);
        assert_eq!(loader.state(), LoaderState::Idle);
        let summary = loader.run(&LoadMode::Batch).await.unwrap();

        assert_eq!(loader.state(), LoaderState::Done);
        assert_eq!(summary.succeeded, vec!["a", "b"]);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_loader() {
        let dir = tempdir().unwrap();
        let mut loader = Loader::new(
            DatasetWriter::new(dir.path().join("absent.json")),
            Arc::new(InMemoryStore::new()),
            1,
        );

        assert!(loader.run(&LoadMode::Batch).await.is_err());
        assert_eq!(loader.state(), LoaderState::Failed);
    }

    #[tokio::test]
    async fn test_hot_fix_matches_normalized_name_or_id() {
        let dir = tempdir().unwrap();
        let dataset = DatasetWriter::new(dir.path().join("venues.json"));
        dataset
            .write(&[record("명동-대성당", "명동 대성당"), record("other", "Other")])
            .unwrap();
        let store = InMemoryStore::new();
        let mut loader = Loader::new(dataset, Arc::new(store.clone()), 1);

        let by_name = loader
            .run(&LoadMode::HotFix { name: "  명동   대성당 ".into() })
            .await
            .unwrap();
        assert_eq!(by_name.succeeded, vec!["명동-대성당"]);

        loader.run(&LoadMode::HotFix { name: "other".into() }).await.unwrap();
        assert_eq!(store.len(), 2);
    }
}
