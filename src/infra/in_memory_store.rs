use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::app::ports::DocumentStorePort;
use crate::types::VenueRecord;

/// Document store kept in process memory. Used for `load --dry-run` and tests.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    documents: Arc<Mutex<HashMap<String, Value>>>,
    writes: Arc<AtomicUsize>,
    fail_ids: Arc<HashSet<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects upserts for the given ids.
    pub fn with_failures<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fail_ids: Arc::new(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successful upserts so far, including overwrites.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of every document, ordered by id.
    pub fn documents(&self) -> BTreeMap<String, Value> {
        self.lock().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Seed a document directly, bypassing `upsert`.
    pub fn insert_raw(&self, id: impl Into<String>, document: Value) {
        self.lock().insert(id.into(), document);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        // the map stays consistent even if a holder panicked
        self.documents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DocumentStorePort for InMemoryStore {
    async fn upsert(&self, record: &VenueRecord) -> Result<(), String> {
        if self.fail_ids.contains(&record.id) {
            return Err(format!("simulated write failure for '{}'", record.id));
        }
        let document = serde_json::to_value(record).map_err(|e| e.to_string())?;
        self.lock().insert(record.id.clone(), document);
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!("Upserted document {}", record.id);
        Ok(())
    }
}
