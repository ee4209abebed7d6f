use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

use crate::app::ports::DocumentStorePort;
use crate::config::StoreConfig;
use crate::error::{Result, SyncError};
use crate::types::VenueRecord;

/// `DocumentStorePort` over the Firestore REST API.
///
/// A PATCH without an update mask replaces the whole document and creates it
/// when absent, which is exactly insert-or-replace by id.
pub struct FirestoreStore {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    collection: String,
    token: Option<String>,
}

impl FirestoreStore {
    pub fn new(config: &StoreConfig, token: Option<String>, timeout: Duration) -> Result<Self> {
        if config.project_id.trim().is_empty() {
            return Err(SyncError::Config(
                "store.project_id (or FIRESTORE_PROJECT_ID) is required to load into Firestore".into(),
            ));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.trim().to_string(),
            collection: config.collection.clone(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn document_url(&self, id: &str) -> std::result::Result<reqwest::Url, String> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| e.to_string())?;
        url.path_segments_mut()
            .map_err(|_| format!("base url '{}' cannot hold a path", self.base_url))?
            .pop_if_empty()
            .extend([
                "v1",
                "projects",
                self.project_id.as_str(),
                "databases",
                "(default)",
                "documents",
                self.collection.as_str(),
                id,
            ]);
        Ok(url)
    }
}

/// Encode plain JSON as a Firestore typed value.
pub fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // integers travel as decimal strings
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(to_firestore_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": to_firestore_fields(map) } }),
    }
}

pub fn to_firestore_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), to_firestore_value(v)))
        .collect()
}

#[async_trait]
impl DocumentStorePort for FirestoreStore {
    async fn upsert(&self, record: &VenueRecord) -> std::result::Result<(), String> {
        let document = match serde_json::to_value(record).map_err(|e| e.to_string())? {
            Value::Object(map) => map,
            _ => return Err("record did not serialize to an object".to_string()),
        };
        let url = self.document_url(&record.id)?;
        let body = json!({ "fields": to_firestore_fields(&document) });

        let mut request = self.client.patch(url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("firestore returned {}: {}", status, text.trim()));
        }
        debug!("Upserted {}/{}", self.collection, record.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FirestoreStore {
        let config = StoreConfig {
            project_id: "demo-project".into(),
            ..StoreConfig::default()
        };
        FirestoreStore::new(&config, None, Duration::from_secs(15)).unwrap()
    }

    #[test]
    fn test_encodes_typed_values() {
        let encoded = to_firestore_value(&json!({
            "name": "명동",
            "lat": 37.56,
            "count": 3,
            "open": true,
            "phone": null,
            "schedule": [{ "label": "주일미사" }]
        }));
        let fields = &encoded["mapValue"]["fields"];
        assert_eq!(fields["name"], json!({ "stringValue": "명동" }));
        assert_eq!(fields["lat"], json!({ "doubleValue": 37.56 }));
        assert_eq!(fields["count"], json!({ "integerValue": "3" }));
        assert_eq!(fields["open"], json!({ "booleanValue": true }));
        assert_eq!(fields["phone"], json!({ "nullValue": null }));
        assert_eq!(
            fields["schedule"]["arrayValue"]["values"][0]["mapValue"]["fields"]["label"],
            json!({ "stringValue": "주일미사" })
        );
    }

    #[test]
    fn test_document_url_escapes_id() {
        let url = store().document_url("명동-대성당").unwrap();
        assert!(url.as_str().starts_with(
            "https://firestore.googleapis.com/v1/projects/demo-project/databases/(default)/documents/catholic_churches/"
        ));
        assert!(!url.as_str().contains("명동"));
    }

    #[test]
    fn test_requires_project_id() {
        let err = FirestoreStore::new(&StoreConfig::default(), None, Duration::from_secs(15));
        assert!(matches!(err, Err(SyncError::Config(_))));
    }
}
