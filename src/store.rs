//! Item store client.
//!
//! The store is the source of truth for confirmed state. The core only
//! needs one operation from it: an idempotent-on-retry write whose
//! rejection carries enough detail to decide between a terminal failure and
//! a validation error the UI can surface.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use trellis_types::{ItemKey, RealtimeEventType, StoreError};
use urlencoding::encode;

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Persist one mutation. Success returns the store's confirmed state;
    /// the ledger ignores it (confirmation comes from the event stream),
    /// but callers issuing `ClientWins` re-writes rely on the same path.
    async fn write(
        &self,
        event_type: RealtimeEventType,
        key: &ItemKey,
        payload: Value,
    ) -> Result<Value, StoreError>;
}

/// HTTP implementation against the application's REST item endpoints.
#[derive(Clone)]
pub struct HttpItemStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpItemStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn collection_url(&self, key: &ItemKey) -> String {
        format!("{}/items/{}", self.base_url, encode(&key.item_type))
    }

    fn item_url(&self, key: &ItemKey) -> String {
        format!(
            "{}/items/{}/{}",
            self.base_url,
            encode(&key.item_type),
            encode(&key.item_id)
        )
    }
}

#[async_trait]
impl ItemStore for HttpItemStore {
    async fn write(
        &self,
        event_type: RealtimeEventType,
        key: &ItemKey,
        payload: Value,
    ) -> Result<Value, StoreError> {
        let request = match event_type {
            RealtimeEventType::ItemCreated => {
                self.client.post(self.collection_url(key)).json(&payload)
            }
            RealtimeEventType::ItemUpdated => self.client.put(self.item_url(key)).json(&payload),
            RealtimeEventType::ItemDeleted => self.client.delete(self.item_url(key)),
            RealtimeEventType::UserActivity | RealtimeEventType::SyncConflict => {
                return Err(StoreError::InvalidPayload(format!(
                    "{:?} is not a store mutation",
                    event_type
                )));
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                detail: if detail.trim().is_empty() {
                    status.to_string()
                } else {
                    detail.trim().to_string()
                },
            });
        }

        debug!("store write ok: {:?} {}", event_type, key);
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;
        if body.trim().is_empty() {
            // Deletes commonly return 204 with no body.
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| StoreError::InvalidPayload(e.to_string()))
    }
}
