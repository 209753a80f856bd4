use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::warn;

use super::{BackendKind, SnapshotBackend};
use crate::{
    common::{
        errors::{StoreError, StoreResult},
        types::{BotId, GuildId, now_ms},
    },
    snapshot::{self, PlayerSnapshot},
};

/// Minimal document-store surface used by the remote backend.
#[async_trait]
pub trait DocumentClient: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn find_one(&self, collection: &str, id: &str) -> StoreResult<Option<Value>>;

    /// Inserts or replaces the document with the given id.
    async fn upsert(&self, collection: &str, id: &str, document: Value) -> StoreResult<()>;

    /// Removing a missing document is not an error.
    async fn delete_one(&self, collection: &str, id: &str) -> StoreResult<()>;

    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Value>>;
}

/// Remote backend: one collection per bot identity, one document per guild.
///
/// ```json
/// { "_id": "<guild_id>", "version": 3, "saved_at": 1700000000000, "data": "<base64 gzip json>" }
/// ```
pub struct DocumentBackend {
    client: Arc<dyn DocumentClient>,
    /// Undecodable documents older than this are deleted on listing.
    grace_window_ms: Option<u64>,
}

impl DocumentBackend {
    pub fn new(client: Arc<dyn DocumentClient>) -> Self {
        Self {
            client,
            grace_window_ms: None,
        }
    }

    pub fn with_grace_window(mut self, grace_window_ms: u64) -> Self {
        self.grace_window_ms = Some(grace_window_ms);
        self
    }

    /// Undecodable documents still carry a plain `saved_at`; without one
    /// they never expire.
    fn expired(&self, document: &Value) -> bool {
        let (Some(window), Some(saved_at)) = (
            self.grace_window_ms,
            document.get("saved_at").and_then(Value::as_u64),
        ) else {
            return false;
        };
        now_ms().saturating_sub(saved_at) > window
    }

    fn collection(namespace: BotId) -> String {
        namespace.to_string()
    }

    fn to_document(key: GuildId, snapshot: &PlayerSnapshot) -> StoreResult<Value> {
        Ok(json!({
            "_id": key.to_string(),
            "version": snapshot.version,
            "saved_at": snapshot.saved_at,
            "data": snapshot::encode_base64(snapshot)?,
        }))
    }

    fn from_document(document: &Value) -> StoreResult<PlayerSnapshot> {
        let data = document
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Codec("document has no data field".into()))?;
        snapshot::decode_base64(data)
    }
}

#[async_trait]
impl SnapshotBackend for DocumentBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RemoteDocument
    }

    async fn get(&self, namespace: BotId, key: GuildId) -> StoreResult<Option<PlayerSnapshot>> {
        let document = self
            .client
            .find_one(&Self::collection(namespace), &key.to_string())
            .await?;
        document.as_ref().map(Self::from_document).transpose()
    }

    async fn put(&self, namespace: BotId, key: GuildId, snapshot: &PlayerSnapshot) -> StoreResult<()> {
        let document = Self::to_document(key, snapshot)?;
        self.client
            .upsert(&Self::collection(namespace), &key.to_string(), document)
            .await
    }

    async fn delete(&self, namespace: BotId, key: GuildId) -> StoreResult<()> {
        self.client
            .delete_one(&Self::collection(namespace), &key.to_string())
            .await
    }

    async fn list(&self, namespace: BotId) -> StoreResult<Vec<PlayerSnapshot>> {
        let documents = self.client.find_all(&Self::collection(namespace)).await?;
        let mut snapshots = Vec::with_capacity(documents.len());
        for document in &documents {
            match Self::from_document(document) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    let id = document.get("_id").and_then(Value::as_str).unwrap_or("?");
                    warn!("[{}] Skipping undecodable remote snapshot: {}", id, e);
                    if id != "?" && self.expired(document) {
                        warn!("[{}] Deleting undecodable remote snapshot past the grace window", id);
                        if let Err(e) = self.client.delete_one(&Self::collection(namespace), id).await {
                            warn!("[{}] Failed to delete undecodable remote snapshot: {}", id, e);
                        }
                    }
                }
            }
        }
        Ok(snapshots)
    }
}
