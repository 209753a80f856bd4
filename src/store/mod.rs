//! Durable per-guild player snapshots behind a pluggable backend.

pub mod document;
pub mod file;
pub mod http_client;
#[cfg(test)]
pub mod memory;
pub mod migrate;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{error, info, warn};

pub use document::{DocumentBackend, DocumentClient};
pub use file::FileBackend;
pub use http_client::HttpDocumentClient;
pub use migrate::{MigrationReport, migrate};

use crate::{
    common::{
        errors::StoreResult,
        types::{BotId, GuildId},
    },
    configs::StorageConfig,
    snapshot::PlayerSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    LocalFile,
    RemoteDocument,
}

/// Key/value persistence of snapshots. Namespace is the bot identity,
/// key is the guild.
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Missing keys yield `Ok(None)`.
    async fn get(&self, namespace: BotId, key: GuildId) -> StoreResult<Option<PlayerSnapshot>>;

    async fn put(&self, namespace: BotId, key: GuildId, snapshot: &PlayerSnapshot) -> StoreResult<()>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, namespace: BotId, key: GuildId) -> StoreResult<()>;

    async fn list(&self, namespace: BotId) -> StoreResult<Vec<PlayerSnapshot>>;
}

/// Which backend serves a bot identity. Remote wins whenever it is configured
/// and answered the startup ping.
pub fn select_backend(config: &StorageConfig, remote_reachable: bool) -> BackendKind {
    if config.remote.is_some() && remote_reachable {
        BackendKind::RemoteDocument
    } else {
        BackendKind::LocalFile
    }
}

/// Snapshot store bound to one bot identity.
pub struct SessionStore {
    namespace: BotId,
    backend: Arc<dyn SnapshotBackend>,
    save_interval: Duration,
}

impl SessionStore {
    pub fn new(namespace: BotId, backend: Arc<dyn SnapshotBackend>, config: &StorageConfig) -> Self {
        let save_interval = match backend.kind() {
            BackendKind::LocalFile => Duration::from_secs(config.local_save_interval_secs),
            BackendKind::RemoteDocument => Duration::from_secs(config.remote_save_interval_secs),
        };
        Self {
            namespace,
            backend,
            save_interval,
        }
    }

    /// Picks the backend from configuration and folds legacy local snapshots
    /// into the remote store when remote is in use.
    pub async fn open(config: &StorageConfig, namespace: BotId) -> Self {
        let remote: Option<Arc<dyn DocumentClient>> = match &config.remote {
            Some(remote_config) => match HttpDocumentClient::new(remote_config) {
                Ok(client) => Some(Arc::new(client) as Arc<dyn DocumentClient>),
                Err(e) => {
                    error!("Failed to build remote store client: {}", e);
                    None
                }
            },
            None => None,
        };
        Self::open_with(config, namespace, remote).await
    }

    pub async fn open_with(
        config: &StorageConfig,
        namespace: BotId,
        remote: Option<Arc<dyn DocumentClient>>,
    ) -> Self {
        let local: Arc<dyn SnapshotBackend> = Arc::new(FileBackend::new(
            &config.sessions_dir,
            Duration::from_millis(config.grace_window_ms()),
        ));

        let remote = match remote {
            Some(client) => match client.ping().await {
                Ok(()) => Some(client),
                Err(e) => {
                    warn!(
                        "Remote snapshot store unreachable, bot {} falls back to local files: {}",
                        namespace, e
                    );
                    None
                }
            },
            None => None,
        };

        let backend: Arc<dyn SnapshotBackend> = match (select_backend(config, remote.is_some()), remote) {
            (BackendKind::RemoteDocument, Some(client)) => {
                let remote: Arc<dyn SnapshotBackend> = Arc::new(
                    DocumentBackend::new(client).with_grace_window(config.grace_window_ms()),
                );
                if let Err(e) = migrate(local.as_ref(), remote.as_ref(), namespace).await {
                    warn!("Legacy snapshot migration for bot {} failed: {}", namespace, e);
                }
                remote
            }
            _ => local,
        };

        info!("Bot {} stores player snapshots in {:?}", namespace, backend.kind());
        Self::new(namespace, backend, config)
    }

    pub fn namespace(&self) -> BotId {
        self.namespace
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Periodic save interval; remote round-trips are spaced further apart.
    pub fn save_interval(&self) -> Duration {
        self.save_interval
    }

    pub async fn get(&self, guild_id: GuildId) -> StoreResult<Option<PlayerSnapshot>> {
        self.backend.get(self.namespace, guild_id).await
    }

    pub async fn put(&self, guild_id: GuildId, snapshot: &PlayerSnapshot) -> StoreResult<()> {
        let result = self.backend.put(self.namespace, guild_id, snapshot).await;
        if let Err(e) = &result {
            error!("[{}] Failed to save player snapshot: {}", guild_id, e);
        }
        result
    }

    pub async fn delete(&self, guild_id: GuildId) -> StoreResult<()> {
        self.backend.delete(self.namespace, guild_id).await
    }

    pub async fn list_all(&self) -> StoreResult<Vec<PlayerSnapshot>> {
        self.backend.list(self.namespace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::types::{ChannelId, UserId},
        configs::RemoteStoreConfig,
        store::memory::MemoryDocumentClient,
    };
    use std::sync::atomic::Ordering;

    const BOT: BotId = UserId(31);

    fn config(dir: &tempfile::TempDir, remote: bool) -> StorageConfig {
        StorageConfig {
            sessions_dir: dir.path().to_string_lossy().into_owned(),
            remote: remote.then(|| RemoteStoreConfig {
                url: "http://unused.invalid".into(),
                database: "pool".into(),
                token: None,
                timeout_ms: 100,
            }),
            ..StorageConfig::default()
        }
    }

    #[test]
    fn selection_is_a_function_of_configuration() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(select_backend(&config(&dir, false), true), BackendKind::LocalFile);
        assert_eq!(select_backend(&config(&dir, true), false), BackendKind::LocalFile);
        assert_eq!(select_backend(&config(&dir, true), true), BackendKind::RemoteDocument);
    }

    #[tokio::test]
    async fn remote_store_absorbs_legacy_local_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, true);

        let legacy = FileBackend::new(dir.path(), Duration::from_secs(3600));
        let mut snapshot = PlayerSnapshot::new(GuildId(8), ChannelId(1), UserId(1));
        snapshot.saved_at = 10;
        legacy.put(BOT, GuildId(8), &snapshot).await.unwrap();

        let client: Arc<dyn DocumentClient> = Arc::new(MemoryDocumentClient::new());
        let store = SessionStore::open_with(&config, BOT, Some(client)).await;
        assert_eq!(store.kind(), BackendKind::RemoteDocument);
        assert_eq!(store.save_interval(), Duration::from_secs(180));
        assert_eq!(store.list_all().await.unwrap(), vec![snapshot]);
        assert!(legacy.list(BOT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_remote_falls_back_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MemoryDocumentClient::new());
        client.reachable.store(false, Ordering::Relaxed);

        let store = SessionStore::open_with(&config(&dir, true), BOT, Some(client as Arc<dyn DocumentClient>)).await;
        assert_eq!(store.kind(), BackendKind::LocalFile);
        assert_eq!(store.save_interval(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn delete_then_get_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open_with(&config(&dir, false), BOT, None).await;

        store.delete(GuildId(1)).await.unwrap();
        assert!(store.get(GuildId(1)).await.unwrap().is_none());

        let snapshot = PlayerSnapshot::new(GuildId(1), ChannelId(1), UserId(1));
        store.put(GuildId(1), &snapshot).await.unwrap();
        store.delete(GuildId(1)).await.unwrap();
        assert!(store.get(GuildId(1)).await.unwrap().is_none());
    }
}
