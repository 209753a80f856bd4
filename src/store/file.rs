use std::{
    collections::BTreeSet,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{BackendKind, SnapshotBackend};
use crate::{
    common::{
        errors::StoreResult,
        types::{BotId, GuildId},
    },
    snapshot::{self, PlayerSnapshot},
};

const PRIMARY_EXT: &str = "snapshot";
const BACKUP_EXT: &str = "snapshot.bak";
const TEMP_DIR: &str = ".tmp";

/// Local file backend.
///
/// Layout:
/// ```text
/// root/
///   {bot_id}/
///     {guild_id}.snapshot      current generation (gzip json)
///     {guild_id}.snapshot.bak  previous generation
///     .tmp/{guild_id}.{uuid}.tmp  in-progress writes
/// ```
///
/// A write lands in its own temp file first. Only once that file is
/// fully written and synced does the old primary rotate into `.bak` and the
/// temp file take its place, so at least one readable generation is on disk
/// at every point of a write.
pub struct FileBackend {
    root: PathBuf,
    grace_window: Duration,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>, grace_window: Duration) -> Self {
        Self {
            root: root.into(),
            grace_window,
        }
    }

    fn namespace_dir(&self, namespace: BotId) -> PathBuf {
        self.root.join(namespace.to_string())
    }

    fn path(&self, namespace: BotId, key: GuildId, ext: &str) -> PathBuf {
        self.namespace_dir(namespace).join(format!("{}.{}", key, ext))
    }

    fn temp_dir(&self, namespace: BotId) -> PathBuf {
        self.namespace_dir(namespace).join(TEMP_DIR)
    }

    fn temp_path(&self, namespace: BotId, key: GuildId) -> PathBuf {
        self.temp_dir(namespace)
            .join(format!("{}.{}.tmp", key, Uuid::new_v4()))
    }

    async fn write_temp(path: &Path, blob: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(path).await?;
        file.write_all(blob).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Puts the backup generation back in place when the primary is gone or
    /// unreadable after a failed write.
    async fn restore_from_backup(&self, namespace: BotId, key: GuildId) {
        let primary = self.path(namespace, key, PRIMARY_EXT);
        let backup = self.path(namespace, key, BACKUP_EXT);

        let primary_ok = match fs::read(&primary).await {
            Ok(blob) => snapshot::decode(&blob).is_ok(),
            Err(_) => false,
        };
        if primary_ok || !fs::try_exists(&backup).await.unwrap_or(false) {
            return;
        }

        match fs::copy(&backup, &primary).await {
            Ok(_) => warn!("[{}] Restored snapshot from backup generation", key),
            Err(e) => warn!("[{}] Failed to restore snapshot from backup: {}", key, e),
        }
    }

    async fn read_generation(path: &Path) -> StoreResult<Option<PlayerSnapshot>> {
        match fs::read(path).await {
            Ok(blob) => snapshot::decode(&blob).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Age check for an undecodable entry, by whichever generation is on
    /// disk (primary first).
    async fn corrupt_entry_expired(&self, namespace: BotId, key: GuildId) -> bool {
        let primary = self.path(namespace, key, PRIMARY_EXT);
        if fs::try_exists(&primary).await.unwrap_or(false) {
            return self.is_older_than_grace(&primary).await;
        }
        self.is_older_than_grace(&self.path(namespace, key, BACKUP_EXT))
            .await
    }

    /// Removes temp files left behind by writes that never finished.
    async fn sweep_stale_temps(&self, namespace: BotId) {
        let Ok(mut entries) = fs::read_dir(self.temp_dir(namespace)).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if self.is_older_than_grace(&path).await {
                if let Err(e) = fs::remove_file(&path).await {
                    debug!("Could not remove stale temp file {}: {}", path.display(), e);
                }
            }
        }
    }

    async fn is_older_than_grace(&self, path: &Path) -> bool {
        let Ok(metadata) = fs::metadata(path).await else {
            return false;
        };
        metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > self.grace_window)
    }
}

async fn remove_if_exists(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl SnapshotBackend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LocalFile
    }

    async fn get(&self, namespace: BotId, key: GuildId) -> StoreResult<Option<PlayerSnapshot>> {
        let primary_err = match Self::read_generation(&self.path(namespace, key, PRIMARY_EXT)).await {
            Ok(Some(snapshot)) => return Ok(Some(snapshot)),
            Ok(None) => None,
            Err(e) => {
                warn!("[{}] Primary snapshot unreadable, trying backup: {}", key, e);
                Some(e)
            }
        };

        match Self::read_generation(&self.path(namespace, key, BACKUP_EXT)).await? {
            Some(snapshot) => Ok(Some(snapshot)),
            None => match primary_err {
                Some(e) => Err(e),
                None => Ok(None),
            },
        }
    }

    async fn put(&self, namespace: BotId, key: GuildId, snapshot: &PlayerSnapshot) -> StoreResult<()> {
        let blob = snapshot::encode(snapshot)?;

        fs::create_dir_all(self.namespace_dir(namespace)).await?;
        let primary = self.path(namespace, key, PRIMARY_EXT);
        let backup = self.path(namespace, key, BACKUP_EXT);
        let temp = self.temp_path(namespace, key);

        let written = match fs::create_dir_all(self.temp_dir(namespace)).await {
            Ok(()) => Self::write_temp(&temp, &blob).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            self.restore_from_backup(namespace, key).await;
            return Err(e.into());
        }

        if fs::try_exists(&primary).await.unwrap_or(false) {
            if let Err(e) = fs::rename(&primary, &backup).await {
                let _ = fs::remove_file(&temp).await;
                return Err(e.into());
            }
        }

        if let Err(e) = fs::rename(&temp, &primary).await {
            self.restore_from_backup(namespace, key).await;
            return Err(e.into());
        }

        debug!("[{}] Snapshot written ({} bytes)", key, blob.len());
        Ok(())
    }

    async fn delete(&self, namespace: BotId, key: GuildId) -> StoreResult<()> {
        remove_if_exists(&self.path(namespace, key, PRIMARY_EXT)).await?;
        remove_if_exists(&self.path(namespace, key, BACKUP_EXT)).await?;
        Ok(())
    }

    async fn list(&self, namespace: BotId) -> StoreResult<Vec<PlayerSnapshot>> {
        let dir = self.namespace_dir(namespace);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let stem = name
                .strip_suffix(&format!(".{}", PRIMARY_EXT))
                .or_else(|| name.strip_suffix(&format!(".{}", BACKUP_EXT)));
            if let Some(key) = stem.and_then(|s| s.parse::<GuildId>().ok()) {
                keys.insert(key);
            }
        }

        let mut snapshots = Vec::with_capacity(keys.len());
        for key in keys {
            match self.get(namespace, key).await {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => {}
                Err(e) => {
                    warn!("[{}] Skipping undecodable snapshot: {}", key, e);
                    if self.corrupt_entry_expired(namespace, key).await {
                        warn!("[{}] Deleting undecodable snapshot past the grace window", key);
                        if let Err(e) = self.delete(namespace, key).await {
                            warn!("[{}] Failed to delete undecodable snapshot: {}", key, e);
                        }
                    }
                }
            }
        }
        self.sweep_stale_temps(namespace).await;
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::types::{ChannelId, UserId},
        snapshot::{LoopMode, PlaylistRef, TrackRecord},
    };
    use tempfile::TempDir;

    const BOT: BotId = UserId(900);

    fn backend(dir: &TempDir) -> FileBackend {
        FileBackend::new(dir.path(), Duration::from_secs(48 * 3600))
    }

    fn squat_temp_dir(store: &FileBackend) {
        let temp_dir = store.temp_dir(BOT);
        let _ = std::fs::remove_dir_all(&temp_dir);
        std::fs::write(&temp_dir, b"in the way").unwrap();
    }

    fn backdate(path: &Path, by: Duration) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - by)
            .unwrap();
    }

    fn snapshot(guild: u64, volume: u16) -> PlayerSnapshot {
        let mut snapshot = PlayerSnapshot::new(GuildId(guild), ChannelId(1), UserId(2));
        snapshot.volume = volume;
        snapshot.saved_at = 1_000;
        snapshot
    }

    #[tokio::test]
    async fn put_then_get_returns_the_same_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir);

        let mut written = snapshot(1, 70);
        written.loop_mode = LoopMode::Queue;
        written.queue.push(TrackRecord {
            id: uuid::Uuid::new_v4(),
            source_id: "x1".into(),
            title: "First".into(),
            url: "https://example.invalid/x1".into(),
            duration_ms: 200_000,
            is_stream: false,
            requester: UserId(5),
            playlist: Some(PlaylistRef {
                name: "Mix".into(),
                url: "https://example.invalid/list".into(),
            }),
        });
        written.position = 12_000;

        store.put(BOT, GuildId(1), &written).await.unwrap();
        let read = store.get(BOT, GuildId(1)).await.unwrap();
        assert_eq!(read, Some(written));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir);

        store.delete(BOT, GuildId(3)).await.unwrap();
        assert!(store.get(BOT, GuildId(3)).await.unwrap().is_none());

        store.put(BOT, GuildId(3), &snapshot(3, 50)).await.unwrap();
        store.put(BOT, GuildId(3), &snapshot(3, 60)).await.unwrap();
        store.delete(BOT, GuildId(3)).await.unwrap();
        assert!(store.get(BOT, GuildId(3)).await.unwrap().is_none());
        assert!(!store.path(BOT, GuildId(3), BACKUP_EXT).exists());
    }

    #[tokio::test]
    async fn interrupted_write_keeps_the_previous_generation() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir);

        store.put(BOT, GuildId(4), &snapshot(4, 40)).await.unwrap();

        // A file squatting on the temp directory makes the next write fail.
        squat_temp_dir(&store);
        let result = store.put(BOT, GuildId(4), &snapshot(4, 99)).await;
        assert!(result.is_err());

        let read = store.get(BOT, GuildId(4)).await.unwrap().unwrap();
        assert_eq!(read.volume, 40);
    }

    #[tokio::test]
    async fn corrupt_primary_falls_back_to_backup() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir);

        store.put(BOT, GuildId(5), &snapshot(5, 10)).await.unwrap();
        store.put(BOT, GuildId(5), &snapshot(5, 20)).await.unwrap();
        std::fs::write(store.path(BOT, GuildId(5), PRIMARY_EXT), b"truncated").unwrap();

        let read = store.get(BOT, GuildId(5)).await.unwrap().unwrap();
        assert_eq!(read.volume, 10);
    }

    #[tokio::test]
    async fn failed_write_restores_a_truncated_primary() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir);

        store.put(BOT, GuildId(6), &snapshot(6, 10)).await.unwrap();
        store.put(BOT, GuildId(6), &snapshot(6, 20)).await.unwrap();
        std::fs::write(store.path(BOT, GuildId(6), PRIMARY_EXT), b"").unwrap();
        squat_temp_dir(&store);

        assert!(store.put(BOT, GuildId(6), &snapshot(6, 30)).await.is_err());

        let blob = std::fs::read(store.path(BOT, GuildId(6), PRIMARY_EXT)).unwrap();
        assert_eq!(snapshot::decode(&blob).unwrap().volume, 10);
    }

    #[tokio::test]
    async fn list_is_scoped_to_the_namespace_and_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir);

        store.put(BOT, GuildId(7), &snapshot(7, 1)).await.unwrap();
        store.put(BOT, GuildId(8), &snapshot(8, 1)).await.unwrap();
        store.put(UserId(901), GuildId(9), &snapshot(9, 1)).await.unwrap();
        std::fs::write(store.path(BOT, GuildId(10), PRIMARY_EXT), b"junk").unwrap();
        std::fs::write(store.namespace_dir(BOT).join("notes.txt"), b"hi").unwrap();

        let listed: Vec<GuildId> = store
            .list(BOT)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.guild_id)
            .collect();
        assert_eq!(listed, vec![GuildId(7), GuildId(8)]);
        assert!(store.list(UserId(555)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn writes_use_distinct_temp_files_and_leave_none_behind() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir);

        assert_ne!(store.temp_path(BOT, GuildId(1)), store.temp_path(BOT, GuildId(1)));
        store.put(BOT, GuildId(1), &snapshot(1, 10)).await.unwrap();
        store.put(BOT, GuildId(1), &snapshot(1, 20)).await.unwrap();
        assert_eq!(std::fs::read_dir(store.temp_dir(BOT)).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn corrupt_entries_are_removed_after_the_grace_window() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir);
        let old = Duration::from_secs(49 * 3600);

        store.put(BOT, GuildId(1), &snapshot(1, 10)).await.unwrap();

        // both generations corrupt and old
        let primary = store.path(BOT, GuildId(2), PRIMARY_EXT);
        let backup = store.path(BOT, GuildId(2), BACKUP_EXT);
        std::fs::write(&primary, b"junk").unwrap();
        std::fs::write(&backup, b"junk").unwrap();
        backdate(&primary, old);
        backdate(&backup, old);

        // only a corrupt backup, old
        let lone_backup = store.path(BOT, GuildId(3), BACKUP_EXT);
        std::fs::write(&lone_backup, b"junk").unwrap();
        backdate(&lone_backup, old);

        // corrupt but recent
        let recent = store.path(BOT, GuildId(4), PRIMARY_EXT);
        std::fs::write(&recent, b"junk").unwrap();

        let listed: Vec<GuildId> = store
            .list(BOT)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.guild_id)
            .collect();
        assert_eq!(listed, vec![GuildId(1)]);
        assert!(!primary.exists());
        assert!(!backup.exists());
        assert!(!lone_backup.exists());
        assert!(recent.exists());
    }

    #[tokio::test]
    async fn failed_cleanup_does_not_hide_other_snapshots() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir);

        store.put(BOT, GuildId(1), &snapshot(1, 10)).await.unwrap();
        let primary = store.path(BOT, GuildId(5), PRIMARY_EXT);
        std::fs::write(&primary, b"junk").unwrap();
        backdate(&primary, Duration::from_secs(49 * 3600));
        // a directory where the backup should be cannot be removed as a file
        std::fs::create_dir_all(store.path(BOT, GuildId(5), BACKUP_EXT)).unwrap();

        let listed = store.list(BOT).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].guild_id, GuildId(1));
    }

    #[tokio::test]
    async fn stale_temp_files_are_swept() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir);

        store.put(BOT, GuildId(1), &snapshot(1, 10)).await.unwrap();
        let stale = store.temp_dir(BOT).join("1.leftover.tmp");
        let fresh = store.temp_dir(BOT).join("1.writing.tmp");
        std::fs::write(&stale, b"partial").unwrap();
        std::fs::write(&fresh, b"partial").unwrap();
        backdate(&stale, Duration::from_secs(49 * 3600));

        store.list(BOT).await.unwrap();
        assert!(!stale.exists());
        assert!(fresh.exists());
    }
}
