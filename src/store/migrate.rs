use std::collections::HashMap;

use tracing::{info, warn};

use super::SnapshotBackend;
use crate::common::{errors::StoreResult, types::BotId};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    /// Copied into the target.
    pub migrated: usize,
    /// Dropped because the target already held a copy at least as new.
    pub superseded: usize,
    /// Left in the source because the target write failed.
    pub failed: usize,
}

/// Moves every snapshot of `namespace` from `from` into `to`.
///
/// When both hold the same guild, the newer `saved_at` wins and ties go to
/// the target. A source entry is deleted only once the target holds a copy
/// at least as new as it.
pub async fn migrate(
    from: &dyn SnapshotBackend,
    to: &dyn SnapshotBackend,
    namespace: BotId,
) -> StoreResult<MigrationReport> {
    let mut report = MigrationReport::default();

    let sources = from.list(namespace).await?;
    if sources.is_empty() {
        return Ok(report);
    }

    let existing: HashMap<_, _> = to
        .list(namespace)
        .await?
        .into_iter()
        .map(|s| (s.guild_id, s.saved_at))
        .collect();

    for snapshot in sources {
        let guild_id = snapshot.guild_id;
        let superseded = existing
            .get(&guild_id)
            .is_some_and(|&target_saved_at| target_saved_at >= snapshot.saved_at);

        if superseded {
            report.superseded += 1;
        } else if let Err(e) = to.put(namespace, guild_id, &snapshot).await {
            warn!("[{}] Failed to migrate snapshot, keeping source copy: {}", guild_id, e);
            report.failed += 1;
            continue;
        } else {
            report.migrated += 1;
        }

        if let Err(e) = from.delete(namespace, guild_id).await {
            warn!("[{}] Migrated snapshot could not be removed from source: {}", guild_id, e);
        }
    }

    info!(
        "Migrated snapshots of bot {} from {:?} to {:?}: {:?}",
        namespace,
        from.kind(),
        to.kind(),
        report
    );
    Ok(report)
}
