//! Periodic cleanup of expired artifacts and finished job records.
//!
//! Coordination with in-flight jobs is by age only: anything younger than
//! the retention window is left alone.

use std::{
    collections::HashSet,
    io::ErrorKind,
    path::Path,
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::{fs, task::JoinHandle, time};
use tracing::{info, warn};

use crate::{config::Config, job_store::JobStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub files_deleted: usize,
    pub bytes_freed: u64,
    pub dirs_removed: usize,
}

/// Deletes every file under `root` last modified more than `retention`
/// before `now`, then drops directories left empty by the sweep.
///
/// A missing root is an empty sweep. Files vanishing mid-sweep are skipped.
pub async fn sweep(root: &Path, retention: Duration, now: SystemTime) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    if !fs::try_exists(root).await.unwrap_or(false) {
        return Ok(report);
    }

    let mut pending = vec![root.to_path_buf()];
    let mut visited_dirs = Vec::new();
    let mut touched_dirs = HashSet::new();

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("Failed reading {}", dir.display()))
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            if metadata.is_dir() {
                pending.push(path);
                continue;
            }
            if !is_expired(metadata.modified().ok(), retention, now) {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => {
                    report.files_deleted += 1;
                    report.bytes_freed += metadata.len();
                    touched_dirs.insert(dir.clone());
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!("Failed to delete expired artifact {}: {err}", path.display()),
            }
        }

        if dir != root {
            visited_dirs.push(dir);
        }
    }

    // Children were discovered after their parents.
    for dir in visited_dirs.into_iter().rev() {
        let stale = touched_dirs.contains(&dir)
            || is_expired(
                fs::metadata(&dir).await.ok().and_then(|m| m.modified().ok()),
                retention,
                now,
            );
        if stale && remove_if_empty(&dir).await {
            report.dirs_removed += 1;
            if let Some(parent) = dir.parent() {
                touched_dirs.insert(parent.to_path_buf());
            }
        }
    }

    Ok(report)
}

fn is_expired(modified: Option<SystemTime>, retention: Duration, now: SystemTime) -> bool {
    modified
        .and_then(|m| now.duration_since(m).ok())
        .is_some_and(|age| age > retention)
}

async fn remove_if_empty(dir: &Path) -> bool {
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return false;
    };
    if !matches!(entries.next_entry().await, Ok(None)) {
        return false;
    }
    fs::remove_dir(dir).await.is_ok()
}

fn retention_cutoff(now: DateTime<Utc>, retention: Duration) -> Option<DateTime<Utc>> {
    let retention = chrono::Duration::from_std(retention).ok()?;
    now.checked_sub_signed(retention)
}

/// Runs one artifact sweep and one job-record eviction.
pub async fn run_cleanup(
    store: &JobStore,
    storage_root: &Path,
    retention: Duration,
    job_retention: Duration,
) -> Result<SweepReport> {
    let report = sweep(storage_root, retention, SystemTime::now()).await?;

    let evicted = match retention_cutoff(Utc::now(), job_retention) {
        Some(cutoff) => store.evict_terminal_before(cutoff).await,
        None => 0,
    };

    if report.files_deleted > 0 || evicted > 0 {
        info!(
            files_deleted = report.files_deleted,
            bytes_freed = report.bytes_freed,
            dirs_removed = report.dirs_removed,
            jobs_evicted = evicted,
            "Cleanup sweep finished"
        );
    }
    Ok(report)
}

pub fn spawn_cleanup_worker(store: JobStore, config: &Config) -> JoinHandle<()> {
    let storage_root = config.storage_root.clone();
    let period = config.cleanup_interval;
    let retention = config.retention;
    let job_retention = config.job_retention;

    tokio::spawn(async move {
        let mut interval = time::interval(period);
        loop {
            interval.tick().await;
            if let Err(err) = run_cleanup(&store, &storage_root, retention, job_retention).await {
                warn!("Cleanup worker error: {err:#}");
            }
        }
    })
}
