use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::info;
use uuid::Uuid;

pub const VOICE_FILE_NAME: &str = "voice.mp3";
pub const BACKGROUND_FILE_NAME: &str = "background.mp4";

pub async fn ensure_storage_root(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create storage root at {}", path.display()))
}

pub fn job_dir(storage_root: &Path, job_id: &str) -> PathBuf {
    storage_root.join(job_id)
}

pub fn voice_path(storage_root: &Path, job_id: &str) -> PathBuf {
    job_dir(storage_root, job_id).join(VOICE_FILE_NAME)
}

pub fn background_path(storage_root: &Path, job_id: &str) -> PathBuf {
    job_dir(storage_root, job_id).join(BACKGROUND_FILE_NAME)
}

pub fn video_file_name(job_id: &str) -> String {
    format!("{job_id}.mp4")
}

pub fn video_path(storage_root: &Path, job_id: &str) -> PathBuf {
    job_dir(storage_root, job_id).join(video_file_name(job_id))
}

pub fn result_location(job_id: &str) -> String {
    format!("/videos/{}", video_file_name(job_id))
}

/// Resolves a requested `<uuid>.mp4` download name to its on-disk path.
///
/// Anything that is not a bare UUID with an `.mp4` suffix yields `None`,
/// which keeps path traversal out by construction.
pub fn resolve_video_request(storage_root: &Path, file_name: &str) -> Option<PathBuf> {
    let stem = file_name.strip_suffix(".mp4")?;
    let job_id = Uuid::parse_str(stem).ok()?.to_string();
    Some(video_path(storage_root, &job_id))
}

pub async fn ensure_job_dir(storage_root: &Path, job_id: &str) -> Result<PathBuf> {
    let dir = job_dir(storage_root, job_id);
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create job directory {}", dir.display()))?;
    Ok(dir)
}

pub async fn delete_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("Failed to delete {}", path.display())),
    }
}

/// Downloads the background clip from `url` unless `path` already exists.
///
/// Returns whether a download happened. The body lands in a sibling
/// `.partial` file first so an interrupted fetch never looks like a clip.
pub async fn fetch_background_if_missing(path: &Path, url: &str) -> Result<bool> {
    if fs::try_exists(path).await.unwrap_or(false) {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    info!(url = %url, path = %path.display(), "Downloading background video");
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("Failed to request background video from {url}"))?
        .error_for_status()
        .context("Background video download was rejected")?;
    let bytes = response
        .bytes()
        .await
        .context("Failed to read background video body")?;
    if bytes.is_empty() {
        anyhow::bail!("Background video download from {url} was empty");
    }

    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);
    fs::write(&partial, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    fs::rename(&partial, path)
        .await
        .with_context(|| format!("Failed to move background video into {}", path.display()))?;

    info!(size_bytes = bytes.len(), "Background video downloaded");
    Ok(true)
}
