// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media store for inbound attachments.
//!
//! Files are written as `<uuid>.<ext>` into either a persistent folder
//! (kept forever) or a private directory swept after a TTL.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wabridge_config::MediaConfig;
use wabridge_core::{BridgeError, MediaRef, RawMedia};

/// Writes downloaded attachments to disk and maps them to public URLs.
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
    persistent: bool,
    base_url: String,
    ttl: Duration,
}

fn media_err(context: &str, e: std::io::Error) -> BridgeError {
    BridgeError::Media(format!("{context}: {e}"))
}

impl MediaStore {
    /// Opens the store, creating its directory. `base_url` is the bridge's
    /// externally reachable URL without trailing slash.
    pub async fn new(config: &MediaConfig, base_url: &str) -> Result<Self, BridgeError> {
        let (dir, persistent) = match &config.folder {
            Some(folder) => (PathBuf::from(folder), true),
            None => (PathBuf::from(&config.private_dir), false),
        };
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| media_err("failed to create media directory", e))?;
        info!(dir = %dir.display(), persistent, "media store ready");
        Ok(Self {
            dir,
            persistent,
            base_url: base_url.trim_end_matches('/').to_string(),
            ttl: Duration::from_secs(config.ttl_secs),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Persists one attachment.
    pub async fn save(&self, bytes: &[u8], media: &RawMedia) -> Result<MediaRef, BridgeError> {
        let ext = extension_for(&media.mime_type, media.file_name.as_deref());
        let file = format!("{}.{ext}", uuid::Uuid::new_v4());
        let local_path = self.dir.join(&file);
        tokio::fs::write(&local_path, bytes)
            .await
            .map_err(|e| media_err("failed to write media file", e))?;
        debug!(file = %file, size = bytes.len(), mime = %media.mime_type, "saved media");
        Ok(MediaRef {
            url: format!("{}/media/{file}", self.base_url),
            file,
            local_path,
            mime_type: media.mime_type.clone(),
            size: bytes.len() as u64,
        })
    }

    /// Maps a file name from a media URL back to its path. Rejects anything
    /// that could escape the media directory.
    pub fn resolve(&self, file: &str) -> Option<PathBuf> {
        let valid = !file.is_empty()
            && !file.starts_with('.')
            && file
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_');
        valid.then(|| self.dir.join(file))
    }

    /// Deletes files older than the TTL. A persistent folder is never swept.
    pub async fn sweep(&self, now: SystemTime) -> Result<usize, BridgeError> {
        if self.persistent {
            return Ok(0);
        }
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| media_err("failed to list media directory", e))?;
        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| media_err("failed to list media directory", e))?
        {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let expired = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > self.ttl);
            if !expired {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to delete expired media"),
            }
        }
        if removed > 0 {
            info!(removed, "swept expired media");
        }
        Ok(removed)
    }

    /// Runs [`sweep`](Self::sweep) every `interval` until cancelled.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if self.persistent {
            return None;
        }
        let store = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = store.sweep(SystemTime::now()).await {
                            warn!(error = %e, "media sweep failed");
                        }
                    }
                }
            }
            debug!("media sweeper stopped");
        }))
    }
}

fn file_extension(file_name: Option<&str>) -> Option<String> {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
}

/// File extension for a MIME type.
///
/// The original file name wins when its extension agrees with the MIME type
/// or the type is unspecific. Otherwise the extension matching the MIME
/// subtype is preferred, then the first one `mime_guess` knows.
pub fn extension_for(mime_type: &str, file_name: Option<&str>) -> String {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let original = file_name_extension_for(&essence, file_extension(file_name));
    if let Some(ext) = original {
        return ext;
    }

    let subtype = essence.split('/').nth(1).unwrap_or_default();
    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|exts| exts.iter().find(|e| **e == subtype).or(exts.first()))
        .map(|ext| (*ext).to_string())
        .or_else(|| file_extension(file_name))
        .unwrap_or_else(|| "bin".to_string())
}

fn file_name_extension_for(essence: &str, ext: Option<String>) -> Option<String> {
    let ext = ext?;
    let unspecific = essence.is_empty() || essence == "application/octet-stream";
    let agrees = mime_guess::from_ext(&ext)
        .iter()
        .any(|guess| guess.essence_str() == essence);
    (unspecific || agrees).then_some(ext)
}

/// MIME type served for a stored file, guessed from its extension.
pub fn content_type_for(file: &str) -> String {
    mime_guess::from_path(file)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
