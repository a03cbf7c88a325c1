use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use super::key::{CacheKey, CacheMetadata};
use crate::ReelError;

const BODY_EXT: &str = "bin";
const SIDECAR_EXT: &str = "json";
const TMP_EXT: &str = "tmp";

/// JSON document stored next to each body file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Sidecar {
    pub key: CacheKey,
    pub metadata: CacheMetadata,
}

/// An entry found while re-indexing the cache directory.
pub(crate) struct ScannedEntry {
    pub digest: String,
    pub sidecar: Sidecar,
    pub body_len: u64,
}

/// Flat directory of `<digest>.bin` bodies and `<digest>.json` sidecars.
#[derive(Debug)]
pub(crate) struct DiskStore {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl DiskStore {
    pub async fn open(dir: &Path) -> Result<Self, ReelError> {
        fs::create_dir_all(dir).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            tmp_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, digest: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{digest}.{ext}"))
    }

    /// Write body then sidecar, each through a temporary file and a rename.
    pub async fn write(&self, digest: &str, sidecar: &Sidecar, body: &[u8]) -> Result<(), ReelError> {
        let body_path = self.path(digest, BODY_EXT);
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!("{digest}.{seq}.{TMP_EXT}"));
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &body_path).await?;

        let json = serde_json::to_vec(sidecar)?;
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, self.path(digest, SIDECAR_EXT)).await?;
        Ok(())
    }

    pub async fn read_body(&self, digest: &str) -> Result<Option<Bytes>, ReelError> {
        match fs::read(self.path(digest, BODY_EXT)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn remove(&self, digest: &str) -> Result<(), ReelError> {
        for ext in [SIDECAR_EXT, BODY_EXT] {
            match fs::remove_file(self.path(digest, ext)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Load every sidecar whose body file is present.
    ///
    /// Unreadable sidecars and orphaned files are deleted.
    pub async fn scan(&self) -> Result<Vec<ScannedEntry>, ReelError> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let Some(digest) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match ext {
                SIDECAR_EXT => {}
                TMP_EXT => {
                    let _ = fs::remove_file(&path).await;
                    continue;
                }
                BODY_EXT => {
                    if !fs::try_exists(self.path(digest, SIDECAR_EXT)).await? {
                        debug!(path = %path.display(), "Removing orphaned cache body");
                        let _ = fs::remove_file(&path).await;
                    }
                    continue;
                }
                _ => continue,
            }

            let sidecar = match fs::read(&path).await {
                Ok(raw) => serde_json::from_slice::<Sidecar>(&raw),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read cache sidecar");
                    continue;
                }
            };

            let sidecar = match sidecar {
                Ok(sidecar) => sidecar,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Dropping unreadable cache sidecar");
                    self.remove(digest).await?;
                    continue;
                }
            };

            match fs::metadata(self.path(digest, BODY_EXT)).await {
                Ok(meta) => entries.push(ScannedEntry {
                    digest: digest.to_string(),
                    sidecar,
                    body_len: meta.len(),
                }),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    self.remove(digest).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(entries)
    }

    /// Delete every cache file in the directory, including ones not indexed.
    pub async fn remove_all(&self) -> Result<(), ReelError> {
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let ours = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| matches!(ext, BODY_EXT | SIDECAR_EXT | TMP_EXT));
            if ours {
                match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}
