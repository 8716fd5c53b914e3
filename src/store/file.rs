use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{RateLimitState, RateLimitStore, StoreError};

#[derive(Serialize, Deserialize)]
struct Record {
    state: RateLimitState,
    expires_at: DateTime<Utc>,
}

/// Directory-backed store: one JSON file per key.
///
/// Any process pointed at the same directory shares the state. Writes land in
/// a temp file first and are renamed into place, so a reader sees either the
/// old record or the new one.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Percent-encoded key, so distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

#[async_trait]
impl RateLimitStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitState>, StoreError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: Record = match serde_json::from_slice(&bytes) {
            Ok(r) => r,
            Err(e) => {
                debug!("ignoring undecodable rate limit file {}: {}", path.display(), e);
                return Ok(None);
            }
        };
        if record.expires_at <= Utc::now() {
            self.delete(key).await?;
            return Ok(None);
        }
        Ok(Some(record.state))
    }

    async fn set(
        &self,
        key: &str,
        state: &RateLimitState,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| StoreError::Unavailable(format!("ttl out of range: {ttl:?}")))?;
        let record = Record {
            state: state.clone(),
            expires_at,
        };
        let payload = serde_json::to_vec(&record)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, payload).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
