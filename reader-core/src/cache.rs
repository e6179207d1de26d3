use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::CacheError;

/// Key-value blob store the feed state is persisted into.
#[async_trait]
pub trait BlobCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores `bytes` under `key`, overwriting prior contents.
    async fn insert(&self, key: &str, bytes: Vec<u8>) -> Result<(), CacheError>;

    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;
}

pub async fn get_object<T>(cache: &dyn BlobCache, key: &str) -> Result<Option<T>, CacheError>
where
    T: DeserializeOwned,
{
    match cache.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub async fn insert_object<T>(cache: &dyn BlobCache, key: &str, value: &T) -> Result<(), CacheError>
where
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value)?;
    cache.insert(key, bytes).await
}

/// Returns the value stored under `key`, or stores and returns `create()` when absent.
pub async fn get_or_create_object<T, F>(
    cache: &dyn BlobCache,
    key: &str,
    create: F,
) -> Result<T, CacheError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    if let Some(existing) = get_object(cache, key).await? {
        return Ok(existing);
    }
    let value = create();
    insert_object(cache, key, &value).await?;
    debug!(key, "stored default value");
    Ok(value)
}

#[derive(Debug, Default)]
pub struct InMemoryBlobCache {
    inner: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobCache for InMemoryBlobCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn insert(&self, key: &str, bytes: Vec<u8>) -> Result<(), CacheError> {
        self.inner.write().await.insert(key.to_owned(), bytes);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.inner.write().await.remove(key);
        Ok(())
    }
}

/// One JSON document per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileBlobCache {
    dir: PathBuf,
}

impl FileBlobCache {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        self.entry_path(key).with_extension("json.tmp")
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn is_json(bytes: &[u8]) -> bool {
    serde_json::from_slice::<serde::de::IgnoredAny>(bytes).is_ok()
}

#[async_trait]
impl BlobCache for FileBlobCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(key);
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(None);
        };
        if is_json(&bytes) {
            return Ok(Some(bytes));
        }

        warn!(path = %path.display(), "cache entry is not valid JSON, trying tmp fallback");
        match read_optional(&self.tmp_path(key)).await? {
            Some(tmp_bytes) if is_json(&tmp_bytes) => Ok(Some(tmp_bytes)),
            _ => Err(CacheError::Corrupted { key: key.to_owned() }),
        }
    }

    async fn insert(&self, key: &str, bytes: Vec<u8>) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        // Atomic write: tmp file then rename over the entry.
        let tmp = self.tmp_path(key);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, self.entry_path(key)).await?;
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        for path in [self.entry_path(key), self.tmp_path(key)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
