#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reader_core::{BlobCache, CacheError, FeedItem, InMemoryBlobCache, TriggerError};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn temp_dir(prefix: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "{}_{}_{}_{}",
        prefix,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis()
    ));
    dir
}

/// How a probe blog behaves when asked to refresh.
#[derive(Debug, Clone, Default)]
pub enum ProbeBehavior {
    #[default]
    Record,
    /// Records the trigger, then finishes its own work after `Duration`.
    Slow(Duration),
    /// Cannot even issue a refresh.
    RefuseTrigger,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeBlog {
    pub name: String,
    #[serde(skip)]
    pub triggers: Option<mpsc::UnboundedSender<String>>,
    #[serde(skip)]
    pub completions: Option<mpsc::UnboundedSender<String>>,
    #[serde(skip)]
    pub behavior: ProbeBehavior,
}

impl PartialEq for ProbeBlog {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl ProbeBlog {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn recording(name: &str, triggers: &mpsc::UnboundedSender<String>) -> Self {
        Self {
            name: name.to_owned(),
            triggers: Some(triggers.clone()),
            ..Default::default()
        }
    }

    pub fn with_behavior(mut self, behavior: ProbeBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_completions(mut self, completions: &mpsc::UnboundedSender<String>) -> Self {
        self.completions = Some(completions.clone());
        self
    }
}

impl FeedItem for ProbeBlog {
    fn refresh(&self) -> Result<(), TriggerError> {
        if let ProbeBehavior::RefuseTrigger = self.behavior {
            return Err(TriggerError::Unavailable {
                item: self.name.clone(),
                reason: "refresh queue closed".into(),
            });
        }
        if let Some(tx) = &self.triggers {
            let _ = tx.send(self.name.clone());
        }
        let delay = match self.behavior {
            ProbeBehavior::Slow(delay) => delay,
            _ => Duration::ZERO,
        };
        let name = self.name.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = completions {
                let _ = tx.send(name);
            }
        });
        Ok(())
    }
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(name) = rx.try_recv() {
        out.push(name);
    }
    out
}

/// In-memory cache that remembers every insert and when it happened.
#[derive(Debug, Default)]
pub struct RecordingCache {
    inner: InMemoryBlobCache,
    pub inserts: Mutex<Vec<(String, Instant, Vec<u8>)>>,
    pub reads: AtomicUsize,
}

impl RecordingCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert_count(&self) -> usize {
        self.inserts.lock().await.len()
    }

    /// Names stored by the `n`th insert.
    pub async fn names_at(&self, n: usize) -> Vec<String> {
        let inserts = self.inserts.lock().await;
        let blogs: Vec<ProbeBlog> = serde_json::from_slice(&inserts[n].2).unwrap();
        blogs.into_iter().map(|b| b.name).collect()
    }

    pub async fn insert_time(&self, n: usize) -> Instant {
        self.inserts.lock().await[n].1
    }
}

#[async_trait]
impl BlobCache for RecordingCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn insert(&self, key: &str, bytes: Vec<u8>) -> Result<(), CacheError> {
        self.inserts
            .lock()
            .await
            .push((key.to_owned(), Instant::now(), bytes.clone()));
        self.inner.insert(key, bytes).await
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.inner.invalidate(key).await
    }
}

/// Cache whose reads and/or writes always fail.
#[derive(Debug, Default)]
pub struct BrokenCache {
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub write_attempts: AtomicUsize,
    pub inner: InMemoryBlobCache,
}

fn broken() -> CacheError {
    CacheError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk unplugged"))
}

#[async_trait]
impl BlobCache for BrokenCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        if self.fail_reads {
            return Err(broken());
        }
        self.inner.get(key).await
    }

    async fn insert(&self, key: &str, bytes: Vec<u8>) -> Result<(), CacheError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(broken());
        }
        self.inner.insert(key, bytes).await
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.inner.invalidate(key).await
    }
}
