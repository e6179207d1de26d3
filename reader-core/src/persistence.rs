use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::cache::{insert_object, BlobCache};
use crate::collection::{FeedCollection, FeedItem};
use crate::error::TaskError;

/// Writes the collection back to the cache once replacements have been quiet
/// for a full window. Every replacement restarts the window.
pub struct PersistenceDebouncer;

impl PersistenceDebouncer {
    pub fn spawn<T: FeedItem>(
        blogs: watch::Receiver<FeedCollection<T>>,
        cache: Arc<dyn BlobCache>,
        key: impl Into<String>,
        quiet_period: Duration,
    ) -> PersistenceHandle {
        let key = key.into();
        let (cancel_tx, cancel_rx) = broadcast::channel(1);
        let join = tokio::spawn(run(blogs, cache, key, quiet_period, cancel_rx));
        PersistenceHandle {
            cancel_tx,
            join: Some(join),
        }
    }
}

/// Subscription for a running debouncer.
///
/// `stop` flushes a pending snapshot before returning and `detach` flushes it
/// in the background; dropping the handle aborts the loop and discards it.
pub struct PersistenceHandle {
    cancel_tx: broadcast::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl PersistenceHandle {
    pub async fn stop(mut self) -> Result<(), TaskError> {
        let _ = self.cancel_tx.send(());
        match self.join.take() {
            Some(join) => join.await.map_err(TaskError::from),
            None => Ok(()),
        }
    }

    /// Signals the loop to stop without waiting for it. A pending snapshot is
    /// still written as long as the runtime keeps running.
    pub fn detach(mut self) {
        let _ = self.cancel_tx.send(());
        // Dropping the join handle detaches the task instead of aborting it.
        drop(self.join.take());
    }
}

impl Drop for PersistenceHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

enum Window {
    Elapsed,
    Cancelled,
    SourceClosed,
}

async fn run<T: FeedItem>(
    mut blogs: watch::Receiver<FeedCollection<T>>,
    cache: Arc<dyn BlobCache>,
    key: String,
    quiet_period: Duration,
    mut cancel_rx: broadcast::Receiver<()>,
) {
    loop {
        // A replacement racing a stop still gets its window (and is flushed).
        tokio::select! {
            biased;
            changed = blogs.changed() => {
                if changed.is_err() {
                    debug!("collection store dropped, persistence debouncer exiting");
                    return;
                }
            }
            _ = cancel_rx.recv() => {
                debug!("persistence debouncer stopped while idle");
                return;
            }
        }

        debug!(?quiet_period, "collection replaced, quiet window started");
        let deadline = sleep(quiet_period);
        tokio::pin!(deadline);

        let window = loop {
            tokio::select! {
                _ = cancel_rx.recv() => break Window::Cancelled,
                changed = blogs.changed() => match changed {
                    Ok(()) => {
                        debug!("collection replaced again, quiet window reset");
                        deadline.as_mut().reset(Instant::now() + quiet_period);
                    }
                    Err(_) => break Window::SourceClosed,
                },
                _ = &mut deadline => break Window::Elapsed,
            }
        };

        let snapshot = blogs.borrow_and_update().clone();
        persist(cache.as_ref(), &key, &snapshot).await;

        match window {
            Window::Elapsed => {}
            Window::Cancelled | Window::SourceClosed => return,
        }
    }
}

async fn persist<T: FeedItem>(cache: &dyn BlobCache, key: &str, snapshot: &FeedCollection<T>) {
    match insert_object(cache, key, snapshot.as_slice()).await {
        Ok(()) => info!(key, count = snapshot.len(), "persisted feed collection"),
        Err(e) => warn!(error = %e, key, "failed to persist feed collection"),
    }
}
