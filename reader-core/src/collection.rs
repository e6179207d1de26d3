use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cache::{get_or_create_object, BlobCache};
use crate::config::BLOGS_KEY;
use crate::error::TriggerError;

/// A subscribed feed source as seen by the collection layer.
pub trait FeedItem: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Issues this item's own refresh without waiting for it to finish.
    ///
    /// `Ok` only means the refresh was started; how it completes, and any
    /// failure along the way, is the item's business.
    fn refresh(&self) -> Result<(), TriggerError>;
}

/// Ordered, shared snapshot of the subscribed feeds. Replacing the `Arc` is
/// what counts as a change.
pub type FeedCollection<T> = Arc<Vec<T>>;

#[derive(Debug)]
pub struct CollectionStore<T: FeedItem> {
    blogs: watch::Sender<FeedCollection<T>>,
}

impl<T: FeedItem> CollectionStore<T> {
    /// Reads the collection from `cache` once, storing an empty one if absent.
    ///
    /// A failing cache does not leave the store unset: the store starts empty
    /// and the failure is logged.
    pub async fn load(cache: &dyn BlobCache) -> Self {
        let initial: Vec<T> = match get_or_create_object(cache, BLOGS_KEY, Vec::new).await {
            Ok(blogs) => {
                info!(count = blogs.len(), "loaded feed collection");
                blogs
            }
            Err(e) => {
                warn!(error = %e, key = BLOGS_KEY, "failed to load feed collection, starting empty");
                Vec::new()
            }
        };
        Self::with_items(initial)
    }

    pub fn with_items(items: Vec<T>) -> Self {
        let (blogs, _) = watch::channel(Arc::new(items));
        Self { blogs }
    }

    pub fn current(&self) -> FeedCollection<T> {
        self.blogs.borrow().clone()
    }

    /// Receiver of collection replacements. The value present at subscription
    /// time is already marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<FeedCollection<T>> {
        self.blogs.subscribe()
    }

    pub fn replace(&self, items: Vec<T>) {
        self.blogs.send_replace(Arc::new(items));
    }

    /// Builds a new collection from the current one and swaps it in.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&[T]) -> Vec<T>,
    {
        let next = f(self.current().as_slice());
        self.replace(next);
    }
}
