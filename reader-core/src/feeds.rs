use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::cache::BlobCache;
use crate::collection::{CollectionStore, FeedCollection, FeedItem};
use crate::command::{BusyState, ReactiveCommand};
use crate::config::{FeedsConfig, BLOGS_KEY};
use crate::error::{CommandError, TaskError};
use crate::persistence::{PersistenceDebouncer, PersistenceHandle};

/// The subscribed feeds as presented to the reader UI: the collection, a
/// "refresh all" command and the loading flag derived from it.
///
/// Dropping the state stops persistence in the background, still writing an
/// edit that is inside its quiet window. Use [`FeedsState::shutdown`] to wait
/// for that write.
pub struct FeedsState<T: FeedItem> {
    store: CollectionStore<T>,
    refresh_all: ReactiveCommand,
    persistence: Option<PersistenceHandle>,
}

impl<T: FeedItem> FeedsState<T> {
    /// Loads the collection from `cache` and starts persisting replacements.
    /// Must be called from within a tokio runtime.
    pub async fn load(cache: Arc<dyn BlobCache>, config: &FeedsConfig) -> Self {
        let store = CollectionStore::load(cache.as_ref()).await;
        let persistence = PersistenceDebouncer::spawn(
            store.subscribe(),
            cache,
            BLOGS_KEY,
            config.quiet_period(),
        );
        let refresh_all = refresh_all_command(store.subscribe());

        Self {
            store,
            refresh_all,
            persistence: Some(persistence),
        }
    }

    pub fn blogs(&self) -> FeedCollection<T> {
        self.store.current()
    }

    pub fn subscribe_blogs(&self) -> watch::Receiver<FeedCollection<T>> {
        self.store.subscribe()
    }

    pub fn replace_blogs(&self, blogs: Vec<T>) {
        self.store.replace(blogs);
    }

    pub fn add_blog(&self, blog: T) {
        self.store.update(|current| {
            let mut next = current.to_vec();
            next.push(blog);
            next
        });
    }

    /// Drops every blog matching `predicate`. Always replaces the collection.
    pub fn remove_blogs<P>(&self, mut predicate: P)
    where
        P: FnMut(&T) -> bool,
    {
        self.store
            .update(|current| current.iter().filter(|b| !predicate(b)).cloned().collect());
    }

    pub fn refresh_all(&self) -> &ReactiveCommand {
        &self.refresh_all
    }

    pub fn is_loading(&self) -> bool {
        self.refresh_all.is_executing()
    }

    pub fn loading_state(&self) -> BusyState {
        self.refresh_all.busy_state()
    }

    /// Stops persistence, writing out any replacement still inside its quiet window.
    pub async fn shutdown(mut self) -> Result<(), TaskError> {
        match self.persistence.take() {
            Some(persistence) => persistence.stop().await,
            None => Ok(()),
        }
    }
}

impl<T: FeedItem> Drop for FeedsState<T> {
    fn drop(&mut self) {
        if let Some(persistence) = self.persistence.take() {
            persistence.detach();
        }
    }
}

/// Fires every blog's own refresh in collection order without awaiting any
/// of them. The command is done once the last refresh has been issued.
fn refresh_all_command<T: FeedItem>(blogs: watch::Receiver<FeedCollection<T>>) -> ReactiveCommand {
    ReactiveCommand::from_async("refresh_all", move || {
        let snapshot = blogs.borrow().clone();
        async move {
            debug!(count = snapshot.len(), "issuing refresh for all blogs");
            for (index, blog) in snapshot.iter().enumerate() {
                if let Err(source) = blog.refresh() {
                    return Err(CommandError::Trigger { index, source });
                }
            }
            Ok(())
        }
    })
}
