pub mod cache;
pub mod collection;
pub mod command;
pub mod config;
pub mod error;
pub mod feeds;
pub mod persistence;

pub use cache::{get_object, get_or_create_object, insert_object};
pub use cache::{BlobCache, FileBlobCache, InMemoryBlobCache};
pub use collection::{CollectionStore, FeedCollection, FeedItem};
pub use command::{BusyState, CommandHandle, CommandOutcome, CommandPhase, ReactiveCommand};
pub use config::{FeedsConfig, BLOGS_KEY};
pub use error::{CacheError, CommandError, ConfigError, TaskError, TriggerError};
pub use feeds::FeedsState;
pub use persistence::{PersistenceDebouncer, PersistenceHandle};
