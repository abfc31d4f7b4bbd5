//! Collection-scoped document access with optimistic concurrency.
//!
//! A `RecordDirectory` wraps one collection of a `DocumentStore`, hands out
//! `Record`s, and offers serial-checked updates that retry on conflict.

pub mod db;
pub mod directory;
pub mod logging;
pub mod model;
pub mod serial;
pub mod store;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use directory::config::DirectoryConfig;
pub use directory::hooks::{DirectoryHooks, EnsureIndexes, NoHooks};
pub use directory::occ::{Backoff, NoBackoff, RetryPolicy, ThreadSleepBackoff};
pub use directory::registry::{DirectoryIdentity, ModelBinding, ModelRegistry, RegistryError};
pub use directory::{DirectoryError, DirectoryResult, IdRef, RecordCursor, RecordDirectory};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::document::{
    Document, DocumentId, FieldError, Fields, Query, SortOrder, SortSpec, ID_FIELD, SERIAL_FIELD,
};
pub use model::record::Record;
pub use serial::new_serial;
pub use store::{
    DocumentCursor, DocumentStore, FindOptions, LazyMappedCursor, RemoveOptions,
    SqliteDocumentStore, StoreError, StoreResult, UpdateOptions, UpdateOutcome,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
