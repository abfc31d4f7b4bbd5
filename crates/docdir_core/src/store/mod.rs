//! Document store contracts and implementations.
//!
//! # Responsibility
//! - Define the minimal capability the directory layer needs from a store.
//! - Keep backend details (SQL, JSON encoding) behind `DocumentStore`.
//!
//! # Invariants
//! - `conditional_update` is atomic per call at the storage layer; its
//!   `matched_count` is the only conflict signal the OCC loop relies on.
//! - Every operation is scoped to exactly one collection.

use crate::db::DbError;
use crate::model::document::{Document, DocumentId, FieldError, Fields, Query, SortSpec};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod cursor;
pub mod sqlite;

pub use cursor::LazyMappedCursor;
pub use sqlite::SqliteDocumentStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures raised by a document store.
#[derive(Debug)]
pub enum StoreError {
    /// Driver or connection failure.
    Db(DbError),
    /// A field name or reserved field was rejected before reaching the backend.
    InvalidField(FieldError),
    /// Persisted state cannot be decoded into a document.
    InvalidData(String),
    /// A value could not be encoded for storage.
    Serialize(serde_json::Error),
    /// Connection schema is not at the version this build expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidField(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted document: {message}"),
            Self::Serialize(err) => write!(f, "failed to encode document value: {err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "document store requires schema version {expected_version}, got {actual_version}"
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidField(err) => Some(err),
            Self::InvalidData(_) => None,
            Self::Serialize(err) => Some(err),
            Self::UninitializedConnection { .. } => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<FieldError> for StoreError {
    fn from(value: FieldError) -> Self {
        Self::InvalidField(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialize(value)
    }
}

/// Cursor shaping options for `DocumentStore::find`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Option<SortSpec>,
    pub limit: Option<u64>,
}

/// Options for `DocumentStore::conditional_update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Modify every matching document instead of the first one.
    pub multi: bool,
}

impl UpdateOptions {
    pub fn multi() -> Self {
        Self { multi: true }
    }
}

/// Options for `DocumentStore::remove`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove at most one matching document.
    pub just_one: bool,
}

/// Result of a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Documents that matched the predicate and received the update.
    pub matched_count: u64,
}

/// Forward-only, single-pass stream of documents produced by a store.
pub trait DocumentCursor: Iterator<Item = StoreResult<Document>> {
    /// Number of documents the cursor yields in total, when the backend can
    /// tell without iterating. `None` means the cursor is not countable.
    fn total(&self) -> Option<StoreResult<u64>> {
        None
    }
}

impl<C: DocumentCursor + ?Sized> DocumentCursor for Box<C> {
    fn total(&self) -> Option<StoreResult<u64>> {
        (**self).total()
    }
}

/// Capability the directory layer requires from a document store.
pub trait DocumentStore {
    /// Returns the first document matching `query`, or `None`.
    fn find_one(&self, collection: &str, query: &Query) -> StoreResult<Option<Document>>;

    /// Opens a lazy cursor over every document matching `query`.
    fn find<'a>(
        &'a self,
        collection: &str,
        query: &Query,
        options: &FindOptions,
    ) -> StoreResult<Box<dyn DocumentCursor + 'a>>;

    /// Inserts `document` (assigning an identifier when absent) or replaces
    /// the stored body of the document with the same identifier.
    fn upsert(&self, collection: &str, document: &Document) -> StoreResult<DocumentId>;

    /// Sets `fields` on documents matching `query` in one atomic step.
    fn conditional_update(
        &self,
        collection: &str,
        query: &Query,
        fields: &Fields,
        options: &UpdateOptions,
    ) -> StoreResult<UpdateOutcome>;

    /// Removes matching documents and returns how many were removed.
    fn remove(&self, collection: &str, query: &Query, options: &RemoveOptions)
        -> StoreResult<u64>;

    /// Counts documents matching `query`.
    fn count(&self, collection: &str, query: &Query) -> StoreResult<u64>;

    /// Creates a lookup index on one body field. Idempotent.
    fn ensure_index(&self, collection: &str, field: &str) -> StoreResult<()>;
}
