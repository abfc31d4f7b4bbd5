//! Collection-scoped record access.
//!
//! # Responsibility
//! - Provide CRUD over one collection in terms of `Record`s.
//! - Layer serial maintenance and pre-write hooks over raw store writes.
//! - Host the optimistic-concurrency update loop (see `occ`).
//!
//! # Invariants
//! - A directory keeps no per-record state; every read hits the store.
//! - Records owned by another collection are rejected, never silently
//!   written through this directory.
//! - Absent documents are `Ok(None)`, not errors.

use crate::model::document::{
    validate_body_field, Document, DocumentId, FieldError, Fields, Query, SortSpec,
    CREATION_DATE_FIELD, ID_FIELD, SERIAL_FIELD,
};
use crate::model::record::Record;
use crate::serial::{new_serial, now_epoch_ms};
use crate::store::{
    DocumentCursor, DocumentStore, FindOptions, LazyMappedCursor, RemoveOptions, StoreError,
    StoreResult, UpdateOptions,
};
use log::info;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

pub mod config;
pub mod hooks;
pub mod occ;
pub mod registry;

use config::DirectoryConfig;
use hooks::{DirectoryHooks, NoHooks};
use occ::{Backoff, ThreadSleepBackoff};
use registry::{DirectoryIdentity, ModelRegistry};

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors surfaced by directory operations.
#[derive(Debug)]
pub enum DirectoryError {
    /// Argument cannot be resolved to a document identifier.
    InvalidIdentifier(String),
    /// Caller-supplied field data is malformed.
    InvalidField(FieldError),
    /// OCC callback returned malformed update/query fields.
    InvalidCallbackResult(String),
    /// Underlying store failure.
    Store(StoreError),
    /// Every OCC attempt lost its race.
    OptimisticLockExhausted { record: String, attempts: u32 },
    /// Record disappeared while an operation needed it.
    NotFound(DocumentId),
    /// Record belongs to a directory on another collection.
    DirectoryMismatch { expected: String, actual: String },
}

impl Display for DirectoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(value) => write!(f, "unknown id: {value}"),
            Self::InvalidField(err) => write!(f, "{err}"),
            Self::InvalidCallbackResult(message) => {
                write!(f, "invalid update callback result: {message}")
            }
            Self::Store(err) => write!(f, "{err}"),
            Self::OptimisticLockExhausted { record, attempts } => {
                write!(f, "failed to update {record} after {attempts} attempts")
            }
            Self::NotFound(id) => write!(f, "document not found: {id}"),
            Self::DirectoryMismatch { expected, actual } => write!(
                f,
                "record belongs to collection `{actual}`, directory targets `{expected}`"
            ),
        }
    }
}

impl Error for DirectoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidField(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::InvalidIdentifier(_)
            | Self::InvalidCallbackResult(_)
            | Self::OptimisticLockExhausted { .. }
            | Self::NotFound(_)
            | Self::DirectoryMismatch { .. } => None,
        }
    }
}

impl From<StoreError> for DirectoryError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<FieldError> for DirectoryError {
    fn from(value: FieldError) -> Self {
        Self::InvalidField(value)
    }
}

/// Anything a caller may use to name one document.
#[derive(Debug, Clone, Copy)]
pub enum IdRef<'a> {
    Id(DocumentId),
    Record(&'a Record),
    Text(&'a str),
    Value(&'a Value),
}

impl From<DocumentId> for IdRef<'_> {
    fn from(value: DocumentId) -> Self {
        Self::Id(value)
    }
}

impl<'a> From<&'a Record> for IdRef<'a> {
    fn from(value: &'a Record) -> Self {
        Self::Record(value)
    }
}

impl<'a> From<&'a str> for IdRef<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a String> for IdRef<'a> {
    fn from(value: &'a String) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a Value> for IdRef<'a> {
    fn from(value: &'a Value) -> Self {
        Self::Value(value)
    }
}

/// Lazily mapped record stream returned by `find`.
pub type RecordCursor<'s> = LazyMappedCursor<
    Box<dyn DocumentCursor + 's>,
    Box<dyn FnMut(StoreResult<Document>) -> DirectoryResult<Record> + 's>,
>;

/// Accessor for one logical collection.
pub struct RecordDirectory<'s> {
    store: &'s dyn DocumentStore,
    config: DirectoryConfig,
    identity: Arc<DirectoryIdentity>,
    hooks: Box<dyn DirectoryHooks + 's>,
    backoff: Box<dyn Backoff + 's>,
}

impl<'s> RecordDirectory<'s> {
    /// Builds a directory whose model is resolved by config or convention.
    pub fn new(
        store: &'s dyn DocumentStore,
        directory_name: &str,
        config: DirectoryConfig,
    ) -> Self {
        Self::with_registry(store, &ModelRegistry::new(), directory_name, config)
    }

    /// Builds a directory whose model may come from an explicit registry.
    pub fn with_registry(
        store: &'s dyn DocumentStore,
        registry: &ModelRegistry,
        directory_name: &str,
        config: DirectoryConfig,
    ) -> Self {
        let identity = registry.resolve(directory_name, &config);
        Self {
            store,
            config,
            identity: Arc::new(identity),
            hooks: Box::new(NoHooks),
            backoff: Box::new(ThreadSleepBackoff),
        }
    }

    pub fn with_hooks(mut self, hooks: impl DirectoryHooks + 's) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn with_backoff(mut self, backoff: impl Backoff + 's) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    pub fn identity(&self) -> &DirectoryIdentity {
        &self.identity
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn collection(&self) -> &str {
        &self.identity.collection
    }

    /// Builds an unsaved record from defaults plus `fields`. No store access.
    ///
    /// Caller fields win over defaults. `_id` and `serial` entries are lifted
    /// into the record's identifier and serial slots.
    pub fn create(&self, fields: Fields) -> DirectoryResult<Record> {
        let mut merged = self.new_record_defaults();
        merged.extend(fields);
        let mut merged = self.hooks.on_create_pre(merged);

        let id = match merged.remove(ID_FIELD) {
            Some(value) => Some(self.resolve_id(IdRef::Value(&value))?),
            None => None,
        };
        let serial = match merged.remove(SERIAL_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(serial)) => Some(serial),
            Some(other) => return Err(FieldError::InvalidSerial(other).into()),
        };
        for name in merged.keys() {
            validate_body_field(name)?;
        }

        Ok(Record::new(Arc::clone(&self.identity), id, serial, merged))
    }

    /// Upserts the record's full body and syncs the assigned identifier back.
    ///
    /// With serial tracking on, every save stamps a fresh serial, so holders
    /// of the previous serial lose their next serial-checked update.
    pub fn save(&self, mut record: Record) -> DirectoryResult<Record> {
        self.ensure_owned(&record)?;
        if self.config.use_serial {
            record.assign_serial(new_serial());
        }
        let id = self.store.upsert(self.collection(), &record.to_document())?;
        record.assign_id(id);
        Ok(record)
    }

    pub fn create_and_save(&self, fields: Fields) -> DirectoryResult<Record> {
        let record = self.create(fields)?;
        self.save(record)
    }

    pub fn find_by_id<'a>(
        &self,
        target: impl Into<IdRef<'a>>,
    ) -> DirectoryResult<Option<Record>> {
        let id = self.resolve_id(target.into())?;
        self.find_one(&Query::by_id(id))
    }

    pub fn find_one(&self, query: &Query) -> DirectoryResult<Option<Record>> {
        self.store
            .find_one(self.collection(), query)?
            .map(|document| Record::from_document(Arc::clone(&self.identity), document))
            .transpose()
            .map_err(DirectoryError::from)
    }

    /// Opens a lazy record stream. Each call starts an independent cursor.
    pub fn find(
        &self,
        query: &Query,
        sort: Option<SortSpec>,
        limit: Option<u64>,
    ) -> DirectoryResult<RecordCursor<'s>> {
        let options = FindOptions { sort, limit };
        let cursor = self.store.find(self.collection(), query, &options)?;
        let owner = Arc::clone(&self.identity);
        let to_record: Box<dyn FnMut(StoreResult<Document>) -> DirectoryResult<Record> + 's> =
            Box::new(move |document| {
                let record = Record::from_document(Arc::clone(&owner), document?)?;
                Ok(record)
            });
        Ok(LazyMappedCursor::new(cursor, to_record))
    }

    pub fn find_all(&self) -> DirectoryResult<RecordCursor<'s>> {
        self.find(&Query::all(), None, None)
    }

    /// Re-reads the authoritative stored state.
    pub fn reload<'a>(&self, target: impl Into<IdRef<'a>>) -> DirectoryResult<Option<Record>> {
        self.find_by_id(target)
    }

    pub fn count(&self, query: &Query) -> DirectoryResult<u64> {
        Ok(self.store.count(self.collection(), query)?)
    }

    /// Sets `fields` on one document, unconditionally. Returns the match count.
    pub fn update<'a>(
        &self,
        target: impl Into<IdRef<'a>>,
        fields: Fields,
        options: &UpdateOptions,
    ) -> DirectoryResult<u64> {
        let id = self.resolve_id(target.into())?;
        self.update_where(fields, &Query::by_id(id), options)
    }

    /// Sets `fields` where `query` matches and returns how many documents
    /// matched. Injects a fresh serial unless the caller supplied one.
    pub fn update_where(
        &self,
        mut fields: Fields,
        query: &Query,
        options: &UpdateOptions,
    ) -> DirectoryResult<u64> {
        if self.config.use_serial && !fields.contains_key(SERIAL_FIELD) {
            fields.insert(SERIAL_FIELD.to_string(), Value::String(new_serial()));
        }
        let fields = self.hooks.on_update_pre(fields);
        let outcome = self
            .store
            .conditional_update(self.collection(), query, &fields, options)?;
        Ok(outcome.matched_count)
    }

    pub fn delete<'a>(
        &self,
        target: impl Into<IdRef<'a>>,
        options: &RemoveOptions,
    ) -> DirectoryResult<u64> {
        let id = self.resolve_id(target.into())?;
        Ok(self.store.remove(self.collection(), &Query::by_id(id), options)?)
    }

    /// Removes every document of the collection. Irreversible.
    pub fn delete_all(&self) -> DirectoryResult<u64> {
        let removed = self
            .store
            .remove(self.collection(), &Query::all(), &RemoveOptions::default())?;
        info!(
            "event=delete_all module=directory status=ok collection={} removed={removed}",
            self.collection()
        );
        Ok(removed)
    }

    /// Runs one-time schema/index setup. Safe to call repeatedly.
    pub fn bring_up_to_date(&self) -> DirectoryResult<()> {
        self.hooks.bring_up_to_date(self.store, self.collection())?;
        info!(
            "event=bring_up_to_date module=directory status=ok collection={}",
            self.collection()
        );
        Ok(())
    }

    fn new_record_defaults(&self) -> Fields {
        let mut defaults = Fields::new();
        if self.config.add_creation_timestamp {
            defaults.insert(CREATION_DATE_FIELD.to_string(), Value::from(now_epoch_ms()));
        }
        if self.config.use_serial {
            defaults.insert(SERIAL_FIELD.to_string(), Value::String(new_serial()));
        }
        defaults
    }

    fn ensure_owned(&self, record: &Record) -> DirectoryResult<()> {
        if record.collection() != self.collection() {
            return Err(DirectoryError::DirectoryMismatch {
                expected: self.collection().to_string(),
                actual: record.collection().to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn resolve_id(&self, target: IdRef<'_>) -> DirectoryResult<DocumentId> {
        match target {
            IdRef::Id(id) => Ok(id),
            IdRef::Record(record) => {
                self.ensure_owned(record)?;
                record.id().ok_or_else(|| {
                    DirectoryError::InvalidIdentifier(format!("{} has no id", record.desc()))
                })
            }
            IdRef::Text(text) => parse_id(text),
            IdRef::Value(Value::String(text)) => parse_id(text),
            IdRef::Value(other) => Err(DirectoryError::InvalidIdentifier(other.to_string())),
        }
    }
}

fn parse_id(text: &str) -> DirectoryResult<DocumentId> {
    Uuid::parse_str(text.trim())
        .map_err(|_| DirectoryError::InvalidIdentifier(Value::from(text).to_string()))
}

#[cfg(test)]
mod tests {
    use super::{DirectoryError, IdRef, RecordDirectory};
    use crate::db::open_db_in_memory;
    use crate::directory::config::DirectoryConfig;
    use crate::store::SqliteDocumentStore;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn resolve_id_accepts_ids_records_and_strings() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteDocumentStore::try_new(&conn).unwrap();
        let directory = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

        let id = Uuid::new_v4();
        assert_eq!(directory.resolve_id(IdRef::Id(id)).unwrap(), id);
        assert_eq!(
            directory.resolve_id(IdRef::Text(&id.to_string())).unwrap(),
            id
        );
        assert_eq!(
            directory
                .resolve_id(IdRef::Value(&json!(id.to_string())))
                .unwrap(),
            id
        );

        let saved = directory
            .create_and_save(json!({ "a": 1 }).as_object().unwrap().clone())
            .unwrap();
        assert_eq!(
            directory.resolve_id(IdRef::Record(&saved)).unwrap(),
            saved.id().unwrap()
        );
    }

    #[test]
    fn resolve_id_rejects_unknown_shapes() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteDocumentStore::try_new(&conn).unwrap();
        let directory = RecordDirectory::new(&store, "FooDirectory", DirectoryConfig::default());

        assert!(matches!(
            directory.resolve_id(IdRef::Text("not-an-id")),
            Err(DirectoryError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            directory.resolve_id(IdRef::Value(&json!(42))),
            Err(DirectoryError::InvalidIdentifier(_))
        ));

        let unsaved = directory.create(Default::default()).unwrap();
        assert!(matches!(
            directory.resolve_id(IdRef::Record(&unsaved)),
            Err(DirectoryError::InvalidIdentifier(_))
        ));
    }
}
