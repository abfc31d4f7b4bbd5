//! Identity-bearing document wrapper.
//!
//! # Responsibility
//! - Hold one document's identifier, serial and body fields in memory.
//! - Remember which directory identity produced it.
//!
//! # Invariants
//! - The owning identity is fixed at construction.
//! - `serial` is kept out of `fields`; it is merged back only when the record
//!   is turned into a stored document.
//! - In-memory edits are invisible to the store until an explicit save/update.

use crate::directory::registry::DirectoryIdentity;
use crate::model::document::{
    validate_body_field, Document, DocumentId, FieldError, Fields, ID_FIELD, SERIAL_FIELD,
};
use crate::store::{StoreError, StoreResult};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// One document bound to the directory that created or loaded it.
///
/// A record does not hold a store handle; refresh it with
/// `RecordDirectory::reload(&record)` and reach its directory's identity
/// through `owner()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    owner: Arc<DirectoryIdentity>,
    id: Option<DocumentId>,
    serial: Option<String>,
    fields: Fields,
}

impl Record {
    pub(crate) fn new(
        owner: Arc<DirectoryIdentity>,
        id: Option<DocumentId>,
        serial: Option<String>,
        fields: Fields,
    ) -> Self {
        Self {
            owner,
            id,
            serial,
            fields,
        }
    }

    /// Splits a stored document into identifier, serial and body.
    pub(crate) fn from_document(
        owner: Arc<DirectoryIdentity>,
        document: Document,
    ) -> StoreResult<Self> {
        let Document { id, mut body } = document;
        let serial = match body.remove(SERIAL_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(serial)) => Some(serial),
            Some(other) => {
                return Err(StoreError::InvalidData(format!(
                    "serial of document {} is not a string: {other}",
                    id.map_or_else(|| "<unsaved>".to_string(), |id| id.to_string())
                )));
            }
        };
        Ok(Self::new(owner, id, serial, body))
    }

    pub fn id(&self) -> Option<DocumentId> {
        self.id
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Body fields, excluding `_id` and `serial`.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Assigns one field in memory and returns the previous value.
    ///
    /// Assigning `serial` replaces the serial token and requires a string.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, FieldError> {
        let name = name.into();
        let value = value.into();
        validate_body_field(&name)?;

        if name == SERIAL_FIELD {
            return match value {
                Value::String(serial) => Ok(self.serial.replace(serial).map(Value::String)),
                other => Err(FieldError::InvalidSerial(other)),
            };
        }
        Ok(self.fields.insert(name, value))
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        if name == SERIAL_FIELD {
            return self.serial.take().map(Value::String);
        }
        self.fields.remove(name)
    }

    pub fn owner(&self) -> &DirectoryIdentity {
        &self.owner
    }

    pub fn directory_name(&self) -> &str {
        &self.owner.directory_name
    }

    pub fn model_name(&self) -> &str {
        &self.owner.model_name
    }

    pub fn collection(&self) -> &str {
        &self.owner.collection
    }

    /// Short human-readable label, e.g. `{FooModel 6f1c...}`.
    pub fn desc(&self) -> String {
        match self.id {
            Some(id) => format!("{{{} {id}}}", self.owner.model_name),
            None => format!("{{Anonymous {}}}", self.owner.model_name),
        }
    }

    /// Flat body as stored: every field plus `serial` when present.
    pub fn to_body(&self) -> Fields {
        let mut body = self.fields.clone();
        if let Some(serial) = &self.serial {
            body.insert(SERIAL_FIELD.to_string(), Value::String(serial.clone()));
        }
        body
    }

    pub fn to_document(&self) -> Document {
        Document::new(self.id, self.to_body())
    }

    pub(crate) fn assign_id(&mut self, id: DocumentId) {
        self.id = Some(id);
    }

    pub(crate) fn assign_serial(&mut self, serial: String) {
        self.serial = Some(serial);
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.desc())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.fields.len()
            + usize::from(self.id.is_some())
            + usize::from(self.serial.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(id) = &self.id {
            map.serialize_entry(ID_FIELD, &id.to_string())?;
        }
        if let Some(serial) = &self.serial {
            map.serialize_entry(SERIAL_FIELD, serial)?;
        }
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
