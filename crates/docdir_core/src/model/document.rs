//! Stored document shape, queries and field-name rules.
//!
//! # Responsibility
//! - Define the raw document exchanged with `DocumentStore` implementations.
//! - Provide equality queries and sort specs in a store-agnostic form.
//! - Own the field-name policy shared by records, queries and updates.
//!
//! # Invariants
//! - The identifier never lives inside `Document::body`; it is addressed by
//!   the reserved `_id` field name in queries only.
//! - Field names are top-level keys; nested paths are not supported.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Store-assigned document identifier.
pub type DocumentId = Uuid;

/// Ordered field name -> JSON value mapping used for bodies, updates and queries.
pub type Fields = Map<String, Value>;

/// Reserved query field addressing the document identifier.
pub const ID_FIELD: &str = "_id";
/// Body field holding the optimistic-lock version stamp.
pub const SERIAL_FIELD: &str = "serial";
/// Body field holding the creation time in epoch milliseconds.
pub const CREATION_DATE_FIELD: &str = "creationDate";

static FIELD_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[^\x00-\x1f"\\.$][^\x00-\x1f"\\.]*$"#).expect("valid field name regex")
});

/// Field-level validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// Field name is empty.
    EmptyName,
    /// Field name contains characters the stores cannot address.
    InvalidName(String),
    /// Field name is reserved and cannot be written as body data.
    ReservedName(String),
    /// `serial` must hold a string token.
    InvalidSerial(Value),
    /// `_id` predicate or field is not a valid identifier.
    InvalidId(Value),
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "field name cannot be empty"),
            Self::InvalidName(name) => write!(f, "invalid field name `{name}`"),
            Self::ReservedName(name) => write!(f, "field name `{name}` is reserved"),
            Self::InvalidSerial(value) => write!(f, "serial must be a string, got {value}"),
            Self::InvalidId(value) => write!(f, "invalid document identifier {value}"),
        }
    }
}

impl Error for FieldError {}

/// Checks that `name` can be used as a top-level document field.
///
/// `_id` passes this check; callers writing body data must additionally
/// reject it via [`validate_body_field`].
pub fn validate_field_name(name: &str) -> Result<(), FieldError> {
    if name.is_empty() {
        return Err(FieldError::EmptyName);
    }
    if !FIELD_NAME_RE.is_match(name) {
        return Err(FieldError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Checks a field that is about to be written into a document body.
pub fn validate_body_field(name: &str) -> Result<(), FieldError> {
    validate_field_name(name)?;
    if name == ID_FIELD {
        return Err(FieldError::ReservedName(name.to_string()));
    }
    Ok(())
}

/// Raw document as persisted by a store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// `None` until the store assigns one.
    pub id: Option<DocumentId>,
    /// Every body field, including `serial` when present.
    pub body: Fields,
}

impl Document {
    pub fn new(id: Option<DocumentId>, body: Fields) -> Self {
        Self { id, body }
    }
}

/// Conjunction of top-level equality predicates.
///
/// A `null` predicate value matches both explicit nulls and missing fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    id: Option<DocumentId>,
    predicates: Fields,
}

impl Query {
    /// Matches every document of a collection.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches exactly the document with `id`.
    pub fn by_id(id: DocumentId) -> Self {
        Self::all().with_id(id)
    }

    /// Builds a query from a field map, lifting `_id` into the identifier slot.
    pub fn from_fields(fields: Fields) -> Result<Self, FieldError> {
        let mut query = Self::all();
        for (name, value) in fields {
            validate_field_name(&name)?;
            if name == ID_FIELD {
                let id = value
                    .as_str()
                    .and_then(|text| Uuid::parse_str(text).ok())
                    .ok_or_else(|| FieldError::InvalidId(value.clone()))?;
                query.id = Some(id);
            } else {
                query.predicates.insert(name, value);
            }
        }
        Ok(query)
    }

    /// Adds (or replaces) an equality predicate.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.insert(field.into(), value.into());
        self
    }

    /// Restricts the query to one identifier, replacing any previous one.
    pub fn with_id(mut self, id: DocumentId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn id(&self) -> Option<DocumentId> {
        self.id
    }

    pub fn predicates(&self) -> &Fields {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.predicates.is_empty()
    }

    /// Checks every predicate field name.
    pub fn validate(&self) -> Result<(), FieldError> {
        self.predicates
            .keys()
            .try_for_each(|name| validate_field_name(name))
    }
}

/// Sort direction for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Ordered list of sort keys. Insertion order is the implicit final tiebreak.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<(String, SortOrder)>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortOrder::Ascending));
        self
    }

    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortOrder::Descending));
        self
    }

    pub fn keys(&self) -> &[(String, SortOrder)] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
