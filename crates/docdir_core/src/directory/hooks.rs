//! Write-path and setup hooks for directory variants.

use crate::model::document::Fields;
use crate::store::{DocumentStore, StoreResult};

/// Customization points a directory variant may override.
///
/// Pre-write hooks are pure field transforms; they run on every `create`
/// and every `update_where` (and so on every OCC attempt).
pub trait DirectoryHooks {
    /// Shared transform for creates and updates.
    fn on_create_or_update_pre(&self, fields: Fields) -> Fields {
        fields
    }

    fn on_create_pre(&self, fields: Fields) -> Fields {
        self.on_create_or_update_pre(fields)
    }

    fn on_update_pre(&self, fields: Fields) -> Fields {
        self.on_create_or_update_pre(fields)
    }

    /// One-time schema/index setup. Must be idempotent.
    fn bring_up_to_date(&self, store: &dyn DocumentStore, collection: &str) -> StoreResult<()> {
        let _ = (store, collection);
        Ok(())
    }
}

/// Identity transforms, no setup.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl DirectoryHooks for NoHooks {}

/// Setup hook that indexes a fixed list of body fields.
#[derive(Debug, Clone, Default)]
pub struct EnsureIndexes {
    fields: Vec<String>,
}

impl EnsureIndexes {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl DirectoryHooks for EnsureIndexes {
    fn bring_up_to_date(&self, store: &dyn DocumentStore, collection: &str) -> StoreResult<()> {
        self.fields
            .iter()
            .try_for_each(|field| store.ensure_index(collection, field))
    }
}
