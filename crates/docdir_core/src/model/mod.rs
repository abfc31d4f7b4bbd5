//! Document and record data model.
//!
//! # Responsibility
//! - Define the raw stored document shape and query vocabulary.
//! - Define `Record`, the in-memory unit of optimistic locking.
//!
//! # Invariants
//! - A record's identifier is assigned by the store on first save, unless
//!   the caller supplied `_id` to `create`.
//! - A record's owning directory identity never changes.

pub mod document;
pub mod record;
