//! Optimistic-concurrency updates.
//!
//! # Responsibility
//! - Turn a predicate-scoped conditional write into a checked
//!   compare-and-swap with bounded retries.
//!
//! # Invariants
//! - A zero match count is the only retryable outcome; store errors and
//!   malformed callback output end the loop immediately.
//! - The loop runs at most `RetryPolicy::max_attempts` callbacks (at least
//!   one), then fails with `OptimisticLockExhausted`.
//! - Backoff between attempts is a fixed interval, never exponential.
//! - Callbacks always see the latest reloaded record; they may run several
//!   times and must not assume a single invocation.

use crate::directory::{DirectoryError, DirectoryResult, IdRef, RecordDirectory};
use crate::model::document::{
    validate_body_field, validate_field_name, Fields, Query, ID_FIELD, SERIAL_FIELD,
};
use crate::model::record::Record;
use crate::serial::new_serial;
use crate::store::UpdateOptions;
use log::{debug, warn};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Attempt budget and fixed wait between lost races.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// A zero budget still performs one attempt.
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Waiting strategy between OCC attempts.
pub trait Backoff {
    fn wait(&self, interval: Duration);
}

/// Blocks the calling thread for the interval.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleepBackoff;

impl Backoff for ThreadSleepBackoff {
    fn wait(&self, interval: Duration) {
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }
}

/// Returns immediately; for tests and callers that pace retries elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl Backoff for NoBackoff {
    fn wait(&self, _interval: Duration) {}
}

impl RecordDirectory<'_> {
    /// Updates `record` only if its serial is unchanged since it was read.
    ///
    /// `update_fn(record, prefilled, attempt_offset)` returns the fields to
    /// set, as a JSON object. `prefilled` already holds a fresh serial;
    /// returning fields without one still gets a serial injected.
    ///
    /// ```ignore
    /// let user = users.update_with_serial_constraint(&user, RetryPolicy::default(), |user, mut fields, _| {
    ///     let balance = user.get("balance").and_then(Value::as_i64).unwrap_or(0);
    ///     fields.insert("balance".into(), json!(balance - amount));
    ///     Value::Object(fields)
    /// })?;
    /// ```
    pub fn update_with_serial_constraint<F>(
        &self,
        record: &Record,
        policy: RetryPolicy,
        mut update_fn: F,
    ) -> DirectoryResult<Record>
    where
        F: FnMut(&Record, Fields, u32) -> Value,
    {
        self.update_with_query_constraint(record, policy, |current, attempt_offset| {
            let mut prefilled = Fields::new();
            prefilled.insert(SERIAL_FIELD.to_string(), Value::String(new_serial()));

            let mut query = Fields::new();
            query.insert(
                SERIAL_FIELD.to_string(),
                current
                    .serial()
                    .map_or(Value::Null, |serial| Value::String(serial.to_string())),
            );

            let update = update_fn(current, prefilled, attempt_offset);
            (update, Value::Object(query))
        })
    }

    /// Updates `record` only while a caller-chosen predicate still holds.
    ///
    /// `callback(record, attempt_offset)` returns `(update_fields,
    /// query_fields)`, both JSON objects. The record's identifier is always
    /// added to the predicate. Returning anything other than two objects
    /// aborts with `InvalidCallbackResult` before the store is touched.
    pub fn update_with_query_constraint<F>(
        &self,
        record: &Record,
        policy: RetryPolicy,
        mut callback: F,
    ) -> DirectoryResult<Record>
    where
        F: FnMut(&Record, u32) -> (Value, Value),
    {
        let id = self.resolve_id(IdRef::Record(record))?;
        let max_attempts = policy.effective_attempts();
        let mut attempts_remaining = max_attempts;
        let mut attempt_offset = 0_u32;
        let mut current = record.clone();

        loop {
            let (update_value, query_value) = callback(&current, attempt_offset);
            let update_fields = callback_fields(update_value, "update", true)?;
            let mut query_fields = callback_fields(query_value, "query", false)?;
            query_fields.remove(ID_FIELD);
            let query = Query::from_fields(query_fields)
                .map_err(|err| DirectoryError::InvalidCallbackResult(err.to_string()))?
                .with_id(id);

            let matched = self.update_where(update_fields, &query, &UpdateOptions::default())?;
            if matched > 0 {
                debug!(
                    "event=occ_committed module=directory status=ok collection={} attempt={}",
                    self.collection(),
                    attempt_offset + 1
                );
                return self.reload(id)?.ok_or(DirectoryError::NotFound(id));
            }

            attempts_remaining -= 1;
            if attempts_remaining == 0 {
                warn!(
                    "event=occ_exhausted module=directory status=error collection={} attempts={max_attempts}",
                    self.collection()
                );
                return Err(DirectoryError::OptimisticLockExhausted {
                    record: current.desc(),
                    attempts: max_attempts,
                });
            }

            debug!(
                "event=occ_conflict module=directory status=retry collection={} attempt={} remaining={attempts_remaining}",
                self.collection(),
                attempt_offset + 1
            );
            self.backoff.wait(policy.interval);
            attempt_offset += 1;
            current = self.reload(id)?.ok_or(DirectoryError::NotFound(id))?;
        }
    }
}

fn callback_fields(value: Value, role: &str, is_update: bool) -> DirectoryResult<Fields> {
    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(DirectoryError::InvalidCallbackResult(format!(
                "{role} fields must be a JSON object, got {}",
                json_kind(&other)
            )));
        }
    };

    for name in fields.keys() {
        let checked = if is_update {
            validate_body_field(name)
        } else {
            validate_field_name(name)
        };
        checked.map_err(|err| {
            DirectoryError::InvalidCallbackResult(format!("{role} fields: {err}"))
        })?;
    }
    Ok(fields)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
