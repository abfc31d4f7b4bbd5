//! Optimistic-lock version stamps.
//!
//! Serials are only ever compared for equality. The clock component keeps
//! them readable in the store; the random suffix keeps calls that land on the
//! same clock tick apart.

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const RANDOM_SUFFIX_LEN: usize = 8;

/// Returns a fresh serial shaped like `<epoch-nanos>-<8 hex chars>`.
pub fn new_serial() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos());
    // The first 8 hex digits of a v4 UUID carry no version/variant bits.
    let random = Uuid::new_v4().simple().to_string();
    format!("{nanos}-{}", &random[..RANDOM_SUFFIX_LEN])
}

/// Current time in epoch milliseconds, used for `creationDate` defaults.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}
