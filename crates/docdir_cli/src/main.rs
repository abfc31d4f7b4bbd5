//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise `docdir_core` end to end against an in-memory store.
//! - Keep output deterministic apart from generated ids and serials.

use docdir_core::{
    open_db_in_memory, DirectoryConfig, Fields, NoBackoff, Query, RecordDirectory, RetryPolicy,
    SqliteDocumentStore,
};
use log::info;
use serde_json::{json, Value};
use std::error::Error;

fn main() {
    if let Err(err) = run() {
        eprintln!("docdir_cli error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    println!("docdir_core ping={}", docdir_core::ping());
    println!("docdir_core version={}", docdir_core::core_version());

    let conn = open_db_in_memory()?;
    let store = SqliteDocumentStore::try_new(&conn)?;
    let accounts = RecordDirectory::new(&store, "AccountDirectory", DirectoryConfig::default())
        .with_backoff(NoBackoff);
    accounts.bring_up_to_date()?;

    let mut fields = Fields::new();
    fields.insert("owner".to_string(), json!("demo"));
    fields.insert("balance".to_string(), json!(100));
    let account = accounts.create_and_save(fields)?;
    println!("created {account}: {}", serde_json::to_string(&account)?);

    let account = accounts.update_with_serial_constraint(
        &account,
        RetryPolicy::default(),
        |current, mut update, _| {
            let balance = current.get("balance").and_then(Value::as_i64).unwrap_or(0);
            update.insert("balance".to_string(), json!(balance - 30));
            Value::Object(update)
        },
    )?;
    info!(
        "event=cli_demo module=cli status=ok collection={}",
        accounts.collection()
    );
    println!("updated {account}: {}", serde_json::to_string(&account)?);
    println!("count={}", accounts.count(&Query::all())?);
    Ok(())
}
