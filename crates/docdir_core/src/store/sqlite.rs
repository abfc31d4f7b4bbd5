//! SQLite-backed document store.
//!
//! # Responsibility
//! - Persist JSON document bodies in the `documents` table, one row per
//!   `(collection, id)`.
//! - Translate `Query`/`SortSpec` into SQL over JSON paths.
//!
//! # Invariants
//! - Each conditional update and remove is a single SQL statement, so SQLite
//!   applies the predicate check and the write atomically.
//! - Equality predicates compare canonical JSON text (`body -> path`), which
//!   keeps `1`, `"1"` and `true` distinct.
//! - Cursors read in pages with `LIMIT/OFFSET`; writes that land between two
//!   pages can shift later pages.

use crate::db::migrations::{latest_version, schema_version};
use crate::model::document::{
    validate_body_field, Document, DocumentId, Fields, Query, SortOrder, SortSpec, ID_FIELD,
};
use crate::store::{
    DocumentCursor, DocumentStore, FindOptions, RemoveOptions, StoreError, StoreResult,
    UpdateOptions, UpdateOutcome,
};
use log::debug;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::collections::VecDeque;
use uuid::Uuid;

const CURSOR_PAGE_SIZE: u64 = 64;
const NOW_MS_SQL: &str = "(strftime('%s', 'now') * 1000)";

/// Document store over a migrated SQLite connection.
pub struct SqliteDocumentStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocumentStore<'conn> {
    /// Wraps a connection returned by `open_db`/`open_db_in_memory`.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations have not been applied.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        let actual_version = schema_version(conn)?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(StoreError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    /// Lists fields indexed through `ensure_index`, sorted by name.
    pub fn indexed_fields(&self, collection: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT field FROM document_indexes
             WHERE collection = ?1
             ORDER BY field ASC;",
        )?;
        let fields = stmt
            .query_map([collection], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(fields)
    }
}

impl DocumentStore for SqliteDocumentStore<'_> {
    fn find_one(&self, collection: &str, query: &Query) -> StoreResult<Option<Document>> {
        let filter = Filter::build(collection, query)?;
        let sql = format!(
            "SELECT id, body FROM documents WHERE {} ORDER BY seq ASC LIMIT 1;",
            filter.sql
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let row = stmt
            .query_row(params_from_iter(filter.params), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .optional()?;

        row.map(|(id, body)| decode_document(&id, &body))
            .transpose()
    }

    fn find<'a>(
        &'a self,
        collection: &str,
        query: &Query,
        options: &FindOptions,
    ) -> StoreResult<Box<dyn DocumentCursor + 'a>> {
        let filter = Filter::build(collection, query)?;
        let order_by = order_by_clause(options.sort.as_ref())?;
        Ok(Box::new(SqliteCursor {
            conn: self.conn,
            select_sql: format!(
                "SELECT id, body FROM documents WHERE {} ORDER BY {}",
                filter.sql, order_by.sql
            ),
            count_sql: format!("SELECT COUNT(*) FROM documents WHERE {};", filter.sql),
            filter_params: filter.params,
            order_params: order_by.params,
            limit: options.limit,
            fetched: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn upsert(&self, collection: &str, document: &Document) -> StoreResult<DocumentId> {
        for name in document.body.keys() {
            validate_body_field(name)?;
        }
        let id = document.id.unwrap_or_else(Uuid::new_v4);
        let body = serde_json::to_string(&document.body)?;

        self.conn.execute(
            &format!(
                "INSERT INTO documents (collection, id, body)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (collection, id) DO UPDATE SET
                    body = excluded.body,
                    updated_at = {NOW_MS_SQL};"
            ),
            params![collection, id.to_string(), body],
        )?;
        Ok(id)
    }

    fn conditional_update(
        &self,
        collection: &str,
        query: &Query,
        fields: &Fields,
        options: &UpdateOptions,
    ) -> StoreResult<UpdateOutcome> {
        let mut params: Vec<SqlValue> = Vec::new();
        let mut set_expr = String::from("json_set(body");
        for (name, value) in fields {
            validate_body_field(name)?;
            set_expr.push_str(", ?, json(?)");
            params.push(SqlValue::Text(field_path(name)));
            params.push(SqlValue::Text(serde_json::to_string(value)?));
        }
        set_expr.push(')');
        if fields.is_empty() {
            set_expr = String::from("body");
        }

        let filter = Filter::build(collection, query)?;
        let target = filter.target_sql(!options.multi);
        params.extend(filter.params);

        let sql = format!(
            "UPDATE documents SET body = {set_expr}, updated_at = {NOW_MS_SQL} WHERE {target};"
        );
        let changed = self.conn.execute(&sql, params_from_iter(params))?;
        Ok(UpdateOutcome {
            matched_count: changed as u64,
        })
    }

    fn remove(
        &self,
        collection: &str,
        query: &Query,
        options: &RemoveOptions,
    ) -> StoreResult<u64> {
        let filter = Filter::build(collection, query)?;
        let sql = format!(
            "DELETE FROM documents WHERE {};",
            filter.target_sql(options.just_one)
        );
        let removed = self.conn.execute(&sql, params_from_iter(filter.params))?;
        Ok(removed as u64)
    }

    fn count(&self, collection: &str, query: &Query) -> StoreResult<u64> {
        let filter = Filter::build(collection, query)?;
        let sql = format!("SELECT COUNT(*) FROM documents WHERE {};", filter.sql);
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(filter.params), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn ensure_index(&self, collection: &str, field: &str) -> StoreResult<()> {
        validate_body_field(field)?;
        let index_name = index_name(collection, field);
        self.conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {index_name}
             ON documents (collection, {expr});",
            expr = field_expr(field),
        ))?;
        self.conn.execute(
            "INSERT OR IGNORE INTO document_indexes (collection, field, index_name)
             VALUES (?1, ?2, ?3);",
            params![collection, field, index_name],
        )?;
        debug!(
            "event=ensure_index module=store status=ok collection={collection} field={field}"
        );
        Ok(())
    }
}

/// `WHERE` fragment plus its positional parameters.
struct Filter {
    sql: String,
    params: Vec<SqlValue>,
}

impl Filter {
    fn build(collection: &str, query: &Query) -> StoreResult<Self> {
        query.validate()?;
        let mut sql = String::from("collection = ?");
        let mut params = vec![SqlValue::Text(collection.to_string())];

        if let Some(id) = query.id() {
            sql.push_str(" AND id = ?");
            params.push(SqlValue::Text(id.to_string()));
        }

        for (name, value) in query.predicates() {
            let expr = field_expr(name);
            if value.is_null() {
                sql.push_str(&format!(" AND ({expr} IS NULL OR {expr} = 'null')"));
            } else {
                sql.push_str(&format!(" AND {expr} = ?"));
                params.push(SqlValue::Text(serde_json::to_string(value)?));
            }
        }

        Ok(Self { sql, params })
    }

    /// Narrows the filter to the oldest matching row when `single` is set.
    fn target_sql(&self, single: bool) -> String {
        if single {
            format!(
                "seq = (SELECT seq FROM documents WHERE {} ORDER BY seq ASC LIMIT 1)",
                self.sql
            )
        } else {
            self.sql.clone()
        }
    }
}

fn order_by_clause(sort: Option<&SortSpec>) -> StoreResult<Filter> {
    let mut terms = Vec::new();
    let mut params = Vec::new();
    for (name, order) in sort.map(SortSpec::keys).unwrap_or_default() {
        let direction = match order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        if name == ID_FIELD {
            terms.push(format!("id {direction}"));
        } else {
            validate_body_field(name)?;
            terms.push(format!("json_extract(body, ?) {direction}"));
            params.push(SqlValue::Text(field_path(name)));
        }
    }
    terms.push("seq ASC".to_string());
    Ok(Filter {
        sql: terms.join(", "),
        params,
    })
}

/// Lazily paged cursor over a `SELECT` on `documents`.
struct SqliteCursor<'conn> {
    conn: &'conn Connection,
    select_sql: String,
    count_sql: String,
    filter_params: Vec<SqlValue>,
    order_params: Vec<SqlValue>,
    limit: Option<u64>,
    fetched: u64,
    buffer: VecDeque<Document>,
    exhausted: bool,
}

impl SqliteCursor<'_> {
    fn fill_page(&mut self) -> StoreResult<()> {
        let remaining = self
            .limit
            .map_or(CURSOR_PAGE_SIZE, |limit| limit.saturating_sub(self.fetched));
        let page_size = remaining.min(CURSOR_PAGE_SIZE);
        if page_size == 0 {
            self.exhausted = true;
            return Ok(());
        }

        let mut params = self.filter_params.clone();
        params.extend(self.order_params.iter().cloned());
        params.push(SqlValue::Integer(to_sql_int(page_size)));
        params.push(SqlValue::Integer(to_sql_int(self.fetched)));

        let conn = self.conn;
        let sql = format!("{} LIMIT ? OFFSET ?;", self.select_sql);
        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;
        let mut loaded = 0;
        while let Some(row) = rows.next()? {
            self.buffer.push_back(parse_document_row(row)?);
            loaded += 1;
        }

        self.fetched += loaded;
        if loaded < page_size {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for SqliteCursor<'_> {
    type Item = StoreResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fill_page() {
                self.exhausted = true;
                self.buffer.clear();
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl DocumentCursor for SqliteCursor<'_> {
    fn total(&self) -> Option<StoreResult<u64>> {
        let total = self
            .conn
            .query_row(
                &self.count_sql,
                params_from_iter(self.filter_params.iter()),
                |row| row.get::<_, i64>(0),
            )
            .map(|count| {
                let count = count.max(0) as u64;
                self.limit.map_or(count, |limit| count.min(limit))
            })
            .map_err(StoreError::from);
        Some(total)
    }
}

fn parse_document_row(row: &Row<'_>) -> StoreResult<Document> {
    let id: String = row.get("id")?;
    let body: String = row.get("body")?;
    decode_document(&id, &body)
}

fn decode_document(id_text: &str, body_text: &str) -> StoreResult<Document> {
    let id = Uuid::parse_str(id_text).map_err(|_| {
        StoreError::InvalidData(format!("invalid id value `{id_text}` in documents.id"))
    })?;
    match serde_json::from_str::<Value>(body_text) {
        Ok(Value::Object(body)) => Ok(Document::new(Some(id), body)),
        Ok(other) => Err(StoreError::InvalidData(format!(
            "document {id} body is not an object: {other}"
        ))),
        Err(err) => Err(StoreError::InvalidData(format!(
            "document {id} body is not valid JSON: {err}"
        ))),
    }
}

fn field_path(name: &str) -> String {
    format!("$.\"{name}\"")
}

/// Canonical JSON text of one body field, shared by filters and indexes so
/// SQLite can match predicates against `ensure_index` expressions.
fn field_expr(name: &str) -> String {
    format!("body -> {}", sql_literal(&field_path(name)))
}

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn index_name(collection: &str, field: &str) -> String {
    let hex = |text: &str| {
        text.bytes()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>()
    };
    format!("idx_doc_{}_{}", hex(collection), hex(field))
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
