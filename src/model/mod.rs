//! Plain records and their data access, one module per table.
//!
//! Relationships are foreign-key fields. Nothing here walks an object graph:
//! callers resolve a parent with its own `find`.

pub mod catalog;
pub mod claim;
pub mod exam;
pub mod group;
pub mod module;
pub mod notification;
pub mod room;
pub mod user;

pub use catalog::{Catalog, CatalogEntry};
pub use claim::{Claim, ClaimStatus};
pub use exam::Exam;
pub use group::Group;
pub use module::Module;
pub use notification::Notification;
pub use room::Room;
pub use user::{Role, User};

use rusqlite::types::Value;
use rusqlite::Connection;
use uuid::Uuid;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Deletes one row by id. Returns false when no row had that id.
pub fn delete_by_id(conn: &Connection, table: &str, id: &str) -> rusqlite::Result<bool> {
    let sql = format!("DELETE FROM {table} WHERE id = ?");
    Ok(conn.execute(&sql, [id])? > 0)
}

/// Equality filters for list queries, bound positionally.
#[derive(Default)]
pub struct Filter {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(&mut self, column: &str, value: Option<String>) -> &mut Self {
        if let Some(v) = value {
            self.clauses.push(format!("{column} = ?"));
            self.values.push(Value::Text(v));
        }
        self
    }

    pub fn eq_bool(&mut self, column: &str, value: Option<bool>) -> &mut Self {
        if let Some(v) = value {
            self.clauses.push(format!("{column} = ?"));
            self.values.push(Value::Integer(v as i64));
        }
        self
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

pub(crate) fn query_list<T>(
    conn: &Connection,
    sql: &str,
    filter: &Filter,
    map: impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(filter.values().iter()), map)?;
    rows.collect()
}
