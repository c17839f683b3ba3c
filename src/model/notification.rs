use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{query_list, Filter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub teacher_matricule: String,
    pub exam_id: Option<String>,
    pub exam_type: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
    pub updated_at: String,
}

const COLUMNS: &str =
    "id, teacher_matricule, exam_id, exam_type, message, is_read, created_at, updated_at";

impl Notification {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            teacher_matricule: row.get(1)?,
            exam_id: row.get(2)?,
            exam_type: row.get(3)?,
            message: row.get(4)?,
            is_read: row.get::<_, i64>(5)? != 0,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Notification>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM notifications WHERE id = ?"),
        [id],
        Notification::from_row,
    )
    .optional()
}

pub fn list(conn: &Connection, filter: &Filter) -> rusqlite::Result<Vec<Notification>> {
    query_list(
        conn,
        &format!(
            "SELECT {COLUMNS} FROM notifications{} ORDER BY created_at DESC, rowid DESC",
            filter.where_sql()
        ),
        filter,
        Notification::from_row,
    )
}

pub fn insert(conn: &Connection, n: &Notification) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO notifications({COLUMNS}) VALUES(?, ?, ?, ?, ?, ?, ?, ?)"),
        rusqlite::params![
            n.id,
            n.teacher_matricule,
            n.exam_id,
            n.exam_type,
            n.message,
            n.is_read as i64,
            n.created_at,
            n.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, n: &Notification) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE notifications SET teacher_matricule = ?, exam_id = ?, exam_type = ?, message = ?,
           is_read = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            n.teacher_matricule,
            n.exam_id,
            n.exam_type,
            n.message,
            n.is_read as i64,
            n.updated_at,
            n.id,
        ],
    )?;
    Ok(changed > 0)
}

/// Sets `is_read`; rows already read keep their `updated_at`.
pub fn mark_read(conn: &Connection, id: &str, now: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE notifications SET is_read = 1, updated_at = ? WHERE id = ? AND is_read = 0",
        (now, id),
    )?;
    Ok(())
}

pub fn mark_all_read(conn: &Connection, matricule: &str, now: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE notifications SET is_read = 1, updated_at = ?
         WHERE teacher_matricule = ? AND is_read = 0",
        (now, matricule),
    )
}

pub fn unread_count(conn: &Connection, matricule: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE teacher_matricule = ? AND is_read = 0",
        [matricule],
        |r| r.get(0),
    )
}
