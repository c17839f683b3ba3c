use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{query_list, Filter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    pub level_id: String,
    pub specialty_id: String,
    pub created_at: String,
    pub updated_at: String,
}

const COLUMNS: &str = "id, name, level_id, specialty_id, created_at, updated_at";

impl Group {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            level_id: row.get(2)?,
            specialty_id: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Group>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM student_groups WHERE id = ?"),
        [id],
        Group::from_row,
    )
    .optional()
}

pub fn list(conn: &Connection, filter: &Filter) -> rusqlite::Result<Vec<Group>> {
    query_list(
        conn,
        &format!(
            "SELECT {COLUMNS} FROM student_groups{} ORDER BY name",
            filter.where_sql()
        ),
        filter,
        Group::from_row,
    )
}

/// Number of users assigned to the group.
pub fn member_count(conn: &Connection, id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM users WHERE group_id = ?",
        [id],
        |r| r.get(0),
    )
}

pub fn insert(conn: &Connection, g: &Group) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO student_groups({COLUMNS}) VALUES(?, ?, ?, ?, ?, ?)"),
        (
            &g.id,
            &g.name,
            &g.level_id,
            &g.specialty_id,
            &g.created_at,
            &g.updated_at,
        ),
    )?;
    Ok(())
}

pub fn update(conn: &Connection, g: &Group) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "UPDATE student_groups SET name = ?, level_id = ?, specialty_id = ?, updated_at = ?
         WHERE id = ?",
        (&g.name, &g.level_id, &g.specialty_id, &g.updated_at, &g.id),
    )?;
    Ok(n > 0)
}
