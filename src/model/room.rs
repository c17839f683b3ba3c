use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// An exam venue ("salle").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub capacity: i64,
    pub location: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

const COLUMNS: &str = "id, name, capacity, location, created_at, updated_at";

impl Room {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            capacity: row.get(2)?,
            location: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Room>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM rooms WHERE id = ?"),
        [id],
        Room::from_row,
    )
    .optional()
}

pub fn list(conn: &Connection) -> rusqlite::Result<Vec<Room>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM rooms ORDER BY name"))?;
    let rows = stmt.query_map([], Room::from_row)?;
    rows.collect()
}

pub fn insert(conn: &Connection, r: &Room) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO rooms({COLUMNS}) VALUES(?, ?, ?, ?, ?, ?)"),
        rusqlite::params![r.id, r.name, r.capacity, r.location, r.created_at, r.updated_at],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, r: &Room) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "UPDATE rooms SET name = ?, capacity = ?, location = ?, updated_at = ? WHERE id = ?",
        rusqlite::params![r.name, r.capacity, r.location, r.updated_at, r.id],
    )?;
    Ok(n > 0)
}
