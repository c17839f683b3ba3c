use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{query_list, Filter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub level_id: Option<String>,
    pub specialty_id: Option<String>,
    pub semester: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

const COLUMNS: &str = "id, name, code, level_id, specialty_id, semester, created_at, updated_at";

impl Module {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            code: row.get(2)?,
            level_id: row.get(3)?,
            specialty_id: row.get(4)?,
            semester: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Module>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM modules WHERE id = ?"),
        [id],
        Module::from_row,
    )
    .optional()
}

pub fn list(conn: &Connection, filter: &Filter) -> rusqlite::Result<Vec<Module>> {
    query_list(
        conn,
        &format!(
            "SELECT {COLUMNS} FROM modules{} ORDER BY name",
            filter.where_sql()
        ),
        filter,
        Module::from_row,
    )
}

pub fn insert(conn: &Connection, m: &Module) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO modules({COLUMNS}) VALUES(?, ?, ?, ?, ?, ?, ?, ?)"),
        rusqlite::params![
            m.id,
            m.name,
            m.code,
            m.level_id,
            m.specialty_id,
            m.semester,
            m.created_at,
            m.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, m: &Module) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "UPDATE modules SET name = ?, code = ?, level_id = ?, specialty_id = ?, semester = ?,
           updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            m.name,
            m.code,
            m.level_id,
            m.specialty_id,
            m.semester,
            m.updated_at,
            m.id,
        ],
    )?;
    Ok(n > 0)
}
