use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Levels and specialties share one shape: a unique name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    Levels,
    Specialties,
}

impl Catalog {
    pub fn table(self) -> &'static str {
        match self {
            Catalog::Levels => "levels",
            Catalog::Specialties => "specialties",
        }
    }

    pub fn entity(self) -> &'static str {
        match self {
            Catalog::Levels => "level",
            Catalog::Specialties => "specialty",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl CatalogEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }
}

pub fn find(conn: &Connection, catalog: Catalog, id: &str) -> rusqlite::Result<Option<CatalogEntry>> {
    conn.query_row(
        &format!(
            "SELECT id, name, created_at, updated_at FROM {} WHERE id = ?",
            catalog.table()
        ),
        [id],
        CatalogEntry::from_row,
    )
    .optional()
}

pub fn list(conn: &Connection, catalog: Catalog) -> rusqlite::Result<Vec<CatalogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, created_at, updated_at FROM {} ORDER BY name",
        catalog.table()
    ))?;
    let rows = stmt.query_map([], CatalogEntry::from_row)?;
    rows.collect()
}

pub fn insert(conn: &Connection, catalog: Catalog, e: &CatalogEntry) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {}(id, name, created_at, updated_at) VALUES(?, ?, ?, ?)",
            catalog.table()
        ),
        (&e.id, &e.name, &e.created_at, &e.updated_at),
    )?;
    Ok(())
}

pub fn update(conn: &Connection, catalog: Catalog, e: &CatalogEntry) -> rusqlite::Result<bool> {
    let n = conn.execute(
        &format!(
            "UPDATE {} SET name = ?, updated_at = ? WHERE id = ?",
            catalog.table()
        ),
        (&e.name, &e.updated_at, &e.id),
    )?;
    Ok(n > 0)
}
