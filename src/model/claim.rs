use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{query_list, Filter};

/// Workflow state of a claim. Which transitions are allowed is decided by the
/// school's policy, not here: any value may replace any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Error)]
#[error("unknown claim status: {0}")]
pub struct ParseStatusError(String);

impl ClaimStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ClaimStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ClaimStatus::Pending),
            "approved" => Ok(ClaimStatus::Approved),
            "rejected" => Ok(ClaimStatus::Rejected),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: String,
    pub exam_id: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub message: String,
    pub exam_type: String,
    pub status: ClaimStatus,
    pub created_at: String,
    pub updated_at: String,
}

const COLUMNS: &str =
    "id, exam_id, teacher_id, teacher_name, message, exam_type, status, created_at, updated_at";

impl Claim {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(6)?;
        let status = status
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
        Ok(Self {
            id: row.get(0)?,
            exam_id: row.get(1)?,
            teacher_id: row.get(2)?,
            teacher_name: row.get(3)?,
            message: row.get(4)?,
            exam_type: row.get(5)?,
            status,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Claim>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM claims WHERE id = ?"),
        [id],
        Claim::from_row,
    )
    .optional()
}

pub fn list(conn: &Connection, filter: &Filter) -> rusqlite::Result<Vec<Claim>> {
    query_list(
        conn,
        &format!(
            "SELECT {COLUMNS} FROM claims{} ORDER BY created_at DESC, rowid DESC",
            filter.where_sql()
        ),
        filter,
        Claim::from_row,
    )
}

pub fn insert(conn: &Connection, c: &Claim) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO claims({COLUMNS}) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)"),
        rusqlite::params![
            c.id,
            c.exam_id,
            c.teacher_id,
            c.teacher_name,
            c.message,
            c.exam_type,
            c.status.as_str(),
            c.created_at,
            c.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, c: &Claim) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "UPDATE claims SET exam_id = ?, message = ?, exam_type = ?, status = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            c.exam_id,
            c.message,
            c.exam_type,
            c.status.as_str(),
            c.updated_at,
            c.id,
        ],
    )?;
    Ok(n > 0)
}
