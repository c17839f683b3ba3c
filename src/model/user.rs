use std::fmt;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{query_list, Filter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

#[derive(Debug, Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(String);

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "teacher" | "enseignant" => Ok(Role::Teacher),
            "student" | "etudiant" => Ok(Role::Student),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub matricule: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip)]
    pub password_hash: String,
    pub specialite: Option<String>,
    pub niveau: Option<String>,
    pub annee_scolaire: Option<String>,
    pub group_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

const COLUMNS: &str = "id, matricule, name, email, role, password_hash, specialite, niveau,
     annee_scolaire, group_id, created_at, updated_at";

impl User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let role: String = row.get(4)?;
        let role = role
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
        Ok(Self {
            id: row.get(0)?,
            matricule: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            role,
            password_hash: row.get(5)?,
            specialite: row.get(6)?,
            niveau: row.get(7)?,
            annee_scolaire: row.get(8)?,
            group_id: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM users WHERE id = ?"),
        [id],
        User::from_row,
    )
    .optional()
}

pub fn find_by_matricule(conn: &Connection, matricule: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM users WHERE matricule = ?"),
        [matricule],
        User::from_row,
    )
    .optional()
}

/// Emails are not unique; every match is returned.
pub fn find_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Vec<User>> {
    let mut filter = Filter::new();
    filter.eq("lower(email)", Some(email.trim().to_ascii_lowercase()));
    list(conn, &filter)
}

pub fn list(conn: &Connection, filter: &Filter) -> rusqlite::Result<Vec<User>> {
    query_list(
        conn,
        &format!(
            "SELECT {COLUMNS} FROM users{} ORDER BY name, matricule",
            filter.where_sql()
        ),
        filter,
        User::from_row,
    )
}

pub fn count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
}

pub fn insert(conn: &Connection, u: &User) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO users({COLUMNS}) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
        rusqlite::params![
            u.id,
            u.matricule,
            u.name,
            u.email,
            u.role.as_str(),
            u.password_hash,
            u.specialite,
            u.niveau,
            u.annee_scolaire,
            u.group_id,
            u.created_at,
            u.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, u: &User) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "UPDATE users SET matricule = ?, name = ?, email = ?, role = ?, password_hash = ?,
           specialite = ?, niveau = ?, annee_scolaire = ?, group_id = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            u.matricule,
            u.name,
            u.email,
            u.role.as_str(),
            u.password_hash,
            u.specialite,
            u.niveau,
            u.annee_scolaire,
            u.group_id,
            u.updated_at,
            u.id,
        ],
    )?;
    Ok(n > 0)
}

/// Removes a user together with its access and reset tokens. Domain records
/// that still point at the user make this fail with a foreign key violation.
pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM access_tokens WHERE user_id = ?", [id])?;
    tx.execute("DELETE FROM password_reset_tokens WHERE user_id = ?", [id])?;
    let n = tx.execute("DELETE FROM users WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(n > 0)
}
