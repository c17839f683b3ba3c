use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::model;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMail {
    pub id: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub created_at: String,
}

/// Outgoing mail is queued in the workspace; delivery belongs to whatever
/// relay the deployment runs.
pub fn queue(conn: &Connection, recipient: &str, subject: &str, body: &str) -> rusqlite::Result<()> {
    let id = model::new_id();
    conn.execute(
        "INSERT INTO mail_outbox(id, recipient, subject, body, created_at) VALUES(?, ?, ?, ?, ?)",
        (&id, recipient, subject, body, model::now_rfc3339()),
    )?;
    info!(mail_id = %id, recipient, subject, "queued mail");
    Ok(())
}

pub fn outbox(conn: &Connection) -> rusqlite::Result<Vec<QueuedMail>> {
    let mut stmt = conn.prepare(
        "SELECT id, recipient, subject, body, created_at
         FROM mail_outbox
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(QueuedMail {
            id: row.get(0)?,
            recipient: row.get(1)?,
            subject: row.get(2)?,
            body: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;
    rows.collect()
}
