use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "examd.sqlite3";

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILE_NAME)
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!("failed to create workspace {}", workspace.to_string_lossy())
    })?;
    let conn = Connection::open(db_path(workspace))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Opens an in-memory database with the full schema, for tests.
pub fn open_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS levels(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS specialties(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_groups(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            level_id TEXT NOT NULL,
            specialty_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(level_id) REFERENCES levels(id),
            FOREIGN KEY(specialty_id) REFERENCES specialties(id),
            UNIQUE(name, level_id, specialty_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_groups_level ON student_groups(level_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_groups_specialty ON student_groups(specialty_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            matricule TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            specialite TEXT,
            niveau TEXT,
            annee_scolaire TEXT,
            group_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(group_id) REFERENCES student_groups(id)
        )",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)", [])?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_group ON users(group_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS modules(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT,
            level_id TEXT,
            specialty_id TEXT,
            semester TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(level_id) REFERENCES levels(id),
            FOREIGN KEY(specialty_id) REFERENCES specialties(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            capacity INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    // Early workspaces stored rooms without a location.
    ensure_rooms_location(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            exam_type TEXT NOT NULL,
            module TEXT NOT NULL,
            teacher TEXT NOT NULL,
            room TEXT NOT NULL,
            specialite TEXT NOT NULL,
            niveau TEXT NOT NULL,
            group_name TEXT NOT NULL,
            semester TEXT NOT NULL,
            date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exams_date ON exams(date, start_time)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS claims(
            id TEXT PRIMARY KEY,
            exam_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            teacher_name TEXT NOT NULL,
            message TEXT NOT NULL,
            exam_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_claims_exam ON claims(exam_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_claims_teacher ON claims(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications(
            id TEXT PRIMARY KEY,
            teacher_matricule TEXT NOT NULL,
            exam_id TEXT,
            exam_type TEXT,
            message TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(teacher_matricule) REFERENCES users(matricule),
            FOREIGN KEY(exam_id) REFERENCES exams(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notifications_teacher ON notifications(teacher_matricule)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS access_tokens(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            token_hash TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            expires_at TEXT,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    ensure_access_tokens_last_used_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_access_tokens_user ON access_tokens(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS password_reset_tokens(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            token_hash TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mail_outbox(
            id TEXT PRIMARY KEY,
            recipient TEXT NOT NULL,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    ensure_app_key(conn)?;
    Ok(())
}

fn ensure_rooms_location(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "rooms", "location")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE rooms ADD COLUMN location TEXT", [])?;
    Ok(())
}

fn ensure_access_tokens_last_used_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "access_tokens", "last_used_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE access_tokens ADD COLUMN last_used_at TEXT", [])?;
    Ok(())
}

/// Per-workspace secret used to derive form CSRF tokens.
fn ensure_app_key(conn: &Connection) -> anyhow::Result<()> {
    if settings_get_json(conn, "app.key")?.is_some() {
        return Ok(());
    }
    let key = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    settings_set_json(conn, "app.key", &serde_json::Value::String(key))
}

pub fn app_key(conn: &Connection) -> anyhow::Result<String> {
    settings_get_json(conn, "app.key")?
        .and_then(|v| v.as_str().map(str::to_string))
        .context("workspace has no app.key")
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("settings.{key} is invalid JSON"))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopening_keeps_app_key_and_schema() {
        let dir = std::env::temp_dir().join(format!("examd-db-{}", Uuid::new_v4()));
        let first = open_db(&dir).expect("open");
        let key = app_key(&first).expect("key");
        drop(first);

        let second = open_db(&dir).expect("reopen");
        assert_eq!(app_key(&second).expect("key"), key);
        assert!(table_has_column(&second, "rooms", "location").expect("pragma"));
        assert!(table_has_column(&second, "access_tokens", "last_used_at").expect("pragma"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn legacy_rooms_table_gains_location() {
        let conn = Connection::open_in_memory().expect("memory");
        conn.execute(
            "CREATE TABLE rooms(
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                capacity INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .expect("legacy table");
        init_schema(&conn).expect("migrate");
        assert!(table_has_column(&conn, "rooms", "location").expect("pragma"));
    }
}
