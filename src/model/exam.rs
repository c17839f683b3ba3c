use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{query_list, Filter};

/// One scheduled sitting. Module, teacher, room and cohort are stored by
/// display value, the way the scheduling office enters them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    #[serde(rename = "type")]
    pub exam_type: String,
    pub module: String,
    pub teacher: String,
    pub room: String,
    pub specialite: String,
    pub niveau: String,
    #[serde(rename = "group")]
    pub group_name: String,
    pub semester: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`, strictly before `end_time`.
    pub start_time: String,
    pub end_time: String,
    pub created_at: String,
    pub updated_at: String,
}

const COLUMNS: &str = "id, exam_type, module, teacher, room, specialite, niveau, group_name,
     semester, date, start_time, end_time, created_at, updated_at";

impl Exam {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            exam_type: row.get(1)?,
            module: row.get(2)?,
            teacher: row.get(3)?,
            room: row.get(4)?,
            specialite: row.get(5)?,
            niveau: row.get(6)?,
            group_name: row.get(7)?,
            semester: row.get(8)?,
            date: row.get(9)?,
            start_time: row.get(10)?,
            end_time: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Exam>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM exams WHERE id = ?"),
        [id],
        Exam::from_row,
    )
    .optional()
}

pub fn list(conn: &Connection, filter: &Filter) -> rusqlite::Result<Vec<Exam>> {
    query_list(
        conn,
        &format!(
            "SELECT {COLUMNS} FROM exams{} ORDER BY date, start_time, module",
            filter.where_sql()
        ),
        filter,
        Exam::from_row,
    )
}

pub fn insert(conn: &Connection, e: &Exam) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO exams({COLUMNS}) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ),
        rusqlite::params![
            e.id,
            e.exam_type,
            e.module,
            e.teacher,
            e.room,
            e.specialite,
            e.niveau,
            e.group_name,
            e.semester,
            e.date,
            e.start_time,
            e.end_time,
            e.created_at,
            e.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, e: &Exam) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "UPDATE exams SET exam_type = ?, module = ?, teacher = ?, room = ?, specialite = ?,
           niveau = ?, group_name = ?, semester = ?, date = ?, start_time = ?, end_time = ?,
           updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            e.exam_type,
            e.module,
            e.teacher,
            e.room,
            e.specialite,
            e.niveau,
            e.group_name,
            e.semester,
            e.date,
            e.start_time,
            e.end_time,
            e.updated_at,
            e.id,
        ],
    )?;
    Ok(n > 0)
}
