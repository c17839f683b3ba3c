use std::collections::BTreeMap;

use crate::ipc::error::ApiError;
use crate::ipc::handlers::users::import_reason;
use crate::ipc::helpers::{
    admin, caller, csv_quote, csv_rows, filter_value, parse_time, require_id, respond, Fields,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, exam, Exam, Filter, Role};
use serde_json::json;
use tracing::info;

/// CSV columns, also the JSON keys of an exam.
const COLUMNS: [&str; 11] = [
    "type",
    "module",
    "teacher",
    "room",
    "specialite",
    "niveau",
    "group",
    "semester",
    "date",
    "startTime",
    "endTime",
];

fn blank_exam() -> Exam {
    let now = model::now_rfc3339();
    Exam {
        id: model::new_id(),
        exam_type: String::new(),
        module: String::new(),
        teacher: String::new(),
        room: String::new(),
        specialite: String::new(),
        niveau: String::new(),
        group_name: String::new(),
        semester: String::new(),
        date: String::new(),
        start_time: String::new(),
        end_time: String::new(),
        created_at: now.clone(),
        updated_at: now,
    }
}

fn apply_fields(params: &serde_json::Value, e: &mut Exam, creating: bool) -> Result<(), ApiError> {
    let mut f = Fields::new(params);
    let text_fields: [(&str, &mut String); 8] = [
        ("type", &mut e.exam_type),
        ("module", &mut e.module),
        ("teacher", &mut e.teacher),
        ("room", &mut e.room),
        ("specialite", &mut e.specialite),
        ("niveau", &mut e.niveau),
        ("group", &mut e.group_name),
        ("semester", &mut e.semester),
    ];
    for (key, slot) in text_fields {
        if creating || f.has(key) {
            *slot = f.required_str(key);
        }
    }
    if creating || f.has("date") {
        e.date = f.date("date");
    }
    if creating || f.has("startTime") {
        e.start_time = f.time("startTime");
    }
    if creating || f.has("endTime") {
        e.end_time = f.time("endTime");
    }
    if let (Some(start), Some(end)) = (parse_time(&e.start_time), parse_time(&e.end_time)) {
        if start >= end {
            f.reject("endTime", "endTime must be after startTime");
        }
    }
    f.finish()
}

fn list_filter(params: &serde_json::Value) -> Filter {
    let mut filter = Filter::new();
    filter
        .eq("specialite", filter_value(params, "specialite"))
        .eq("niveau", filter_value(params, "niveau"))
        .eq("group_name", filter_value(params, "group"))
        .eq("semester", filter_value(params, "semester"))
        .eq("teacher", filter_value(params, "teacher"))
        .eq("date", filter_value(params, "date"));
    filter
}

fn handle_exams_list(state: &mut AppState, req: &Request) -> HandlerResult {
    caller(state, req)?;
    let exams = exam::list(state.conn()?, &list_filter(&req.params))?;
    Ok(json!({ "exams": exams }))
}

/// Exams relevant to the caller: a student's cohort, a teacher's own sittings.
fn handle_exams_mine(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = caller(state, req)?;
    let mut filter = Filter::new();
    match me.role {
        Role::Admin => {}
        Role::Teacher => {
            filter.eq("teacher", Some(me.name.clone()));
        }
        Role::Student => {
            let group_name = match &me.group_id {
                Some(gid) => model::group::find(state.conn()?, gid)?.map(|g| g.name),
                None => None,
            };
            // A student without a cohort has no exams rather than all of them.
            if group_name.is_none() && me.specialite.is_none() && me.niveau.is_none() {
                return Ok(json!({ "exams": [] }));
            }
            filter
                .eq("group_name", group_name)
                .eq("specialite", me.specialite.clone())
                .eq("niveau", me.niveau.clone());
        }
    }
    let exams = exam::list(state.conn()?, &filter)?;
    Ok(json!({ "exams": exams }))
}

fn handle_exams_get(state: &mut AppState, req: &Request) -> HandlerResult {
    caller(state, req)?;
    let id = require_id(&req.params)?;
    let e = exam::find(state.conn()?, &id)?.ok_or(ApiError::NotFound("exam"))?;
    Ok(json!({ "exam": e }))
}

fn handle_exams_create(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let mut e = blank_exam();
    apply_fields(&req.params, &mut e, true)?;
    exam::insert(state.conn()?, &e)?;
    info!(exam_id = %e.id, module = %e.module, date = %e.date, "exam scheduled");
    Ok(json!({ "exam": e }))
}

fn handle_exams_update(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let conn = state.conn()?;
    let id = require_id(&req.params)?;
    let mut e = exam::find(conn, &id)?.ok_or(ApiError::NotFound("exam"))?;
    apply_fields(&req.params, &mut e, false)?;
    e.updated_at = model::now_rfc3339();
    exam::update(conn, &e)?;
    Ok(json!({ "exam": e }))
}

fn handle_exams_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let id = require_id(&req.params)?;
    if !model::delete_by_id(state.conn()?, "exams", &id)? {
        return Err(ApiError::NotFound("exam"));
    }
    Ok(json!({ "deleted": id }))
}

fn handle_exams_import(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let Some(text) = req.params.get("csv").and_then(|v| v.as_str()) else {
        return Err(ApiError::BadParams("missing csv".into()));
    };
    let dry_run = req
        .params
        .get("dryRun")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let mut accepted: Vec<Exam> = Vec::new();
    let mut skipped: Vec<serde_json::Value> = Vec::new();
    for (line, cells) in csv_rows(text) {
        let row: BTreeMap<&str, &str> = COLUMNS
            .iter()
            .zip(cells.iter())
            .filter(|(_, cell)| !cell.trim().is_empty())
            .map(|(col, cell)| (*col, cell.as_str()))
            .collect();
        let row = json!(row);
        let mut e = blank_exam();
        match apply_fields(&row, &mut e, true) {
            Ok(()) => accepted.push(e),
            Err(err) => skipped.push(json!({ "line": line, "reason": import_reason(err) })),
        }
    }

    if !dry_run && !accepted.is_empty() {
        let conn = state.conn()?;
        let tx = conn.unchecked_transaction()?;
        for e in &accepted {
            exam::insert(&tx, e)?;
        }
        tx.commit()?;
        info!(count = accepted.len(), "exams imported");
    }

    Ok(json!({
        "dryRun": dry_run,
        "created": accepted.len(),
        "skipped": skipped,
    }))
}

fn handle_exams_export(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let exams = exam::list(state.conn()?, &list_filter(&req.params))?;
    let mut out = COLUMNS.join(",");
    out.push('\n');
    for e in &exams {
        let cells = [
            &e.exam_type,
            &e.module,
            &e.teacher,
            &e.room,
            &e.specialite,
            &e.niveau,
            &e.group_name,
            &e.semester,
            &e.date,
            &e.start_time,
            &e.end_time,
        ];
        let line: Vec<String> = cells.iter().map(|c| csv_quote(c)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    Ok(json!({ "csv": out, "rows": exams.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "exams.list" => handle_exams_list(state, req),
        "exams.mine" => handle_exams_mine(state, req),
        "exams.get" => handle_exams_get(state, req),
        "exams.create" => handle_exams_create(state, req),
        "exams.update" => handle_exams_update(state, req),
        "exams.delete" => handle_exams_delete(state, req),
        "exams.import" => handle_exams_import(state, req),
        "exams.export" => handle_exams_export(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
