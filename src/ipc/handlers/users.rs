use std::collections::HashSet;

use crate::auth;
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    admin, caller, csv_rows, filter_value, require_id, respond, Fields, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, group, user, Filter, Role, User};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

const IMPORT_COLUMNS: [&str; 9] = [
    "matricule",
    "name",
    "email",
    "role",
    "password",
    "specialite",
    "niveau",
    "anneeScolaire",
    "groupId",
];

fn blank_user() -> User {
    let now = model::now_rfc3339();
    User {
        id: model::new_id(),
        matricule: String::new(),
        name: String::new(),
        email: String::new(),
        role: Role::Student,
        password_hash: String::new(),
        specialite: None,
        niveau: None,
        annee_scolaire: None,
        group_id: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

/// Applies the provided fields to `u`. When `creating`, the identity fields
/// are required.
fn apply_fields(
    conn: &Connection,
    params: &serde_json::Value,
    u: &mut User,
    creating: bool,
) -> Result<(), ApiError> {
    let mut f = Fields::new(params);
    if creating || f.has("matricule") {
        u.matricule = f.required_str("matricule");
    }
    if creating || f.has("name") {
        u.name = f.required_str("name");
    }
    if creating || f.has("email") {
        u.email = f.email("email");
    }
    if creating || f.has("role") {
        if let Some(role) = f.required_parsed::<Role>("role", "admin, teacher, student") {
            u.role = role;
        }
    }
    if creating || f.has("password") {
        if let Some(p) = f.password("password") {
            u.password_hash = auth::hash_password(&p);
        }
    }
    if f.has("specialite") {
        u.specialite = f.optional_str("specialite");
    }
    if f.has("niveau") {
        u.niveau = f.optional_str("niveau");
    }
    if f.has("anneeScolaire") {
        u.annee_scolaire = f.optional_str("anneeScolaire");
    }
    if f.has("groupId") {
        u.group_id = f.optional_str("groupId");
    }

    if !u.matricule.is_empty() {
        if let Some(other) = user::find_by_matricule(conn, &u.matricule)? {
            if other.id != u.id {
                f.reject("matricule", "matricule has already been taken");
            }
        }
    }
    if let Some(gid) = &u.group_id {
        if group::find(conn, gid)?.is_none() {
            f.reject("groupId", "unknown group");
        }
    }
    f.finish()
}

/// Creates a user from request-shaped fields. Shared with first-run setup.
pub(crate) fn create_user(conn: &Connection, params: &serde_json::Value) -> Result<User, ApiError> {
    let mut u = blank_user();
    apply_fields(conn, params, &mut u, true)?;
    user::insert(conn, &u)?;
    info!(user_id = %u.id, matricule = %u.matricule, role = %u.role, "user created");
    Ok(u)
}

fn handle_users_list(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let conn = state.conn()?;
    let mut filter = Filter::new();
    filter
        .eq("role", filter_value(&req.params, "role"))
        .eq("group_id", filter_value(&req.params, "groupId"))
        .eq("matricule", filter_value(&req.params, "matricule"));
    let users = user::list(conn, &filter)?;
    Ok(json!({ "users": users }))
}

fn handle_users_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = caller(state, req)?;
    let id = require_id(&req.params)?;
    if me.role != Role::Admin && me.id != id {
        return Err(ApiError::Forbidden("you may only view your own account".into()));
    }
    let u = user::find(state.conn()?, &id)?.ok_or(ApiError::NotFound("user"))?;
    Ok(json!({ "user": u }))
}

fn handle_users_create(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let u = create_user(state.conn()?, &req.params)?;
    Ok(json!({ "user": u }))
}

fn handle_users_update(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let conn = state.conn()?;
    let id = require_id(&req.params)?;
    let mut u = user::find(conn, &id)?.ok_or(ApiError::NotFound("user"))?;
    apply_fields(conn, &req.params, &mut u, false)?;
    u.updated_at = model::now_rfc3339();
    if !user::update(conn, &u)? {
        return Err(ApiError::NotFound("user"));
    }
    Ok(json!({ "user": u }))
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = admin(state, req)?;
    let id = require_id(&req.params)?;
    if me.id == id {
        return Err(ApiError::Forbidden("you cannot delete your own account".into()));
    }
    if !user::delete(state.conn()?, &id)? {
        return Err(ApiError::NotFound("user"));
    }
    info!(user_id = %id, "user deleted");
    Ok(json!({ "deleted": id }))
}

fn handle_users_import(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let Some(text) = req.params.get("csv").and_then(|v| v.as_str()) else {
        return Err(ApiError::BadParams("missing csv".into()));
    };
    let dry_run = req
        .params
        .get("dryRun")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let conn = state.conn()?;

    let mut accepted: Vec<User> = Vec::new();
    let mut skipped: Vec<serde_json::Value> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for (line, cells) in csv_rows(text) {
        let mut row = serde_json::Map::new();
        for (i, col) in IMPORT_COLUMNS.iter().enumerate() {
            if let Some(cell) = cells.get(i) {
                if !cell.trim().is_empty() {
                    row.insert((*col).to_string(), json!(cell));
                }
            }
        }
        let row = serde_json::Value::Object(row);
        let mut u = blank_user();
        if let Err(e) = apply_fields(conn, &row, &mut u, true) {
            skipped.push(json!({ "line": line, "reason": import_reason(e) }));
            continue;
        }
        if !seen.insert(u.matricule.clone()) {
            skipped.push(json!({ "line": line, "reason": "duplicate matricule in file" }));
            continue;
        }
        accepted.push(u);
    }

    if !dry_run && !accepted.is_empty() {
        let tx = conn.unchecked_transaction()?;
        for u in &accepted {
            user::insert(&tx, u)?;
        }
        tx.commit()?;
        info!(count = accepted.len(), "users imported");
    }

    Ok(json!({
        "dryRun": dry_run,
        "created": accepted.len(),
        "skipped": skipped,
    }))
}

pub(crate) fn import_reason(e: ApiError) -> String {
    match e {
        ApiError::Validation { fields, .. } => fields
            .into_iter()
            .map(|(_, msg)| msg)
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.list" => handle_users_list(state, req),
        "users.get" => handle_users_get(state, req),
        "users.create" => handle_users_create(state, req),
        "users.update" => handle_users_update(state, req),
        "users.delete" => handle_users_delete(state, req),
        "users.import" => handle_users_import(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
