use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    admin, caller, filter_value, require_id, respond, Fields, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, catalog, module, Catalog, Filter, Module};
use rusqlite::Connection;
use serde_json::json;

fn apply_fields(
    conn: &Connection,
    params: &serde_json::Value,
    m: &mut Module,
    creating: bool,
) -> Result<(), ApiError> {
    let mut f = Fields::new(params);
    if creating || f.has("name") {
        m.name = f.required_str("name");
    }
    if f.has("code") {
        m.code = f.optional_str("code");
    }
    if f.has("semester") {
        m.semester = f.optional_str("semester");
    }
    if f.has("levelId") {
        m.level_id = f.optional_str("levelId");
    }
    if f.has("specialtyId") {
        m.specialty_id = f.optional_str("specialtyId");
    }
    if let Some(id) = &m.level_id {
        if catalog::find(conn, Catalog::Levels, id)?.is_none() {
            f.reject("levelId", "unknown level");
        }
    }
    if let Some(id) = &m.specialty_id {
        if catalog::find(conn, Catalog::Specialties, id)?.is_none() {
            f.reject("specialtyId", "unknown specialty");
        }
    }
    f.finish()
}

fn handle_modules_list(state: &mut AppState, req: &Request) -> HandlerResult {
    caller(state, req)?;
    let mut filter = Filter::new();
    filter
        .eq("level_id", filter_value(&req.params, "levelId"))
        .eq("specialty_id", filter_value(&req.params, "specialtyId"))
        .eq("semester", filter_value(&req.params, "semester"));
    let modules = module::list(state.conn()?, &filter)?;
    Ok(json!({ "modules": modules }))
}

fn handle_modules_get(state: &mut AppState, req: &Request) -> HandlerResult {
    caller(state, req)?;
    let id = require_id(&req.params)?;
    let m = module::find(state.conn()?, &id)?.ok_or(ApiError::NotFound("module"))?;
    Ok(json!({ "module": m }))
}

fn handle_modules_create(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let conn = state.conn()?;
    let now = model::now_rfc3339();
    let mut m = Module {
        id: model::new_id(),
        name: String::new(),
        code: None,
        level_id: None,
        specialty_id: None,
        semester: None,
        created_at: now.clone(),
        updated_at: now,
    };
    apply_fields(conn, &req.params, &mut m, true)?;
    module::insert(conn, &m)?;
    Ok(json!({ "module": m }))
}

fn handle_modules_update(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let conn = state.conn()?;
    let id = require_id(&req.params)?;
    let mut m = module::find(conn, &id)?.ok_or(ApiError::NotFound("module"))?;
    apply_fields(conn, &req.params, &mut m, false)?;
    m.updated_at = model::now_rfc3339();
    module::update(conn, &m)?;
    Ok(json!({ "module": m }))
}

fn handle_modules_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let id = require_id(&req.params)?;
    if !model::delete_by_id(state.conn()?, "modules", &id)? {
        return Err(ApiError::NotFound("module"));
    }
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "modules.list" => handle_modules_list(state, req),
        "modules.get" => handle_modules_get(state, req),
        "modules.create" => handle_modules_create(state, req),
        "modules.update" => handle_modules_update(state, req),
        "modules.delete" => handle_modules_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
