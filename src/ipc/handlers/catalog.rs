use crate::ipc::error::ApiError;
use crate::ipc::helpers::{admin, caller, require_id, respond, Fields, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, catalog, Catalog, CatalogEntry};
use serde_json::json;

fn plural(c: Catalog) -> &'static str {
    match c {
        Catalog::Levels => "levels",
        Catalog::Specialties => "specialties",
    }
}

fn read_name(params: &serde_json::Value) -> Result<String, ApiError> {
    let mut f = Fields::new(params);
    let name = f.required_str("name");
    f.finish()?;
    Ok(name)
}

fn handle_list(state: &mut AppState, req: &Request, c: Catalog) -> HandlerResult {
    caller(state, req)?;
    let entries = catalog::list(state.conn()?, c)?;
    Ok(json!({ plural(c): entries }))
}

fn handle_get(state: &mut AppState, req: &Request, c: Catalog) -> HandlerResult {
    caller(state, req)?;
    let id = require_id(&req.params)?;
    let entry = catalog::find(state.conn()?, c, &id)?.ok_or(ApiError::NotFound(c.entity()))?;
    Ok(json!({ c.entity(): entry }))
}

fn handle_create(state: &mut AppState, req: &Request, c: Catalog) -> HandlerResult {
    admin(state, req)?;
    let name = read_name(&req.params)?;
    let now = model::now_rfc3339();
    let entry = CatalogEntry {
        id: model::new_id(),
        name,
        created_at: now.clone(),
        updated_at: now,
    };
    catalog::insert(state.conn()?, c, &entry)?;
    Ok(json!({ c.entity(): entry }))
}

fn handle_update(state: &mut AppState, req: &Request, c: Catalog) -> HandlerResult {
    admin(state, req)?;
    let conn = state.conn()?;
    let id = require_id(&req.params)?;
    let mut entry = catalog::find(conn, c, &id)?.ok_or(ApiError::NotFound(c.entity()))?;
    if req.params.get("name").is_some() {
        entry.name = read_name(&req.params)?;
    }
    entry.updated_at = model::now_rfc3339();
    catalog::update(conn, c, &entry)?;
    Ok(json!({ c.entity(): entry }))
}

fn handle_delete(state: &mut AppState, req: &Request, c: Catalog) -> HandlerResult {
    admin(state, req)?;
    let id = require_id(&req.params)?;
    if !model::delete_by_id(state.conn()?, c.table(), &id)? {
        return Err(ApiError::NotFound(c.entity()));
    }
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let (prefix, verb) = req.method.split_once('.')?;
    let c = match prefix {
        "levels" => Catalog::Levels,
        "specialties" => Catalog::Specialties,
        _ => return None,
    };
    let result = match verb {
        "list" => handle_list(state, req, c),
        "get" => handle_get(state, req, c),
        "create" => handle_create(state, req, c),
        "update" => handle_update(state, req, c),
        "delete" => handle_delete(state, req, c),
        _ => return None,
    };
    Some(respond(req, result))
}
