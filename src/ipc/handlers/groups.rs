use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    admin, caller, filter_value, require_id, respond, Fields, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, catalog, group, Catalog, Filter, Group};
use rusqlite::Connection;
use serde_json::json;

fn apply_fields(
    conn: &Connection,
    params: &serde_json::Value,
    g: &mut Group,
    creating: bool,
) -> Result<(), ApiError> {
    let mut f = Fields::new(params);
    if creating || f.has("name") {
        g.name = f.required_str("name");
    }
    if creating || f.has("levelId") {
        g.level_id = f.required_str("levelId");
        if !g.level_id.is_empty() && catalog::find(conn, Catalog::Levels, &g.level_id)?.is_none() {
            f.reject("levelId", "unknown level");
        }
    }
    if creating || f.has("specialtyId") {
        g.specialty_id = f.required_str("specialtyId");
        if !g.specialty_id.is_empty()
            && catalog::find(conn, Catalog::Specialties, &g.specialty_id)?.is_none()
        {
            f.reject("specialtyId", "unknown specialty");
        }
    }
    f.finish()
}

fn handle_groups_list(state: &mut AppState, req: &Request) -> HandlerResult {
    caller(state, req)?;
    let conn = state.conn()?;
    let mut filter = Filter::new();
    filter
        .eq("level_id", filter_value(&req.params, "levelId"))
        .eq("specialty_id", filter_value(&req.params, "specialtyId"));
    let groups = group::list(conn, &filter)?;
    Ok(json!({ "groups": groups }))
}

fn handle_groups_get(state: &mut AppState, req: &Request) -> HandlerResult {
    caller(state, req)?;
    let conn = state.conn()?;
    let id = require_id(&req.params)?;
    let g = group::find(conn, &id)?.ok_or(ApiError::NotFound("group"))?;
    let members = group::member_count(conn, &id)?;
    Ok(json!({ "group": g, "memberCount": members }))
}

fn handle_groups_create(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let conn = state.conn()?;
    let now = model::now_rfc3339();
    let mut g = Group {
        id: model::new_id(),
        name: String::new(),
        level_id: String::new(),
        specialty_id: String::new(),
        created_at: now.clone(),
        updated_at: now,
    };
    apply_fields(conn, &req.params, &mut g, true)?;
    group::insert(conn, &g)?;
    Ok(json!({ "group": g }))
}

fn handle_groups_update(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let conn = state.conn()?;
    let id = require_id(&req.params)?;
    let mut g = group::find(conn, &id)?.ok_or(ApiError::NotFound("group"))?;
    apply_fields(conn, &req.params, &mut g, false)?;
    g.updated_at = model::now_rfc3339();
    group::update(conn, &g)?;
    Ok(json!({ "group": g }))
}

fn handle_groups_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let id = require_id(&req.params)?;
    if !model::delete_by_id(state.conn()?, "student_groups", &id)? {
        return Err(ApiError::NotFound("group"));
    }
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "groups.list" => handle_groups_list(state, req),
        "groups.get" => handle_groups_get(state, req),
        "groups.create" => handle_groups_create(state, req),
        "groups.update" => handle_groups_update(state, req),
        "groups.delete" => handle_groups_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
