use crate::ipc::error::ApiError;
use crate::ipc::helpers::{admin, caller, require_id, respond, Fields, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, room, Room};
use rusqlite::Connection;
use serde_json::json;

/// Validates `params` into a room. With `existing`, only provided fields
/// change. Shared by the JSON API and the server-rendered forms.
pub(crate) fn build_room(
    params: &serde_json::Value,
    existing: Option<Room>,
) -> Result<Room, ApiError> {
    let creating = existing.is_none();
    let now = model::now_rfc3339();
    let mut r = existing.unwrap_or_else(|| Room {
        id: model::new_id(),
        name: String::new(),
        capacity: 0,
        location: None,
        created_at: now.clone(),
        updated_at: now.clone(),
    });
    let mut f = Fields::new(params);
    if creating || f.has("name") {
        r.name = f.required_str("name");
    }
    if creating || f.has("capacity") {
        r.capacity = f.required_int("capacity", 0);
    }
    if f.has("location") {
        r.location = f.optional_str("location");
    }
    f.finish()?;
    r.updated_at = now;
    Ok(r)
}

pub(crate) fn create_room(conn: &Connection, params: &serde_json::Value) -> Result<Room, ApiError> {
    let r = build_room(params, None)?;
    room::insert(conn, &r)?;
    Ok(r)
}

pub(crate) fn update_room(
    conn: &Connection,
    id: &str,
    params: &serde_json::Value,
) -> Result<Room, ApiError> {
    let existing = room::find(conn, id)?.ok_or(ApiError::NotFound("room"))?;
    let r = build_room(params, Some(existing))?;
    room::update(conn, &r)?;
    Ok(r)
}

pub(crate) fn delete_room(conn: &Connection, id: &str) -> Result<(), ApiError> {
    if !model::delete_by_id(conn, "rooms", id)? {
        return Err(ApiError::NotFound("room"));
    }
    Ok(())
}

fn handle_rooms_list(state: &mut AppState, req: &Request) -> HandlerResult {
    caller(state, req)?;
    let rooms = room::list(state.conn()?)?;
    Ok(json!({ "rooms": rooms }))
}

fn handle_rooms_get(state: &mut AppState, req: &Request) -> HandlerResult {
    caller(state, req)?;
    let id = require_id(&req.params)?;
    let r = room::find(state.conn()?, &id)?.ok_or(ApiError::NotFound("room"))?;
    Ok(json!({ "room": r }))
}

fn handle_rooms_create(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let r = create_room(state.conn()?, &req.params)?;
    Ok(json!({ "room": r }))
}

fn handle_rooms_update(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let id = require_id(&req.params)?;
    let r = update_room(state.conn()?, &id, &req.params)?;
    Ok(json!({ "room": r }))
}

fn handle_rooms_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let id = require_id(&req.params)?;
    delete_room(state.conn()?, &id)?;
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "rooms.list" => handle_rooms_list(state, req),
        "rooms.get" => handle_rooms_get(state, req),
        "rooms.create" => handle_rooms_create(state, req),
        "rooms.update" => handle_rooms_update(state, req),
        "rooms.delete" => handle_rooms_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
