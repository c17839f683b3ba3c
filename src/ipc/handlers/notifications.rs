use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    admin, caller, filter_bool, filter_value, require_id, respond, Fields, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, exam, notification, user, Filter, Notification, Role, User};
use rusqlite::Connection;
use serde_json::json;

fn ensure_owner(me: &User, n: &Notification) -> Result<(), ApiError> {
    if me.role == Role::Admin || n.teacher_matricule == me.matricule {
        Ok(())
    } else {
        Err(ApiError::Forbidden("this notification is addressed to someone else".into()))
    }
}

fn apply_fields(
    conn: &Connection,
    params: &serde_json::Value,
    n: &mut Notification,
    creating: bool,
) -> Result<(), ApiError> {
    let mut f = Fields::new(params);
    if creating || f.has("teacherMatricule") {
        n.teacher_matricule = f.required_str("teacherMatricule");
        if !n.teacher_matricule.is_empty()
            && user::find_by_matricule(conn, &n.teacher_matricule)?.is_none()
        {
            f.reject("teacherMatricule", "unknown matricule");
        }
    }
    if creating || f.has("message") {
        n.message = f.required_str("message");
    }
    if f.has("examId") {
        n.exam_id = f.optional_str("examId");
    }
    if f.has("examType") {
        n.exam_type = f.optional_str("examType");
    }
    // Read state only moves forward.
    match f.optional_bool("isRead") {
        Some(true) => n.is_read = true,
        Some(false) if n.is_read => {
            f.reject("isRead", "a read notification cannot be marked unread")
        }
        _ => {}
    }
    if let Some(eid) = &n.exam_id {
        match exam::find(conn, eid)? {
            Some(e) => {
                if n.exam_type.is_none() {
                    n.exam_type = Some(e.exam_type);
                }
            }
            None => f.reject("examId", "unknown exam"),
        }
    }
    f.finish()
}

fn handle_notifications_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = caller(state, req)?;
    let mut filter = Filter::new();
    if me.role == Role::Admin {
        filter.eq("teacher_matricule", filter_value(&req.params, "teacherMatricule"));
    } else {
        filter.eq("teacher_matricule", Some(me.matricule.clone()));
    }
    filter.eq_bool("is_read", filter_bool(&req.params, "isRead")?);
    let notifications = notification::list(state.conn()?, &filter)?;
    Ok(json!({ "notifications": notifications }))
}

fn handle_notifications_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = caller(state, req)?;
    let id = require_id(&req.params)?;
    let n = notification::find(state.conn()?, &id)?.ok_or(ApiError::NotFound("notification"))?;
    ensure_owner(&me, &n)?;
    Ok(json!({ "notification": n }))
}

fn handle_notifications_create(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let conn = state.conn()?;
    let now = model::now_rfc3339();
    let mut n = Notification {
        id: model::new_id(),
        teacher_matricule: String::new(),
        exam_id: None,
        exam_type: None,
        message: String::new(),
        is_read: false,
        created_at: now.clone(),
        updated_at: now,
    };
    apply_fields(conn, &req.params, &mut n, true)?;
    notification::insert(conn, &n)?;
    Ok(json!({ "notification": n }))
}

fn handle_notifications_update(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let conn = state.conn()?;
    let id = require_id(&req.params)?;
    let mut n = notification::find(conn, &id)?.ok_or(ApiError::NotFound("notification"))?;
    apply_fields(conn, &req.params, &mut n, false)?;
    n.updated_at = model::now_rfc3339();
    notification::update(conn, &n)?;
    Ok(json!({ "notification": n }))
}

fn handle_notifications_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let id = require_id(&req.params)?;
    if !model::delete_by_id(state.conn()?, "notifications", &id)? {
        return Err(ApiError::NotFound("notification"));
    }
    Ok(json!({ "deleted": id }))
}

fn handle_notifications_mark_read(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = caller(state, req)?;
    let conn = state.conn()?;
    let id = require_id(&req.params)?;
    let n = notification::find(conn, &id)?.ok_or(ApiError::NotFound("notification"))?;
    ensure_owner(&me, &n)?;
    notification::mark_read(conn, &id, &model::now_rfc3339())?;
    let n = notification::find(conn, &id)?.ok_or(ApiError::NotFound("notification"))?;
    Ok(json!({ "notification": n }))
}

fn handle_notifications_mark_all_read(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = caller(state, req)?;
    let updated = notification::mark_all_read(state.conn()?, &me.matricule, &model::now_rfc3339())?;
    Ok(json!({ "updated": updated }))
}

fn handle_notifications_unread_count(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = caller(state, req)?;
    let count = notification::unread_count(state.conn()?, &me.matricule)?;
    Ok(json!({ "unread": count }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "notifications.list" => handle_notifications_list(state, req),
        "notifications.get" => handle_notifications_get(state, req),
        "notifications.create" => handle_notifications_create(state, req),
        "notifications.update" => handle_notifications_update(state, req),
        "notifications.delete" => handle_notifications_delete(state, req),
        "notifications.markRead" => handle_notifications_mark_read(state, req),
        "notifications.markAllRead" => handle_notifications_mark_all_read(state, req),
        "notifications.unreadCount" => handle_notifications_unread_count(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
