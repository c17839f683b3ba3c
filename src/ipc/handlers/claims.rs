use crate::ipc::error::ApiError;
use crate::ipc::helpers::{
    caller, filter_value, require_id, require_role, respond, Fields, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, claim, exam, user, Claim, ClaimStatus, Filter, Role, User};
use serde_json::json;
use tracing::info;

const STATUSES: &str = "pending, approved, rejected";

fn ensure_can_see(me: &User, c: &Claim) -> Result<(), ApiError> {
    match me.role {
        Role::Admin => Ok(()),
        Role::Teacher if c.teacher_id == me.id => Ok(()),
        _ => Err(ApiError::Forbidden("this claim belongs to another teacher".into())),
    }
}

fn handle_claims_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = caller(state, req)?;
    require_role(&me, &[Role::Admin, Role::Teacher])?;
    let mut filter = Filter::new();
    filter
        .eq("status", filter_value(&req.params, "status"))
        .eq("exam_id", filter_value(&req.params, "examId"));
    if me.role == Role::Teacher {
        filter.eq("teacher_id", Some(me.id.clone()));
    } else {
        filter.eq("teacher_id", filter_value(&req.params, "teacherId"));
    }
    let claims = claim::list(state.conn()?, &filter)?;
    Ok(json!({ "claims": claims }))
}

fn handle_claims_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = caller(state, req)?;
    let id = require_id(&req.params)?;
    let c = claim::find(state.conn()?, &id)?.ok_or(ApiError::NotFound("claim"))?;
    ensure_can_see(&me, &c)?;
    Ok(json!({ "claim": c }))
}

fn handle_claims_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = caller(state, req)?;
    require_role(&me, &[Role::Admin, Role::Teacher])?;
    let conn = state.conn()?;

    let mut f = Fields::new(&req.params);
    let exam_id = f.required_str("examId");
    let message = f.required_str("message");
    let exam_type = f.optional_str("examType");
    let teacher_id = f.optional_str("teacherId");

    let found = if exam_id.is_empty() {
        None
    } else {
        exam::find(conn, &exam_id)?
    };
    if !exam_id.is_empty() && found.is_none() {
        f.reject("examId", "unknown exam");
    }

    // Teachers file claims for themselves; an admin may file for a teacher.
    let teacher = match (me.role, teacher_id) {
        (Role::Admin, Some(tid)) => match user::find(conn, &tid)? {
            Some(t) if t.role == Role::Teacher => Some(t),
            _ => {
                f.reject("teacherId", "unknown teacher");
                None
            }
        },
        _ => Some(me.clone()),
    };
    f.finish()?;
    let (Some(found), Some(teacher)) = (found, teacher) else {
        return Err(ApiError::field("examId", "unknown exam"));
    };

    let now = model::now_rfc3339();
    let c = Claim {
        id: model::new_id(),
        exam_id: found.id,
        teacher_id: teacher.id,
        teacher_name: teacher.name,
        message,
        exam_type: exam_type.unwrap_or(found.exam_type),
        status: ClaimStatus::Pending,
        created_at: now.clone(),
        updated_at: now,
    };
    claim::insert(conn, &c)?;
    info!(claim_id = %c.id, exam_id = %c.exam_id, "claim filed");
    Ok(json!({ "claim": c }))
}

fn handle_claims_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = caller(state, req)?;
    require_role(&me, &[Role::Admin])?;
    let conn = state.conn()?;
    let id = require_id(&req.params)?;
    let mut c = claim::find(conn, &id)?.ok_or(ApiError::NotFound("claim"))?;

    let mut f = Fields::new(&req.params);
    if f.has("status") {
        if let Some(s) = f.required_parsed::<ClaimStatus>("status", STATUSES) {
            c.status = s;
        }
    }
    if f.has("message") {
        c.message = f.required_str("message");
    }
    if f.has("examType") {
        c.exam_type = f.required_str("examType");
    }
    if f.has("examId") {
        c.exam_id = f.required_str("examId");
        if !c.exam_id.is_empty() && exam::find(conn, &c.exam_id)?.is_none() {
            f.reject("examId", "unknown exam");
        }
    }
    f.finish()?;

    c.updated_at = model::now_rfc3339();
    claim::update(conn, &c)?;
    info!(claim_id = %c.id, status = c.status.as_str(), "claim updated");
    Ok(json!({ "claim": c }))
}

fn handle_claims_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let me = caller(state, req)?;
    let conn = state.conn()?;
    let id = require_id(&req.params)?;
    let c = claim::find(conn, &id)?.ok_or(ApiError::NotFound("claim"))?;
    ensure_can_see(&me, &c)?;
    model::delete_by_id(conn, "claims", &id)?;
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "claims.list" => handle_claims_list(state, req),
        "claims.get" => handle_claims_get(state, req),
        "claims.create" => handle_claims_create(state, req),
        "claims.update" => handle_claims_update(state, req),
        "claims.delete" => handle_claims_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
