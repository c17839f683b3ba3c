//! REST surface over the request core. Paths resolve to method names; the
//! query string, JSON body and `{id}` path segment merge into `params`.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{
        header::{AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use super::views::{cookie_token, SESSION_COOKIE};
use super::SharedState;
use crate::ipc::{self, error::err, Request};

/// Fixed routes, matched before the generic resource routes.
const ROUTES: &[(&str, &str, &str)] = &[
    ("POST", "setup/admin", "setup.bootstrapAdmin"),
    ("POST", "login", "auth.login"),
    ("POST", "logout", "auth.logout"),
    ("GET", "user", "auth.me"),
    ("POST", "forgot-password", "password.forgot"),
    ("POST", "reset-password", "password.reset"),
    ("POST", "users/import", "users.import"),
    ("POST", "exams/import", "exams.import"),
    ("GET", "exams/export", "exams.export"),
    ("GET", "my/exams", "exams.mine"),
    ("POST", "notifications/read-all", "notifications.markAllRead"),
    ("GET", "notifications/unread-count", "notifications.unreadCount"),
    ("POST", "notifications/{id}/read", "notifications.markRead"),
    ("GET", "mail/outbox", "mail.outbox"),
    ("POST", "backup/export", "backup.export"),
    ("POST", "backup/import", "backup.import"),
];

/// URL segment to method prefix.
const RESOURCES: &[(&str, &str)] = &[
    ("users", "users"),
    ("levels", "levels"),
    ("specialties", "specialties"),
    ("groups", "groups"),
    ("modules", "modules"),
    ("salles", "rooms"),
    ("rooms", "rooms"),
    ("exams", "exams"),
    ("claims", "claims"),
    ("notifications", "notifications"),
];

/// Resolves a path below `/api/` to a method name and optional record id.
pub fn resolve(method: &Method, path: &str) -> Option<(String, Option<String>)> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }

    for (verb, pattern, rpc) in ROUTES {
        if method.as_str() != *verb {
            continue;
        }
        let parts: Vec<&str> = pattern.split('/').collect();
        if parts.len() != segments.len() {
            continue;
        }
        let mut id = None;
        let matched = parts.iter().zip(&segments).all(|(p, s)| {
            if *p == "{id}" {
                id = Some((*s).to_string());
                true
            } else {
                p == s
            }
        });
        if matched {
            return Some(((*rpc).to_string(), id));
        }
    }

    let prefix = RESOURCES
        .iter()
        .find(|(seg, _)| *seg == segments[0])
        .map(|(_, prefix)| *prefix)?;
    let verb = match (segments.len(), method.clone()) {
        (1, Method::GET) => "list",
        (1, Method::POST) => "create",
        (2, Method::GET) => "get",
        (2, Method::PUT) | (2, Method::PATCH) => "update",
        (2, Method::DELETE) => "delete",
        _ => return None,
    };
    let id = (segments.len() == 2).then(|| segments[1].to_string());
    Some((format!("{prefix}.{verb}"), id))
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub fn status_for(envelope: &Value, rpc: &str) -> StatusCode {
    if envelope.get("ok").and_then(Value::as_bool) == Some(true) {
        return if rpc.ends_with(".create") {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
    }
    let code = envelope
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(Value::as_str)
        .unwrap_or("");
    match code {
        "validation_failed" | "bad_params" | "bad_json" => StatusCode::UNPROCESSABLE_ENTITY,
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "forbidden" => StatusCode::FORBIDDEN,
        "not_found" | "not_implemented" => StatusCode::NOT_FOUND,
        "in_use" | "conflict" => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `Set-Cookie` value carrying the page session after a successful login,
/// or expiring it after logout.
pub fn session_cookie(token: Option<&str>) -> String {
    match token {
        Some(t) => format!("{SESSION_COOKIE}={t}; HttpOnly; SameSite=Lax; Path=/"),
        None => format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0"),
    }
}

fn cookie_for(rpc: &str, envelope: &Value) -> Option<String> {
    match rpc {
        "auth.login" => envelope
            .get("result")
            .and_then(|r| r.get("token"))
            .and_then(Value::as_str)
            .map(|t| session_cookie(Some(t))),
        "auth.logout" => Some(session_cookie(None)),
        _ => None,
    }
}

/// Runs one request against the core on the blocking pool.
pub async fn dispatch(state: &SharedState, req: Request) -> Value {
    let request_id = req.id.clone();
    let mut guard = state.clone().lock_owned().await;
    let joined = tokio::task::spawn_blocking(move || ipc::handle_request(&mut guard, req)).await;
    match joined {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "request task failed");
            err(&request_id, "internal", "request task failed", None)
        }
    }
}

pub async fn health(State(state): State<SharedState>) -> Response {
    let req = Request {
        id: Uuid::new_v4().to_string(),
        method: "health".into(),
        params: Value::Null,
        token: None,
    };
    Json(dispatch(&state, req).await).into_response()
}

pub async fn entry(
    State(state): State<SharedState>,
    method: Method,
    Path(rest): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let Some((rpc, id)) = resolve(&method, &rest) else {
        let envelope = err(&request_id, "not_found", format!("no route for {method} /api/{rest}"), None);
        return (StatusCode::NOT_FOUND, Json(envelope)).into_response();
    };

    let mut params = serde_json::Map::new();
    for (k, v) in query {
        params.insert(k, Value::String(v));
    }
    if !body.is_empty() {
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(m)) => params.extend(m),
            Ok(_) => {
                let envelope = err(&request_id, "bad_json", "body must be a JSON object", None);
                return (StatusCode::UNPROCESSABLE_ENTITY, Json(envelope)).into_response();
            }
            Err(e) => {
                let envelope = err(&request_id, "bad_json", e.to_string(), None);
                return (StatusCode::UNPROCESSABLE_ENTITY, Json(envelope)).into_response();
            }
        }
    }
    if let Some(id) = id {
        params.insert("id".into(), Value::String(id));
    }

    // Browsers holding only the page cookie can still sign out.
    let token = bearer_token(&headers).or_else(|| {
        if rpc == "auth.logout" {
            cookie_token(&headers)
        } else {
            None
        }
    });
    let req = Request {
        id: request_id,
        method: rpc.clone(),
        params: Value::Object(params),
        token,
    };
    let envelope = dispatch(&state, req).await;
    let cookie = cookie_for(&rpc, &envelope);
    let mut resp = (status_for(&envelope, &rpc), Json(envelope)).into_response();
    if let Some(v) = cookie.and_then(|c| HeaderValue::from_str(&c).ok()) {
        resp.headers_mut().append(SET_COOKIE, v);
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn rpc(method: Method, path: &str) -> Option<(String, Option<String>)> {
        resolve(&method, path)
    }

    #[test]
    fn resource_routes_map_to_crud_methods() {
        assert_eq!(rpc(Method::GET, "exams"), Some(("exams.list".into(), None)));
        assert_eq!(rpc(Method::POST, "salles"), Some(("rooms.create".into(), None)));
        assert_eq!(
            rpc(Method::PATCH, "claims/c1"),
            Some(("claims.update".into(), Some("c1".into())))
        );
        assert_eq!(
            rpc(Method::DELETE, "users/u9/"),
            Some(("users.delete".into(), Some("u9".into())))
        );
        assert_eq!(rpc(Method::DELETE, "exams"), None);
        assert_eq!(rpc(Method::GET, "widgets"), None);
        assert_eq!(rpc(Method::GET, "exams//x"), None);
    }

    #[test]
    fn fixed_routes_win_over_resource_ids() {
        assert_eq!(rpc(Method::GET, "exams/export"), Some(("exams.export".into(), None)));
        assert_eq!(
            rpc(Method::POST, "notifications/n1/read"),
            Some(("notifications.markRead".into(), Some("n1".into())))
        );
        assert_eq!(rpc(Method::POST, "login"), Some(("auth.login".into(), None)));
        assert_eq!(rpc(Method::GET, "login"), None);
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc123"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn login_and_logout_manage_the_page_cookie() {
        let login = json!({ "ok": true, "result": { "token": "t0k" } });
        let set = cookie_for("auth.login", &login).expect("login cookie");
        assert!(set.starts_with("examd_token=t0k;"));
        assert!(set.contains("HttpOnly"));
        assert!(set.contains("SameSite=Lax"));

        let failed = json!({ "ok": false, "error": { "code": "unauthorized" } });
        assert_eq!(cookie_for("auth.login", &failed), None);
        assert!(cookie_for("auth.logout", &failed)
            .expect("logout cookie")
            .contains("Max-Age=0"));
        assert_eq!(cookie_for("rooms.list", &login), None);
    }

    #[test]
    fn error_codes_map_to_statuses() {
        let e = |code: &str| json!({ "ok": false, "error": { "code": code } });
        assert_eq!(status_for(&json!({ "ok": true }), "exams.create"), StatusCode::CREATED);
        assert_eq!(status_for(&json!({ "ok": true }), "exams.list"), StatusCode::OK);
        assert_eq!(status_for(&e("validation_failed"), "x"), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(&e("unauthorized"), "x"), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&e("not_found"), "x"), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&e("in_use"), "x"), StatusCode::CONFLICT);
        assert_eq!(status_for(&e("db_query_failed"), "x"), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
