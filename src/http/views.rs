//! Server-rendered room administration pages under `/salles`.

use axum::{
    extract::{Path, State},
    http::{header::COOKIE, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::pages::{self, RoomFields};
use super::SharedState;
use crate::auth;
use crate::db;
use crate::ipc::error::ApiError;
use crate::ipc::handlers::rooms;
use crate::ipc::AppState;
use crate::model::{room, Role};

pub const SESSION_COOKIE: &str = "examd_token";

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/salles", get(index).post(store))
        .route("/salles/create", get(create_form))
        .route("/salles/:id/edit", get(edit_form))
        .route("/salles/:id", post(update_or_destroy))
}

#[derive(Debug, Default, Deserialize)]
pub struct RoomForm {
    #[serde(rename = "_token")]
    token: Option<String>,
    #[serde(rename = "_method")]
    method: Option<String>,
    name: Option<String>,
    capacity: Option<String>,
    location: Option<String>,
}

impl RoomForm {
    fn fields(&self) -> RoomFields {
        RoomFields {
            name: self.name.clone().unwrap_or_default(),
            capacity: self.capacity.clone().unwrap_or_default(),
            location: self.location.clone().unwrap_or_default(),
        }
    }

    fn params(&self) -> serde_json::Value {
        let mut params = serde_json::Map::new();
        for (key, value) in [
            ("name", &self.name),
            ("capacity", &self.capacity),
            ("location", &self.location),
        ] {
            if let Some(v) = value {
                params.insert(key.into(), json!(v));
            }
        }
        serde_json::Value::Object(params)
    }
}

/// Authenticated admin session behind a page request.
struct Session {
    csrf: String,
}

enum Reject {
    Unauthenticated,
    Forbidden,
    Csrf,
    Failure(String),
}

impl IntoResponse for Reject {
    fn into_response(self) -> Response {
        let (status, title, text) = match self {
            Reject::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Sign in required",
                "Sign in as an administrator to manage rooms.".to_string(),
            ),
            Reject::Forbidden => (
                StatusCode::FORBIDDEN,
                "Forbidden",
                "Only administrators can manage rooms.".to_string(),
            ),
            Reject::Csrf => (
                StatusCode::from_u16(419).unwrap_or(StatusCode::FORBIDDEN),
                "Page expired",
                "The form token is missing or stale. Reload the page and try again.".to_string(),
            ),
            Reject::Failure(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "Error", msg),
        };
        (status, Html(pages::message(title.to_string(), text))).into_response()
    }
}

impl From<ApiError> for Reject {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Unauthorized(_) => Reject::Unauthenticated,
            ApiError::Forbidden(_) => Reject::Forbidden,
            other => {
                warn!(error = %other, "room view failed");
                Reject::Failure(other.to_string())
            }
        }
    }
}

pub fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Form token bound to both the workspace key and the caller's session.
pub fn csrf_token(app_key: &str, session_token: &str) -> String {
    let digest = Sha256::new()
        .chain_update(app_key.as_bytes())
        .chain_update(b":csrf:")
        .chain_update(session_token.as_bytes())
        .finalize();
    format!("{digest:x}")
}

fn session(state: &AppState, token: Option<&str>) -> Result<Session, Reject> {
    let token = token.ok_or(Reject::Unauthenticated)?;
    let conn = state.conn()?;
    let user = auth::authenticate(conn, Some(token))?;
    if user.role != Role::Admin {
        return Err(Reject::Forbidden);
    }
    let key = db::app_key(conn).map_err(|e| Reject::Failure(e.to_string()))?;
    Ok(Session {
        csrf: csrf_token(&key, token),
    })
}

fn check_csrf(session: &Session, form: &RoomForm) -> Result<(), Reject> {
    match form.token.as_deref() {
        Some(t) if auth::constant_time_eq(t.as_bytes(), session.csrf.as_bytes()) => Ok(()),
        _ => Err(Reject::Csrf),
    }
}

/// Runs a page handler against the workspace on the blocking pool, after
/// resolving the cookie session.
async fn with_session<F>(state: &SharedState, headers: &HeaderMap, f: F) -> Result<Response, Reject>
where
    F: FnOnce(&mut AppState, Session) -> Result<Response, Reject> + Send + 'static,
{
    let token = cookie_token(headers);
    let mut guard = state.clone().lock_owned().await;
    tokio::task::spawn_blocking(move || {
        let s = session(&guard, token.as_deref())?;
        f(&mut guard, s)
    })
    .await
    .map_err(|e| Reject::Failure(format!("page task failed: {e}")))?
}

fn page(status: StatusCode, title: &str, text: String) -> Response {
    (status, Html(pages::message(title.to_string(), text))).into_response()
}

/// Re-renders the form on validation failure; other errors reject.
fn invalid_or_reject(
    e: ApiError,
    action: String,
    method: Option<&'static str>,
    form: &RoomForm,
    csrf: String,
) -> Response {
    match e {
        ApiError::Validation { fields, .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Html(pages::room_form(action, method, form.fields(), fields, csrf)),
        )
            .into_response(),
        ApiError::NotFound(_) => page(
            StatusCode::NOT_FOUND,
            "Introuvable",
            "Cette salle n'existe pas.".to_string(),
        ),
        ApiError::InUse(msg) => page(StatusCode::CONFLICT, "Salle utilisée", msg),
        ApiError::Conflict(msg) => page(StatusCode::CONFLICT, "Conflit", msg),
        other => Reject::from(other).into_response(),
    }
}

async fn index(State(state): State<SharedState>, headers: HeaderMap) -> Result<Response, Reject> {
    with_session(&state, &headers, |state, s| {
        let list = room::list(state.conn()?).map_err(ApiError::from)?;
        Ok(Html(pages::room_index(list, s.csrf)).into_response())
    })
    .await
}

async fn create_form(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, Reject> {
    with_session(&state, &headers, |_, s| {
        let html = pages::room_form(
            "/salles".into(),
            None,
            RoomFields::default(),
            Default::default(),
            s.csrf,
        );
        Ok(Html(html).into_response())
    })
    .await
}

async fn store(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Form(form): Form<RoomForm>,
) -> Result<Response, Reject> {
    with_session(&state, &headers, move |state, s| {
        check_csrf(&s, &form)?;
        match rooms::create_room(state.conn()?, &form.params()) {
            Ok(r) => {
                info!(room_id = %r.id, "room created from form");
                Ok(Redirect::to("/salles").into_response())
            }
            Err(e) => Ok(invalid_or_reject(e, "/salles".into(), None, &form, s.csrf)),
        }
    })
    .await
}

async fn edit_form(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, Reject> {
    with_session(&state, &headers, move |state, s| {
        let action = format!("/salles/{id}");
        match room::find(state.conn()?, &id).map_err(ApiError::from)? {
            Some(r) => {
                let html = pages::room_form(
                    action,
                    Some("PUT"),
                    RoomFields::from(&r),
                    Default::default(),
                    s.csrf,
                );
                Ok(Html(html).into_response())
            }
            None => Ok(invalid_or_reject(
                ApiError::NotFound("room"),
                action,
                Some("PUT"),
                &RoomForm::default(),
                s.csrf,
            )),
        }
    })
    .await
}

async fn update_or_destroy(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<RoomForm>,
) -> Result<Response, Reject> {
    with_session(&state, &headers, move |state, s| {
        check_csrf(&s, &form)?;
        let conn = state.conn()?;
        let method = form
            .method
            .as_deref()
            .map(|m| m.trim().to_ascii_uppercase())
            .unwrap_or_default();
        let result = match method.as_str() {
            "PUT" | "PATCH" => rooms::update_room(conn, &id, &form.params()).map(|_| "updated"),
            "DELETE" => rooms::delete_room(conn, &id).map(|_| "deleted"),
            _ => {
                return Ok(page(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "Unsupported method",
                    "Use _method=PUT or _method=DELETE.".to_string(),
                ))
            }
        };
        match result {
            Ok(what) => {
                info!(room_id = %id, "room {what} from form");
                Ok(Redirect::to("/salles").into_response())
            }
            Err(e) => Ok(invalid_or_reject(e, format!("/salles/{id}"), Some("PUT"), &form, s.csrf)),
        }
    })
    .await
}
