use crate::auth;
use crate::ipc::error::ApiError;
use crate::ipc::handlers::users::create_user;
use crate::ipc::helpers::{caller, respond, Fields, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::mail;
use crate::model::{self, user};
use serde_json::json;
use tracing::{info, warn};

fn handle_bootstrap_admin(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = state.conn()?;
    if user::count(conn)? > 0 {
        return Err(ApiError::Forbidden("setup has already been completed".into()));
    }
    let mut params = match &req.params {
        serde_json::Value::Object(m) => m.clone(),
        _ => serde_json::Map::new(),
    };
    params.insert("role".into(), json!("admin"));
    let admin = create_user(conn, &serde_json::Value::Object(params))?;
    info!(matricule = %admin.matricule, "first administrator created");
    Ok(json!({ "user": admin }))
}

/// Users sign in with their matricule; email plays no part in login.
fn handle_login(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = state.conn()?;
    let mut f = Fields::new(&req.params);
    let matricule = f.required_str("matricule");
    let password = match req.params.get("password").and_then(|v| v.as_str()) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => {
            f.reject("password", "password is required");
            String::new()
        }
    };
    f.finish()?;

    let bad_credentials = || ApiError::Unauthorized("these credentials do not match our records".into());
    let Some(u) = user::find_by_matricule(conn, &matricule)? else {
        warn!(matricule = %matricule, "login for unknown matricule");
        return Err(bad_credentials());
    };
    if !auth::verify_password(&password, &u.password_hash) {
        warn!(matricule = %matricule, "login with wrong password");
        return Err(bad_credentials());
    }

    let token = auth::issue_access_token(conn, &u.id, state.config.token_ttl_minutes)?;
    info!(user_id = %u.id, role = %u.role, "login");
    Ok(json!({ "token": token, "user": u }))
}

fn handle_logout(state: &mut AppState, req: &Request) -> HandlerResult {
    let u = caller(state, req)?;
    let token = req.token.as_deref().unwrap_or_default();
    if !auth::revoke_access_token(state.conn()?, token)? {
        return Err(ApiError::unauthenticated());
    }
    info!(user_id = %u.id, "logout");
    Ok(json!({ "loggedOut": true }))
}

fn handle_me(state: &mut AppState, req: &Request) -> HandlerResult {
    let u = caller(state, req)?;
    Ok(json!({ "user": u }))
}

fn handle_password_forgot(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = state.conn()?;
    let mut f = Fields::new(&req.params);
    let email = f.email("email");
    let matricule = f.optional_str("matricule");
    f.finish()?;

    let mut candidates = user::find_by_email(conn, &email)?;
    if let Some(m) = &matricule {
        candidates.retain(|u| &u.matricule == m);
    }
    let target = match candidates.len() {
        0 => None,
        1 => candidates.pop(),
        _ => {
            return Err(ApiError::field(
                "matricule",
                "several accounts use this email; give your matricule",
            ))
        }
    };

    if let Some(u) = target {
        let token = auth::issue_reset_token(conn, &u, state.config.reset_ttl_minutes)?;
        let link = auth::reset_link(&state.config.frontend_base_url, &token, &u.email);
        let body = format!(
            "Hello {},\n\nOpen the link below to choose a new password:\n{}\n\nThe link expires in {} minutes.\n",
            u.name, link, state.config.reset_ttl_minutes
        );
        mail::queue(conn, &u.email, "Reset your password", &body)?;
    } else {
        info!("password reset requested for unknown email");
    }
    Ok(json!({ "status": "if the account exists, a reset link has been sent" }))
}

fn handle_password_reset(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = state.conn()?;
    let mut f = Fields::new(&req.params);
    let token = f.required_str("token");
    let email = f.email("email");
    let password = f.password("password");
    let confirmation = req
        .params
        .get("passwordConfirmation")
        .and_then(|v| v.as_str());
    if let Some(p) = &password {
        if confirmation != Some(p.as_str()) {
            f.reject("password", "password confirmation does not match");
        }
    }
    f.finish()?;
    let Some(password) = password else {
        return Err(ApiError::field("password", "password is required"));
    };

    let mut u = auth::check_reset_token(conn, &token, &email)?;
    u.password_hash = auth::hash_password(&password);
    u.updated_at = model::now_rfc3339();

    let tx = conn.unchecked_transaction()?;
    user::update(&tx, &u)?;
    tx.execute("DELETE FROM password_reset_tokens WHERE user_id = ?", [&u.id])?;
    auth::revoke_all_access_tokens(&tx, &u.id)?;
    tx.commit()?;
    info!(user_id = %u.id, "password reset");
    Ok(json!({ "status": "your password has been reset" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "setup.bootstrapAdmin" => handle_bootstrap_admin(state, req),
        "auth.login" => handle_login(state, req),
        "auth.logout" => handle_logout(state, req),
        "auth.me" => handle_me(state, req),
        "password.forgot" => handle_password_forgot(state, req),
        "password.reset" => handle_password_reset(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
