use crate::backup;
use crate::db;
use crate::ipc::error::ApiError;
use crate::ipc::helpers::{admin, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::mail;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn path_param(req: &Request, key: &str) -> Result<PathBuf, ApiError> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| ApiError::BadParams(format!("missing {key}")))
}

fn handle_mail_outbox(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let mails = mail::outbox(state.conn()?)?;
    Ok(json!({ "mails": mails }))
}

fn handle_backup_export(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let out_path = path_param(req, "outPath")?;
    let workspace = state.workspace.clone().ok_or(ApiError::NoWorkspace)?;
    let summary = backup::export_workspace_bundle(&workspace, &out_path)?;
    info!(out = %out_path.display(), bytes = summary.db_bytes, "workspace exported");
    Ok(json!({
        "outPath": out_path.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "dbSha256": summary.db_sha256,
    }))
}

fn handle_backup_import(state: &mut AppState, req: &Request) -> HandlerResult {
    admin(state, req)?;
    let in_path = path_param(req, "inPath")?;
    let workspace = state.workspace.clone().ok_or(ApiError::NoWorkspace)?;

    // Close the connection before the file is swapped underneath it.
    state.db = None;
    let imported = backup::import_workspace_bundle(&in_path, &workspace);
    let reopened = db::open_db(&workspace);
    match reopened {
        Ok(conn) => state.db = Some(conn),
        Err(e) => {
            warn!(error = %e, "workspace could not be reopened after import");
            return Err(e.into());
        }
    }
    let summary = imported?;
    info!(source = %in_path.display(), format = %summary.bundle_format_detected, "workspace imported");
    Ok(json!({ "bundleFormatDetected": summary.bundle_format_detected }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "mail.outbox" => handle_mail_outbox(state, req),
        "backup.export" => handle_backup_export(state, req),
        "backup.import" => handle_backup_import(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
