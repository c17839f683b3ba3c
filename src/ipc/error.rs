use std::collections::BTreeMap;

use rusqlite::ffi;
use serde_json::json;
use thiserror::Error;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        fields: BTreeMap<String, String>,
    },
    #[error("{0}")]
    BadParams(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InUse(String),
    #[error("{0}")]
    Conflict(String),
    #[error("select a workspace first")]
    NoWorkspace,
    #[error("{0}")]
    Db(rusqlite::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), message.into());
        ApiError::Validation {
            message: "the given data was invalid".into(),
            fields,
        }
    }

    pub fn unauthenticated() -> Self {
        ApiError::Unauthorized("unauthenticated".into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "validation_failed",
            ApiError::BadParams(_) => "bad_params",
            ApiError::NotFound(_) => "not_found",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::InUse(_) => "in_use",
            ApiError::Conflict(_) => "conflict",
            ApiError::NoWorkspace => "no_workspace",
            ApiError::Db(_) => "db_query_failed",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        let details = match &self {
            ApiError::Validation { fields, .. } => Some(json!({ "fields": fields })),
            _ => None,
        };
        err(id, self.code(), self.to_string(), details)
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref f, ref msg) = e {
            let msg = msg.clone().unwrap_or_default();
            match f.extended_code {
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return ApiError::InUse(format!("record is still referenced ({msg})"));
                }
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return ApiError::Conflict(format!("duplicate value ({msg})"));
                }
                _ => {}
            }
        }
        ApiError::Db(e)
    }
}
