use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use super::error::ApiError;
use crate::config::Config;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Bearer token of the caller, if any.
    #[serde(default)]
    pub token: Option<String>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            workspace: None,
            db: None,
            config,
        }
    }

    pub fn conn(&self) -> Result<&Connection, ApiError> {
        self.db.as_ref().ok_or(ApiError::NoWorkspace)
    }
}
