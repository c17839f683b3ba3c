use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::routes::{dashboard_for, Route};
use super::session::{Session, SessionStore};
use crate::model::User;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message} ({code}, HTTP {status})")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
        details: Option<Value>,
    },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ClientError {
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Thin client for the `/api` surface. Requests carry the stored session's
/// bearer token when one exists.
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    store: Arc<dyn SessionStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
            store,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> anyhow::Result<Option<Session>> {
        self.store.load()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Sends one request and unwraps the response envelope.
    pub async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ClientError> {
        let mut req = self.http.request(method.clone(), self.url(path));
        if let Some(session) = self.store.load()? {
            req = req.bearer_auth(&session.token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        debug!(%method, path, "api request");
        let resp = req.send().await?;
        let status = resp.status();
        let envelope: Value = resp.json().await?;

        if envelope.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(envelope.get("result").cloned().unwrap_or(Value::Null));
        }
        let error = envelope
            .get("error")
            .ok_or_else(|| ClientError::Decode(format!("HTTP {status} without an error body")))?;
        Err(ClientError::Api {
            status,
            code: error
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            details: error.get("details").cloned(),
        })
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.call(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.call(Method::POST, path, Some(body)).await
    }

    /// Signs in by matricule, stores the session and returns the landing page.
    pub async fn login(&self, matricule: &str, password: &str) -> Result<Route, ClientError> {
        let result = self
            .post("login", json!({ "matricule": matricule, "password": password }))
            .await?;
        let token = result
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Decode("login response without token".into()))?
            .to_string();
        let user: User = serde_json::from_value(result.get("user").cloned().unwrap_or(Value::Null))
            .map_err(|e| ClientError::Decode(format!("login response user: {e}")))?;
        let landing = dashboard_for(user.role);
        self.store.save(&Session { token, user })?;
        Ok(landing)
    }

    /// Revokes the token server-side when possible. Local state is cleared
    /// whatever the outcome of that call.
    pub async fn logout(&self) -> Route {
        match self.call(Method::POST, "logout", None).await {
            Ok(_) => debug!("session revoked"),
            Err(e) => warn!(error = %e, "logout request failed, clearing local session anyway"),
        }
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear local session");
        }
        Route::Login
    }

    pub async fn me(&self) -> Result<User, ClientError> {
        let result = self.get("user").await?;
        serde_json::from_value(result.get("user").cloned().unwrap_or(Value::Null))
            .map_err(|e| ClientError::Decode(format!("user: {e}")))
    }
}
