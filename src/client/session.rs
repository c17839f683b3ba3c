use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::User;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// Local persistence for the signed-in session.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Option<Session>>;
    fn save(&self, session: &Session) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// Session kept in a JSON file, e.g. under the user's config directory.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> anyhow::Result<Option<Session>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.to_string_lossy()))?;
        match serde_json::from_str(&text) {
            Ok(s) => Ok(Some(s)),
            Err(e) => {
                // A corrupt file means signed out.
                debug!(error = %e, "discarding unreadable session file");
                Ok(None)
            }
        }
    }

    fn save(&self, session: &Session) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create directory {}", parent.to_string_lossy())
                })?;
            }
        }
        let text = serde_json::to_string_pretty(session).context("failed to serialize session")?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.to_string_lossy()))
    }

    fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("failed to remove {}", self.path.to_string_lossy())),
        }
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> anyhow::Result<Option<Session>> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, session: &Session) -> anyhow::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
        *guard = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}
