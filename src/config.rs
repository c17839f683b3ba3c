use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub workspace: PathBuf,
    /// Host the browser client is served from; reset links point here.
    pub frontend_base_url: String,
    /// Access token lifetime in minutes. Zero means tokens never expire.
    pub token_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let frontend_base_url: String = try_load("FRONTEND_BASE_URL", "http://localhost:5173")?;
        Ok(Self {
            bind: try_load("EXAMD_BIND", "0.0.0.0:8000")?,
            workspace: PathBuf::from(try_load::<String>("EXAMD_WORKSPACE", "./data")?),
            frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
            token_ttl_minutes: try_load("EXAMD_TOKEN_TTL_MINUTES", "0")?,
            reset_ttl_minutes: try_load("EXAMD_RESET_TTL_MINUTES", "60")?,
            cors_origin: env::var("EXAMD_CORS_ORIGIN").ok().filter(|s| !s.trim().is_empty()),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            workspace: PathBuf::from("./data"),
            frontend_base_url: "http://localhost:5173".to_string(),
            token_ttl_minutes: 0,
            reset_ttl_minutes: 60,
            cors_origin: None,
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => {
            info!("{key} not set, using default: {default}");
            default.to_string()
        }
    };
    raw.trim().parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        anyhow::anyhow!("environment misconfigured: {key}={raw}: {e}")
    })
}
