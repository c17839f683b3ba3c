use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use examd::client::{ApiClient, FileSessionStore, SessionStore};
use examd::config::Config;
use examd::ipc::{self, error::err, AppState, Request};
use examd::{db, http};

#[derive(Parser)]
#[command(name = "examd", version, about = "Exam scheduling and administration service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the room pages.
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
    /// Answer JSON-lines requests on stdin.
    Stdio {
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
    /// Sign in against a running server and keep the session locally.
    Login {
        #[arg(long, default_value = "http://localhost:8000")]
        base_url: String,
        #[arg(long)]
        session_file: Option<PathBuf>,
        matricule: String,
        /// Read from EXAMD_PASSWORD when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    Logout {
        #[arg(long, default_value = "http://localhost:8000")]
        base_url: String,
        #[arg(long)]
        session_file: Option<PathBuf>,
    },
    Whoami {
        #[arg(long, default_value = "http://localhost:8000")]
        base_url: String,
        #[arg(long)]
        session_file: Option<PathBuf>,
    },
}

fn init_tracing() {
    // stdout belongs to the sidecar protocol; logs always go to stderr.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "examd=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn session_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".examd")
            .join("session.json")
    })
}

fn client(base_url: String, session_file: Option<PathBuf>) -> ApiClient {
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(session_path(session_file)));
    ApiClient::new(base_url, store)
}

fn run_stdio(config: Config, workspace: Option<PathBuf>) -> anyhow::Result<()> {
    let mut state = AppState::new(config);
    if let Some(path) = workspace {
        let conn = db::open_db(&path)?;
        info!(workspace = %path.display(), "workspace opened");
        state.workspace = Some(path);
        state.db = Some(conn);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                let id = serde_json::from_str::<serde_json::Value>(&line)
                    .ok()
                    .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
                    .unwrap_or_default();
                err(&id, "bad_json", e.to_string(), None)
            }
        };
        writeln!(stdout, "{resp}").context("failed to write response")?;
        stdout.flush().context("failed to flush stdout")?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, workspace } => {
            let mut config = Config::load()?;
            if let Some(b) = bind {
                config.bind = b;
            }
            if let Some(w) = workspace {
                config.workspace = w;
            }
            http::serve(config).await
        }
        Command::Stdio { workspace } => {
            let config = Config::load()?;
            tokio::task::spawn_blocking(move || run_stdio(config, workspace))
                .await
                .context("stdio loop panicked")?
        }
        Command::Login {
            base_url,
            session_file,
            matricule,
            password,
        } => {
            let password = match password {
                Some(p) => p,
                None => std::env::var("EXAMD_PASSWORD")
                    .context("pass --password or set EXAMD_PASSWORD")?,
            };
            let api = client(base_url, session_file);
            let landing = api.login(&matricule, &password).await?;
            println!("signed in, continue at {landing}");
            Ok(())
        }
        Command::Logout {
            base_url,
            session_file,
        } => {
            let landing = client(base_url, session_file).logout().await;
            println!("signed out, continue at {landing}");
            Ok(())
        }
        Command::Whoami {
            base_url,
            session_file,
        } => {
            let api = client(base_url, session_file);
            if api.session()?.is_none() {
                println!("not signed in");
                return Ok(());
            }
            let me = api.me().await?;
            println!("{} ({}) {} <{}>", me.name, me.role, me.matricule, me.email);
            Ok(())
        }
    }
}
