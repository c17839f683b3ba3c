#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const FRONTEND: &str = "https://portal.example.edu";
pub const ADMIN_MATRICULE: &str = "ADM001";
pub const ADMIN_PASSWORD: &str = "admin-secret";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// `examd stdio` child process speaking JSON lines.
pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_examd");
        let mut child = Command::new(exe)
            .arg("stdio")
            .env("FRONTEND_BASE_URL", FRONTEND)
            .env("RUST_LOG", "off")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn examd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawns and selects `workspace`.
    pub fn open(workspace: &Path) -> Self {
        let mut sc = Self::spawn();
        sc.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
            None,
        );
        sc
    }

    pub fn send_raw(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn call(
        &mut self,
        method: &str,
        params: serde_json::Value,
        token: Option<&str>,
    ) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(t) = token {
            payload["token"] = json!(t);
        }
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(
        &mut self,
        method: &str,
        params: serde_json::Value,
        token: Option<&str>,
    ) -> serde_json::Value {
        let value = self.call(method, params, token);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value["result"].clone()
    }

    /// Error code of a call that must fail.
    pub fn fails(&mut self, method: &str, params: serde_json::Value, token: Option<&str>) -> String {
        let value = self.call(method, params, token);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value["error"]["code"]
            .as_str()
            .expect("error code")
            .to_string()
    }

    /// Creates the first administrator and returns its token.
    pub fn bootstrap_admin(&mut self) -> String {
        self.ok(
            "setup.bootstrapAdmin",
            json!({
                "matricule": ADMIN_MATRICULE,
                "name": "Registrar",
                "email": "registrar@example.edu",
                "password": ADMIN_PASSWORD,
            }),
            None,
        );
        self.login(ADMIN_MATRICULE, ADMIN_PASSWORD)
    }

    pub fn login(&mut self, matricule: &str, password: &str) -> String {
        let result = self.ok(
            "auth.login",
            json!({ "matricule": matricule, "password": password }),
            None,
        );
        result["token"].as_str().expect("token").to_string()
    }

    /// Creates a user as `admin` and returns its id.
    pub fn create_user(
        &mut self,
        admin: &str,
        matricule: &str,
        name: &str,
        email: &str,
        role: &str,
        password: &str,
    ) -> String {
        let result = self.ok(
            "users.create",
            json!({
                "matricule": matricule,
                "name": name,
                "email": email,
                "role": role,
                "password": password,
            }),
            Some(admin),
        );
        result["user"]["id"].as_str().expect("user id").to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn exam_params(module: &str, date: &str, start: &str, end: &str) -> serde_json::Value {
    json!({
        "type": "final",
        "module": module,
        "teacher": "Dr. Haddad",
        "room": "A101",
        "specialite": "Informatique",
        "niveau": "L3",
        "group": "G1",
        "semester": "S1",
        "date": date,
        "startTime": start,
        "endTime": end,
    })
}
