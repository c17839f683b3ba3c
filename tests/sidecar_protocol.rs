mod test_support;

use serde_json::json;
use test_support::{temp_dir, Sidecar};

#[test]
fn malformed_and_unknown_requests_get_error_envelopes() {
    let mut sc = Sidecar::spawn();

    let resp = sc.send_raw("{not json");
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "bad_json");

    let resp = sc.send_raw(r#"{"id":"x1","params":{}}"#);
    assert_eq!(resp["id"], "x1");
    assert_eq!(resp["error"]["code"], "bad_json");

    let resp = sc.call("grades.compute", json!({}), None);
    assert_eq!(resp["error"]["code"], "not_implemented");

    // The process keeps serving after bad input.
    let health = sc.ok("health", json!({}), None);
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(health["workspacePath"], serde_json::Value::Null);
}

#[test]
fn methods_need_a_workspace() {
    let workspace = temp_dir("examd-protocol-workspace");
    let mut sc = Sidecar::spawn();

    assert_eq!(sc.fails("rooms.list", json!({}), None), "no_workspace");
    assert_eq!(sc.fails("workspace.select", json!({}), None), "bad_params");

    sc.ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );
    assert!(workspace.join("examd.sqlite3").is_file());
    assert_eq!(sc.fails("rooms.list", json!({}), None), "unauthorized");
    let health = sc.ok("health", json!({}), None);
    assert_eq!(health["workspacePath"], workspace.to_string_lossy().as_ref());

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn workspace_survives_a_restart() {
    let workspace = temp_dir("examd-protocol-restart");
    let token = {
        let mut sc = Sidecar::open(&workspace);
        let admin = sc.bootstrap_admin();
        sc.ok("modules.create", json!({ "name": "Compilation" }), Some(&admin));
        admin
    };

    let mut sc = Sidecar::open(&workspace);
    let modules = sc.ok("modules.list", json!({}), Some(&token));
    assert_eq!(modules["modules"][0]["name"], "Compilation");

    let _ = std::fs::remove_dir_all(workspace);
}
