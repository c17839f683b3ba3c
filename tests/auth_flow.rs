mod test_support;

use serde_json::json;
use test_support::{temp_dir, Sidecar, ADMIN_MATRICULE, FRONTEND};

fn reset_token_from_outbox(sc: &mut Sidecar, admin: &str, recipient: &str) -> String {
    let outbox = sc.ok("mail.outbox", json!({}), Some(admin));
    let mail = outbox["mails"]
        .as_array()
        .expect("mails")
        .iter()
        .find(|m| m["recipient"] == recipient)
        .cloned()
        .expect("reset mail queued");
    let body = mail["body"].as_str().expect("body");
    let prefix = format!("{FRONTEND}/reset-password?token=");
    let start = body.find(&prefix).expect("reset link in body") + prefix.len();
    let rest = &body[start..];
    let end = rest.find("&email=").expect("email parameter");
    let email_part: String = rest[end + "&email=".len()..]
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect();
    assert_eq!(email_part, recipient);
    rest[..end].to_string()
}

#[test]
fn bootstrap_only_works_on_an_empty_directory() {
    let workspace = temp_dir("examd-auth-bootstrap");
    let mut sc = Sidecar::open(&workspace);
    let admin = sc.bootstrap_admin();

    let me = sc.ok("auth.me", json!({}), Some(&admin));
    assert_eq!(me["user"]["matricule"], ADMIN_MATRICULE);
    assert_eq!(me["user"]["role"], "admin");

    let again = sc.fails(
        "setup.bootstrapAdmin",
        json!({ "matricule": "X1", "name": "X", "email": "x@example.edu", "password": "password1" }),
        None,
    );
    assert_eq!(again, "forbidden");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn login_resolves_by_matricule_when_emails_are_shared() {
    let workspace = temp_dir("examd-auth-shared-email");
    let mut sc = Sidecar::open(&workspace);
    let admin = sc.bootstrap_admin();

    let first = sc.create_user(&admin, "T100", "Karim Saidi", "dept@example.edu", "teacher", "first-pass");
    let second = sc.create_user(&admin, "T200", "Nadia Saidi", "dept@example.edu", "teacher", "second-pass");

    let t1 = sc.login("T100", "first-pass");
    let t2 = sc.login("T200", "second-pass");
    assert_eq!(sc.ok("auth.me", json!({}), Some(&t1))["user"]["id"], first.as_str());
    assert_eq!(sc.ok("auth.me", json!({}), Some(&t2))["user"]["id"], second.as_str());

    // Each password only opens its own matricule.
    assert_eq!(
        sc.fails("auth.login", json!({ "matricule": "T100", "password": "second-pass" }), None),
        "unauthorized"
    );
    assert_eq!(
        sc.fails("auth.login", json!({ "matricule": "T999", "password": "first-pass" }), None),
        "unauthorized"
    );
    assert_eq!(
        sc.fails("auth.login", json!({ "email": "dept@example.edu", "password": "first-pass" }), None),
        "validation_failed"
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn logout_revokes_only_the_presented_token() {
    let workspace = temp_dir("examd-auth-logout");
    let mut sc = Sidecar::open(&workspace);
    let admin = sc.bootstrap_admin();
    sc.create_user(&admin, "S1", "Student One", "s1@example.edu", "student", "student-pass");

    let a = sc.login("S1", "student-pass");
    let b = sc.login("S1", "student-pass");
    sc.ok("auth.logout", json!({}), Some(&a));
    assert_eq!(sc.fails("auth.me", json!({}), Some(&a)), "unauthorized");
    assert_eq!(sc.fails("auth.logout", json!({}), Some(&a)), "unauthorized");
    assert_eq!(sc.ok("auth.me", json!({}), Some(&b))["user"]["matricule"], "S1");
    assert_eq!(sc.fails("auth.me", json!({}), Some("not-a-token")), "unauthorized");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn roles_gate_administrative_methods() {
    let workspace = temp_dir("examd-auth-roles");
    let mut sc = Sidecar::open(&workspace);
    let admin = sc.bootstrap_admin();
    let admin_id = sc.ok("auth.me", json!({}), Some(&admin))["user"]["id"].clone();
    let student_id = sc.create_user(&admin, "S2", "Student Two", "s2@example.edu", "student", "student-pass");
    let student = sc.login("S2", "student-pass");

    assert!(sc.ok("rooms.list", json!({}), Some(&student))["rooms"].is_array());
    assert_eq!(
        sc.fails("rooms.create", json!({ "name": "B2", "capacity": 20 }), Some(&student)),
        "forbidden"
    );
    assert_eq!(sc.fails("users.list", json!({}), Some(&student)), "forbidden");
    assert_eq!(sc.fails("claims.list", json!({}), Some(&student)), "forbidden");
    assert_eq!(
        sc.ok("users.get", json!({ "id": student_id }), Some(&student))["user"]["matricule"],
        "S2"
    );
    assert_eq!(
        sc.fails("users.get", json!({ "id": admin_id }), Some(&student)),
        "forbidden"
    );
    assert_eq!(
        sc.fails("users.delete", json!({ "id": admin_id }), Some(&admin)),
        "forbidden"
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn password_reset_through_the_mailed_link() {
    let workspace = temp_dir("examd-auth-reset");
    let mut sc = Sidecar::open(&workspace);
    let admin = sc.bootstrap_admin();
    sc.create_user(&admin, "T300", "Yacine Amrani", "yacine@example.edu", "teacher", "old-password");
    let session = sc.login("T300", "old-password");

    let unknown = sc.ok("password.forgot", json!({ "email": "nobody@example.edu" }), None);
    assert!(unknown["status"].is_string());

    sc.ok("password.forgot", json!({ "email": "yacine@example.edu" }), None);
    let token = reset_token_from_outbox(&mut sc, &admin, "yacine@example.edu");

    assert_eq!(
        sc.fails(
            "password.reset",
            json!({
                "token": token,
                "email": "someone-else@example.edu",
                "password": "new-password",
                "passwordConfirmation": "new-password",
            }),
            None,
        ),
        "validation_failed"
    );
    assert_eq!(
        sc.fails(
            "password.reset",
            json!({
                "token": token,
                "email": "yacine@example.edu",
                "password": "new-password",
                "passwordConfirmation": "typo-password",
            }),
            None,
        ),
        "validation_failed"
    );

    sc.ok(
        "password.reset",
        json!({
            "token": token,
            "email": "yacine@example.edu",
            "password": "new-password",
            "passwordConfirmation": "new-password",
        }),
        None,
    );

    assert_eq!(sc.fails("auth.me", json!({}), Some(&session)), "unauthorized");
    assert_eq!(
        sc.fails("auth.login", json!({ "matricule": "T300", "password": "old-password" }), None),
        "unauthorized"
    );
    sc.login("T300", "new-password");

    // The token is spent.
    assert_eq!(
        sc.fails(
            "password.reset",
            json!({
                "token": token,
                "email": "yacine@example.edu",
                "password": "third-password",
                "passwordConfirmation": "third-password",
            }),
            None,
        ),
        "validation_failed"
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn forgot_password_with_a_shared_email_needs_the_matricule() {
    let workspace = temp_dir("examd-auth-reset-shared");
    let mut sc = Sidecar::open(&workspace);
    let admin = sc.bootstrap_admin();
    sc.create_user(&admin, "T400", "A", "shared@example.edu", "teacher", "password-a");
    sc.create_user(&admin, "T401", "B", "shared@example.edu", "teacher", "password-b");

    let resp = sc.call("password.forgot", json!({ "email": "shared@example.edu" }), None);
    assert_eq!(resp["error"]["code"], "validation_failed");
    assert!(resp["error"]["details"]["fields"].get("matricule").is_some());

    sc.ok(
        "password.forgot",
        json!({ "email": "shared@example.edu", "matricule": "T401" }),
        None,
    );
    let token = reset_token_from_outbox(&mut sc, &admin, "shared@example.edu");
    sc.ok(
        "password.reset",
        json!({
            "token": token,
            "email": "shared@example.edu",
            "password": "password-b2",
            "passwordConfirmation": "password-b2",
        }),
        None,
    );
    sc.login("T401", "password-b2");
    sc.login("T400", "password-a");

    let _ = std::fs::remove_dir_all(workspace);
}
