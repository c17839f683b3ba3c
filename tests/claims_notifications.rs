mod test_support;

use serde_json::json;
use test_support::{exam_params, temp_dir, Sidecar};

#[test]
fn teachers_file_claims_and_admins_decide() {
    let workspace = temp_dir("examd-claims");
    let mut sc = Sidecar::open(&workspace);
    let admin = sc.bootstrap_admin();
    let admin_tok = Some(admin.as_str());
    let t1_id = sc.create_user(&admin, "T1", "Dr. Haddad", "haddad@example.edu", "teacher", "teacher-one");
    sc.create_user(&admin, "T2", "Dr. Mansouri", "mansouri@example.edu", "teacher", "teacher-two");
    let t1 = sc.login("T1", "teacher-one");
    let t2 = sc.login("T2", "teacher-two");

    let exam_id = sc.ok(
        "exams.create",
        exam_params("Réseaux", "2025-06-14", "13:00", "14:30"),
        admin_tok,
    )["exam"]["id"]
        .clone();

    let claim = sc.ok(
        "claims.create",
        json!({ "examId": exam_id, "message": "Room A101 is too small for my group" }),
        Some(&t1),
    )["claim"]
        .clone();
    assert_eq!(claim["status"], "pending");
    assert_eq!(claim["teacherId"], t1_id.as_str());
    assert_eq!(claim["teacherName"], "Dr. Haddad");
    assert_eq!(claim["examType"], "final");

    assert_eq!(
        sc.fails("claims.create", json!({ "examId": "nope", "message": "x" }), Some(&t1)),
        "validation_failed"
    );

    // Teachers only see their own claims.
    let mine = sc.ok("claims.list", json!({}), Some(&t1));
    assert_eq!(mine["claims"].as_array().expect("claims").len(), 1);
    let theirs = sc.ok("claims.list", json!({}), Some(&t2));
    assert!(theirs["claims"].as_array().expect("claims").is_empty());
    assert_eq!(sc.fails("claims.get", json!({ "id": claim["id"] }), Some(&t2)), "forbidden");
    assert_eq!(sc.fails("claims.delete", json!({ "id": claim["id"] }), Some(&t2)), "forbidden");

    assert_eq!(
        sc.fails("claims.update", json!({ "id": claim["id"], "status": "approved" }), Some(&t1)),
        "forbidden"
    );
    assert_eq!(
        sc.fails("claims.update", json!({ "id": claim["id"], "status": "maybe" }), admin_tok),
        "validation_failed"
    );
    let decided = sc.ok(
        "claims.update",
        json!({ "id": claim["id"], "status": "approved" }),
        admin_tok,
    );
    assert_eq!(decided["claim"]["status"], "approved");
    let listed = sc.ok("claims.list", json!({ "status": "approved" }), admin_tok);
    assert_eq!(listed["claims"][0]["id"], claim["id"]);

    // A claim keeps its exam alive.
    assert_eq!(sc.fails("exams.delete", json!({ "id": exam_id }), admin_tok), "in_use");
    sc.ok("claims.delete", json!({ "id": claim["id"] }), Some(&t1));
    sc.ok("exams.delete", json!({ "id": exam_id }), admin_tok);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn notifications_are_unread_until_marked() {
    let workspace = temp_dir("examd-notifications");
    let mut sc = Sidecar::open(&workspace);
    let admin = sc.bootstrap_admin();
    let admin_tok = Some(admin.as_str());
    sc.create_user(&admin, "T7", "Dr. Kaci", "kaci@example.edu", "teacher", "teacher-pass");
    sc.create_user(&admin, "T8", "Dr. Zerrouki", "zerrouki@example.edu", "teacher", "teacher-pass");
    let teacher = sc.login("T7", "teacher-pass");
    let other = sc.login("T8", "teacher-pass");

    let exam_id = sc.ok(
        "exams.create",
        exam_params("Bases de données", "2025-06-16", "09:00", "11:00"),
        admin_tok,
    )["exam"]["id"]
        .clone();

    let first = sc.ok(
        "notifications.create",
        json!({ "teacherMatricule": "T7", "examId": exam_id, "message": "You supervise room A101" }),
        admin_tok,
    )["notification"]
        .clone();
    assert_eq!(first["isRead"], false);
    assert_eq!(first["examType"], "final");
    sc.ok(
        "notifications.create",
        json!({ "teacherMatricule": "T7", "message": "Timetable published" }),
        admin_tok,
    );
    assert_eq!(
        sc.fails(
            "notifications.create",
            json!({ "teacherMatricule": "T404", "message": "lost" }),
            admin_tok,
        ),
        "validation_failed"
    );

    assert_eq!(sc.ok("notifications.unreadCount", json!({}), Some(&teacher))["unread"], 2);
    assert_eq!(sc.ok("notifications.unreadCount", json!({}), Some(&other))["unread"], 0);
    assert!(sc.ok("notifications.list", json!({}), Some(&other))["notifications"]
        .as_array()
        .expect("notifications")
        .is_empty());
    assert_eq!(
        sc.fails("notifications.markRead", json!({ "id": first["id"] }), Some(&other)),
        "forbidden"
    );

    let read = sc.ok("notifications.markRead", json!({ "id": first["id"] }), Some(&teacher));
    assert_eq!(read["notification"]["isRead"], true);
    let again = sc.ok("notifications.markRead", json!({ "id": first["id"] }), Some(&teacher));
    assert_eq!(again["notification"], read["notification"]);
    assert_eq!(sc.ok("notifications.unreadCount", json!({}), Some(&teacher))["unread"], 1);

    let unread = sc.ok("notifications.list", json!({ "isRead": "false" }), Some(&teacher));
    assert_eq!(unread["notifications"].as_array().expect("list").len(), 1);

    assert_eq!(sc.ok("notifications.markAllRead", json!({}), Some(&teacher))["updated"], 1);
    assert_eq!(sc.ok("notifications.unreadCount", json!({}), Some(&teacher))["unread"], 0);

    // Notifications reference their teacher by matricule.
    let t7 = sc.ok("users.list", json!({ "matricule": "T7" }), admin_tok)["users"][0]["id"].clone();
    assert_eq!(sc.fails("users.delete", json!({ "id": t7 }), admin_tok), "in_use");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn exams_mine_follows_the_callers_cohort() {
    let workspace = temp_dir("examd-exams-mine");
    let mut sc = Sidecar::open(&workspace);
    let admin = sc.bootstrap_admin();
    let admin_tok = Some(admin.as_str());

    let level = sc.ok("levels.create", json!({ "name": "L3" }), admin_tok)["level"]["id"].clone();
    let spec = sc.ok("specialties.create", json!({ "name": "Informatique" }), admin_tok)["specialty"]["id"].clone();
    let group = sc.ok(
        "groups.create",
        json!({ "name": "G1", "levelId": level, "specialtyId": spec }),
        admin_tok,
    )["group"]["id"]
        .clone();
    sc.ok(
        "users.create",
        json!({
            "matricule": "S10", "name": "Amel", "email": "amel@example.edu", "role": "student",
            "password": "student-pass", "specialite": "Informatique", "niveau": "L3", "groupId": group,
        }),
        admin_tok,
    );
    sc.create_user(&admin, "T10", "Dr. Haddad", "h@example.edu", "teacher", "teacher-pass");

    sc.ok("exams.create", exam_params("Compilation", "2025-06-12", "08:30", "10:00"), admin_tok);
    let mut other = exam_params("Analyse", "2025-06-13", "08:30", "10:00");
    other["group"] = json!("G2");
    other["teacher"] = json!("Dr. Mansouri");
    sc.ok("exams.create", other, admin_tok);

    let student = sc.login("S10", "student-pass");
    let mine = sc.ok("exams.mine", json!({}), Some(&student));
    let modules: Vec<&str> = mine["exams"]
        .as_array()
        .expect("exams")
        .iter()
        .filter_map(|e| e["module"].as_str())
        .collect();
    assert_eq!(modules, vec!["Compilation"]);

    let teacher = sc.login("T10", "teacher-pass");
    let mine = sc.ok("exams.mine", json!({}), Some(&teacher));
    assert_eq!(mine["exams"].as_array().expect("exams").len(), 1);

    let all = sc.ok("exams.mine", json!({}), admin_tok);
    assert_eq!(all["exams"].as_array().expect("exams").len(), 2);

    let filtered = sc.ok("exams.list", json!({ "date": "2025-06-13" }), Some(&student));
    assert_eq!(filtered["exams"][0]["module"], "Analyse");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn read_notifications_stay_read() {
    let workspace = temp_dir("examd-notifications-read-once");
    let mut sc = Sidecar::open(&workspace);
    let admin = sc.bootstrap_admin();
    let admin_tok = Some(admin.as_str());
    sc.create_user(&admin, "T5", "Dr. Saadi", "saadi@example.edu", "teacher", "teacher-pass");
    let teacher = sc.login("T5", "teacher-pass");

    let n = sc.ok(
        "notifications.create",
        json!({ "teacherMatricule": "T5", "message": "Surveillance moved to B204" }),
        admin_tok,
    )["notification"]
        .clone();
    sc.ok("notifications.markRead", json!({ "id": n["id"] }), Some(&teacher));

    let resp = sc.call(
        "notifications.update",
        json!({ "id": n["id"], "isRead": false }),
        admin_tok,
    );
    assert_eq!(resp["error"]["code"], "validation_failed");
    assert!(resp["error"]["details"]["fields"].get("isRead").is_some());
    let stored = sc.ok("notifications.get", json!({ "id": n["id"] }), admin_tok);
    assert_eq!(stored["notification"]["isRead"], true);
    assert_eq!(sc.ok("notifications.unreadCount", json!({}), Some(&teacher))["unread"], 0);

    // Other edits still go through, and repeating the read flag is harmless.
    let edited = sc.ok(
        "notifications.update",
        json!({ "id": n["id"], "message": "Surveillance moved to C12", "isRead": true }),
        admin_tok,
    );
    assert_eq!(edited["notification"]["message"], "Surveillance moved to C12");
    assert_eq!(edited["notification"]["isRead"], true);

    // An unread one can be marked read through an update.
    let other = sc.ok(
        "notifications.create",
        json!({ "teacherMatricule": "T5", "message": "Timetable published", "isRead": false }),
        admin_tok,
    )["notification"]
        .clone();
    let flipped = sc.ok("notifications.update", json!({ "id": other["id"], "isRead": "1" }), admin_tok);
    assert_eq!(flipped["notification"]["isRead"], true);

    assert_eq!(
        sc.fails("notifications.list", json!({ "isRead": "maybe" }), Some(&teacher)),
        "bad_params"
    );

    let _ = std::fs::remove_dir_all(workspace);
}
