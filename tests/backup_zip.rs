mod test_support;

use examd::backup;
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use test_support::{temp_dir, Sidecar};

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("examd-backup-src");
    let workspace2 = temp_dir("examd-backup-dst");
    let out_dir = temp_dir("examd-backup-out");

    let bytes = b"sqlite-test-payload";
    std::fs::write(examd::db::db_path(&workspace), bytes).expect("write source db");

    let bundle_path = out_dir.join("workspace.examd.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.db_bytes, bytes.len() as u64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    let manifest: serde_json::Value = serde_json::from_str(&manifest).expect("manifest json");
    assert_eq!(manifest["format"], backup::BUNDLE_FORMAT_V1);
    assert_eq!(manifest["dbSha256"], export.db_sha256.as_str());
    archive
        .by_name("db/examd.sqlite3")
        .expect("database entry in bundle");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);

    let restored = std::fs::read(examd::db::db_path(&workspace2)).expect("read restored db");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn legacy_sqlite_import_is_supported() {
    let out_dir = temp_dir("examd-backup-legacy");
    let workspace = temp_dir("examd-backup-legacy-dst");

    let legacy_file = out_dir.join("legacy.sqlite3");
    let bytes = b"legacy-sqlite-copy";
    std::fs::write(&legacy_file, bytes).expect("write legacy sqlite file");

    let import =
        backup::import_workspace_bundle(&legacy_file, &workspace).expect("import legacy sqlite");
    assert_eq!(import.bundle_format_detected, backup::LEGACY_SQLITE);

    let restored = std::fs::read(examd::db::db_path(&workspace)).expect("read restored sqlite");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn tampered_bundle_is_rejected_and_workspace_kept() {
    let out_dir = temp_dir("examd-backup-tamper");
    let workspace = temp_dir("examd-backup-tamper-dst");
    std::fs::write(examd::db::db_path(&workspace), b"current").expect("write current db");

    let bundle_path = out_dir.join("tampered.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        let opts = zip::write::FileOptions::default();
        zip.start_file("manifest.json", opts).expect("manifest entry");
        zip.write_all(
            json!({ "format": backup::BUNDLE_FORMAT_V1, "dbSha256": "00" })
                .to_string()
                .as_bytes(),
        )
        .expect("write manifest");
        zip.start_file("db/examd.sqlite3", opts).expect("db entry");
        zip.write_all(b"other").expect("write db");
        zip.finish().expect("finish zip");
    }

    let e = backup::import_workspace_bundle(&bundle_path, &workspace).expect_err("checksum mismatch");
    assert!(e.to_string().contains("checksum"));
    let kept = std::fs::read(examd::db::db_path(&workspace)).expect("read current db");
    assert_eq!(kept, b"current");

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn backup_methods_restore_an_earlier_state() {
    let workspace = temp_dir("examd-backup-ipc");
    let bundle = workspace.join("exports").join("snapshot.zip");
    let mut sc = Sidecar::open(&workspace);
    let admin = sc.bootstrap_admin();
    let tok = Some(admin.as_str());

    sc.ok("rooms.create", json!({ "name": "A101", "capacity": 40 }), tok);
    let exported = sc.ok(
        "backup.export",
        json!({ "outPath": bundle.to_string_lossy() }),
        tok,
    );
    assert_eq!(exported["bundleFormat"], backup::BUNDLE_FORMAT_V1);
    assert!(bundle.is_file());

    sc.ok("rooms.create", json!({ "name": "B204", "capacity": 25 }), tok);
    assert_eq!(sc.ok("rooms.list", json!({}), tok)["rooms"].as_array().expect("rooms").len(), 2);

    let imported = sc.ok(
        "backup.import",
        json!({ "inPath": bundle.to_string_lossy() }),
        tok,
    );
    assert_eq!(imported["bundleFormatDetected"], backup::BUNDLE_FORMAT_V1);
    let rooms = sc.ok("rooms.list", json!({}), tok);
    let names: Vec<&str> = rooms["rooms"]
        .as_array()
        .expect("rooms")
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    assert_eq!(names, vec!["A101"]);

    assert_eq!(sc.fails("backup.export", json!({}), tok), "bad_params");

    let _ = std::fs::remove_dir_all(workspace);
}
