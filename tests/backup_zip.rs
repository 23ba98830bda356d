#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
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

fn read_entry(bundle: &PathBuf, name: &str) -> Vec<u8> {
    let f = File::open(bundle).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut out = Vec::new();
    archive
        .by_name(name)
        .expect("bundle entry")
        .read_to_end(&mut out)
        .expect("read entry");
    out
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("schoold-backup-src");
    let workspace2 = temp_dir("schoold-backup-dst");
    let out_dir = temp_dir("schoold-backup-out");

    let bytes = b"sqlite-test-payload";
    std::fs::write(workspace.join("school.sqlite3"), bytes).expect("write source db");
    // An older database in the destination gets replaced.
    std::fs::write(workspace2.join("school.sqlite3"), b"stale").expect("write stale db");

    let bundle_path = out_dir.join("nested").join("workspace.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 2);
    assert_eq!(export.db_sha256.len(), 64);

    let manifest: serde_json::Value =
        serde_json::from_slice(&read_entry(&bundle_path, "manifest.json")).expect("manifest json");
    assert_eq!(manifest["format"].as_str(), Some(backup::BUNDLE_FORMAT_V1));
    assert_eq!(manifest["dbSha256"].as_str(), Some(export.db_sha256.as_str()));
    assert!(manifest["exportedAt"].as_str().is_some());
    assert_eq!(read_entry(&bundle_path, "db/school.sqlite3"), bytes);

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(import.db_sha256, export.db_sha256);

    let restored = std::fs::read(workspace2.join("school.sqlite3")).expect("read restored db");
    assert_eq!(restored, bytes);
    assert!(!workspace2.join("school.sqlite3.importing").exists());

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn tampered_bundles_leave_the_workspace_untouched() {
    let out_dir = temp_dir("schoold-backup-tamper");
    let workspace = temp_dir("schoold-backup-tamper-dst");
    std::fs::write(workspace.join("school.sqlite3"), b"current").expect("write current db");

    let bundle_path = out_dir.join("tampered.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        let opts = zip::write::FileOptions::default();
        zip.start_file("manifest.json", opts).expect("manifest entry");
        zip.write_all(
            br#"{"format":"schoold-workspace-v1","dbSha256":"0000000000000000000000000000000000000000000000000000000000000000"}"#,
        )
        .expect("write manifest");
        zip.start_file("db/school.sqlite3", opts).expect("db entry");
        zip.write_all(b"swapped").expect("write db");
        zip.finish().expect("finish zip");
    }

    let err = backup::import_workspace_bundle(&bundle_path, &workspace)
        .expect_err("checksum mismatch must fail");
    assert!(err.to_string().contains("checksum"), "unexpected error: {}", err);
    assert_eq!(
        std::fs::read(workspace.join("school.sqlite3")).expect("read db"),
        b"current"
    );

    let not_zip = out_dir.join("plain.sqlite3");
    std::fs::write(&not_zip, b"not a zip").expect("write plain file");
    assert!(backup::import_workspace_bundle(&not_zip, &workspace).is_err());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}
