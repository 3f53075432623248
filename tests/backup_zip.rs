#[path = "../src/backup.rs"]
mod backup;

use rusqlite::Connection;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
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

fn write_sqlite(path: &Path, student: &str) {
    let conn = Connection::open(path).expect("open sqlite");
    conn.execute("CREATE TABLE student(id TEXT PRIMARY KEY)", [])
        .expect("create table");
    conn.execute("INSERT INTO student(id) VALUES(?)", [student])
        .expect("insert");
}

fn read_student(path: &Path) -> String {
    let conn = Connection::open(path).expect("open restored sqlite");
    conn.query_row("SELECT id FROM student", [], |r| r.get(0))
        .expect("restored row")
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("gradebook-backup-src");
    let workspace2 = temp_dir("gradebook-backup-dst");
    let out_dir = temp_dir("gradebook-backup-out");
    write_sqlite(&workspace.join(backup::DB_FILE_NAME), "hacker123");

    let bundle_path = out_dir.join("workspace.gradebook.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT);
    assert_eq!(export.entry_count, 3);
    assert_eq!(export.db_sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT));
    assert!(manifest.contains(&export.db_sha256));
    archive
        .by_name("db/gradebook.sqlite3")
        .expect("database entry in bundle");
    archive
        .by_name("meta/workspace.json")
        .expect("workspace metadata entry");

    write_sqlite(&workspace2.join(backup::DB_FILE_NAME), "someone-else");
    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT);
    assert_eq!(read_student(&workspace2.join(backup::DB_FILE_NAME)), "hacker123");

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn raw_sqlite_import_is_supported() {
    let out_dir = temp_dir("gradebook-backup-raw");
    let workspace = temp_dir("gradebook-backup-raw-dst");

    let raw_file = out_dir.join("copy.sqlite3");
    write_sqlite(&raw_file, "bitdiddle");

    let import = backup::import_workspace_bundle(&raw_file, &workspace).expect("import sqlite");
    assert_eq!(import.bundle_format_detected, backup::RAW_SQLITE_FORMAT);
    assert!(import.db_bytes > 0);
    assert_eq!(read_student(&workspace.join(backup::DB_FILE_NAME)), "bitdiddle");

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_files_are_rejected() {
    let out_dir = temp_dir("gradebook-backup-junk");
    let workspace = temp_dir("gradebook-backup-junk-dst");
    let junk = out_dir.join("notes.txt");
    File::create(&junk)
        .and_then(|mut f| f.write_all(b"not a database"))
        .expect("write junk");

    let res = backup::import_workspace_bundle(&junk, &workspace);
    assert!(res.is_err());
    assert!(!workspace.join(backup::DB_FILE_NAME).exists());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}
