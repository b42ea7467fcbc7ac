use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};

fn lectern(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("lectern").expect("lectern binary");
    cmd.env("LECTERN_OBJECT_BACKEND", "local")
        .env_remove("RUST_LOG")
        .current_dir(data_dir);
    cmd
}

fn write_authoring(dir: &Path) -> std::path::PathBuf {
    fs::write(dir.join("welcome.pdf"), b"%PDF-1.4 welcome").unwrap();
    let input = dir.join("degree.json");
    let spec = json!({
        "name": "Theology I",
        "description": "First year",
        "courses": [{
            "title": "Intro",
            "description": "Start here",
            "price": 0,
            "chapters": [{
                "title": "Basics",
                "lessons": [{
                    "title": "Welcome",
                    "file": { "path": "welcome.pdf", "contentType": "application/pdf" }
                }]
            }]
        }]
    });
    fs::write(&input, serde_json::to_vec_pretty(&spec).unwrap()).unwrap();
    input
}

#[test]
fn create_list_show_delete_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_authoring(dir.path());
    let data_dir = dir.path().join("data");

    let output = lectern(dir.path())
        .args(["catalog", "create", "--input"])
        .arg(&input)
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let degree: Value = serde_json::from_slice(&output).unwrap();
    let degree_id = degree["id"].as_str().unwrap().to_string();
    let lesson = &degree["courses"][0]["chapters"][0]["lessons"][0];
    assert_eq!(lesson["file"]["kind"], "document");
    assert_eq!(lesson["file"]["fileName"], "welcome.pdf");
    assert_eq!(degree["overviewPoints"], json!([]));

    let url = lesson["file"]["url"].as_str().unwrap();
    let object = url.strip_prefix("/objects/").unwrap();
    let stored = fs::read(data_dir.join("objects").join(object)).unwrap();
    assert_eq!(stored, b"%PDF-1.4 welcome");

    lectern(dir.path())
        .args(["catalog", "list", "--data-dir"])
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains(&degree_id));

    lectern(dir.path())
        .args(["catalog", "show", "--degree", &degree_id, "--data-dir"])
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Theology I"));

    lectern(dir.path())
        .args(["catalog", "delete", "--degree", &degree_id, "--data-dir"])
        .arg(&data_dir)
        .assert()
        .success();

    lectern(dir.path())
        .args(["catalog", "show", "--degree", &degree_id, "--data-dir"])
        .arg(&data_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("degree not found"));
}

#[test]
fn passthrough_mode_keeps_missing_overview_points_null() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_authoring(dir.path());

    let output = lectern(dir.path())
        .args(["catalog", "create", "--overview-points", "passthrough", "--input"])
        .arg(&input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let degree: Value = serde_json::from_slice(&output).unwrap();
    assert!(degree["overviewPoints"].is_null());
    assert!(degree["courses"][0]["overviewPoints"].is_null());
}

#[test]
fn add_lesson_to_unknown_chapter_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_authoring(dir.path());

    let output = lectern(dir.path())
        .args(["catalog", "create", "--input"])
        .arg(&input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let degree: Value = serde_json::from_slice(&output).unwrap();
    let degree_id = degree["id"].as_str().unwrap();
    let course_id = degree["courses"][0]["id"].as_str().unwrap();

    let lesson = dir.path().join("lesson.json");
    fs::write(
        &lesson,
        json!({
            "title": "Extra",
            "file": { "path": "welcome.pdf", "contentType": "application/pdf" }
        })
        .to_string(),
    )
    .unwrap();

    lectern(dir.path())
        .args([
            "catalog",
            "add-lesson",
            "--degree",
            degree_id,
            "--course",
            course_id,
            "--chapter",
            "missing",
            "--input",
        ])
        .arg(&lesson)
        .assert()
        .failure()
        .stderr(predicate::str::contains("chapter not found: missing"));
}

#[test]
fn rust_log_debug_emits_parsed_cli() {
    let dir = tempfile::tempdir().unwrap();
    lectern(dir.path())
        .env("RUST_LOG", "debug")
        .args(["catalog", "list"])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
}
