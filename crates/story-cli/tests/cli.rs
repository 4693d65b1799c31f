use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

fn story() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("story"));
    cmd.env_remove("STORY_SERVER_URL").env_remove("STORY_DIR");
    cmd
}

fn write_payload(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("payload.json");
    let payload = json!({
        "image_name": "tonsil.ome.tif",
        "channels": ["DNA", "CD3", "CD20"],
        "max_range": 1000,
        "author_name": "Ada"
    });
    fs::write(&path, serde_json::to_vec(&payload).unwrap()).unwrap();
    path
}

#[test]
fn help_lists_commands() {
    let output = story().arg("--help").output().expect("run help");
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    for needle in ["build", "import", "run", "browse", "--server", "--json"] {
        assert!(text.contains(needle), "help output should contain '{needle}'");
    }
}

#[test]
fn build_emits_story_definition() {
    let tmp = TempDir::new().expect("tmpdir");
    let payload = write_payload(tmp.path());

    let assert = story()
        .args(["--json", "--dir"])
        .arg(tmp.path())
        .arg("build")
        .arg(&payload)
        .assert()
        .success();
    let out: Value = serde_json::from_slice(&assert.get_output().stdout).expect("json");
    let data = &out["data"];
    assert_eq!(data["image_name"], "tonsil.ome.tif");
    assert_eq!(data["author_name"], "Ada");
    assert_eq!(data["groups"][0]["label"], "Default");
    assert_eq!(data["groups"][0]["channels"].as_array().unwrap().len(), 3);
    assert_eq!(data["waypoints"].as_array().unwrap().len(), 1);
}

#[test]
fn build_rejects_bad_render_names() {
    let tmp = TempDir::new().expect("tmpdir");
    let payload = write_payload(tmp.path());

    story()
        .arg("--dir")
        .arg(tmp.path())
        .arg("build")
        .arg(&payload)
        .args(["--render-root", "/tmp/out", "--render-name", "a/b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("path separators"));
}

#[test]
fn browse_sorts_directories_first_and_filters() {
    let tmp = TempDir::new().expect("tmpdir");
    fs::create_dir(tmp.path().join("zeta")).unwrap();
    fs::write(tmp.path().join("a.tif"), b"12345").unwrap();
    fs::write(tmp.path().join("notes.txt"), b"hi").unwrap();

    let assert = story()
        .args(["--json", "--dir"])
        .arg(tmp.path())
        .args(["browse", "--images"])
        .assert()
        .success();
    let out: Value = serde_json::from_slice(&assert.get_output().stdout).expect("json");
    let names: Vec<_> = out["data"]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["zeta", "a.tif"]);
}

#[test]
fn run_session_edits_and_saves_locally() {
    let tmp = TempDir::new().expect("tmpdir");
    let payload = write_payload(tmp.path());
    let input = [
        r#"{"cmd":"apply","change":{"op":"set_author","name":"Grace"}}"#,
        r#"{"cmd":"apply","change":{"op":"insert_group","after":0,"label":"Immune","channels":[1,2]}}"#,
        r#"{"cmd":"apply","change":{"op":"rename_group","key":1,"label":"bad!"}}"#,
        r#"{"cmd":"save"}"#,
        r#"{"cmd":"snapshot"}"#,
    ]
    .join("\n");

    let assert = story()
        .arg("--dir")
        .arg(tmp.path())
        .arg("run")
        .arg("--payload")
        .arg(&payload)
        .write_stdin(input)
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let replies: Vec<Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).expect("reply json"))
        .collect();
    assert_eq!(replies.len(), 5);
    assert!(replies.iter().all(|r| r["ok"] == true));
    assert_eq!(replies[0]["data"]["qualified"], true);
    assert_eq!(replies[2]["data"]["qualified"], false);
    assert_eq!(replies[3]["data"]["outcome"], "saved");

    let snapshot = &replies[4]["data"];
    assert!(snapshot["error"].as_str().is_some());
    assert_eq!(snapshot["story"]["groups"][1]["label"], "Immune");

    let saved: Value =
        serde_json::from_slice(&fs::read(tmp.path().join("tonsil.story.json")).unwrap()).unwrap();
    assert_eq!(saved["author_name"], "Grace");
}

#[test]
fn run_reports_bad_requests_and_keeps_going() {
    let tmp = TempDir::new().expect("tmpdir");
    let payload = write_payload(tmp.path());

    story()
        .arg("--dir")
        .arg(tmp.path())
        .arg("run")
        .arg("--payload")
        .arg(&payload)
        .write_stdin("{\"cmd\":\"fly\"}\n{\"cmd\":\"snapshot\"}\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("bad request"))
        .stdout(predicate::str::contains("\"ok\":true"));
}

#[test]
fn import_failure_reports_the_error_code() {
    let tmp = TempDir::new().expect("tmpdir");

    story()
        .arg("--dir")
        .arg(tmp.path())
        .arg("import")
        .arg(tmp.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("IMPORT error"));
}
