use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

fn write_project(path: &Path, json: &str) {
    fs::write(path, json).expect("project should write");
}

fn run_vizmatic(cwd: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_vizmatic"))
        .current_dir(cwd)
        .args(args)
        .output()
        .expect("vizmatic command should run")
}

#[test]
fn version_flag_reports_the_package_version() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_vizmatic(dir.path(), &["--version"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "stdout: {stdout}"
    );
}

#[test]
fn missing_project_file_exits_with_config_code() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_vizmatic(dir.path(), &["check", "nope.json"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("project/not_found"), "stderr: {stderr}");
}

#[test]
fn unsupported_version_exits_with_config_code() {
    let dir = tempdir().expect("tempdir should create");
    let project = dir.path().join("comp.json");
    write_project(
        &project,
        r#"{ "version": "0.9", "clips": [{ "path": "a.mp4" }] }"#,
    );
    let output = run_vizmatic(dir.path(), &["render", "comp.json"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("project/bad_version"), "stderr: {stderr}");
}

#[test]
fn missing_media_exits_with_config_code() {
    let dir = tempdir().expect("tempdir should create");
    let project = dir.path().join("comp.json");
    write_project(
        &project,
        r#"{ "version": "1.0", "clips": [{ "path": "gone.mp4" }] }"#,
    );
    let output = run_vizmatic(dir.path(), &["check", "comp.json"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("project/missing_file"), "stderr: {stderr}");
}

#[test]
fn check_reports_summary_for_a_valid_project() {
    let dir = tempdir().expect("tempdir should create");
    fs::write(dir.path().join("a.mp4"), b"").expect("media stub should write");
    let project = dir.path().join("comp.json");
    write_project(
        &project,
        r#"{ "version": "1.0",
             "clips": [{ "path": "a.mp4", "duration": 2.0 }],
             "layers": [{ "type": "text", "text": "hi" }] }"#,
    );
    let output = run_vizmatic(dir.path(), &["check", "comp.json"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("OK: comp.json (1 clips, 1 layers, audio: no)"));
    assert!(stdout.contains("comp_render.mp4"));
}

#[test]
fn unusable_engine_exits_with_environment_code() {
    let dir = tempdir().expect("tempdir should create");
    fs::write(dir.path().join("a.mp4"), b"").expect("media stub should write");
    let project = dir.path().join("comp.json");
    write_project(
        &project,
        r#"{ "version": "1.0", "clips": [{ "path": "a.mp4", "duration": 2.0 }] }"#,
    );
    let output = Command::new(env!("CARGO_BIN_EXE_vizmatic"))
        .current_dir(dir.path())
        .env("VIZMATIC_FFMPEG", "/definitely/not/ffmpeg")
        .args(["render", "comp.json"])
        .output()
        .expect("vizmatic command should run");
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("engine/unavailable"), "stderr: {stderr}");
}
