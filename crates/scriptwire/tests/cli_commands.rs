#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/swcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn spawn_serve(sock_path: &Path, extra: &[&str]) -> Child {
    let child = Command::new(env!("CARGO_BIN_EXE_scriptwire"))
        .arg("--log-level")
        .arg("error")
        .arg("serve")
        .arg(sock_path)
        .args(extra)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("serve command should start");
    wait_for_socket(sock_path, Duration::from_secs(3));
    child
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("socket never appeared at {}", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn scriptwire(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_scriptwire"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("scriptwire should run")
}

fn stop(mut child: Child, dir: &Path) {
    let _ = child.kill();
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn call_against_serve_returns_call_expression() {
    let dir = unique_temp_dir("call");
    let sock_path = dir.join("host.sock");
    let child = spawn_serve(&sock_path, &[]);
    let sock = sock_path.to_str().expect("utf-8 path");

    let output = scriptwire(&[
        "--format",
        "json",
        "call",
        sock,
        "flushedQueue",
        "--arg",
        "1",
        "--arg",
        "[2]",
    ]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let record: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be one JSON record");
    assert_eq!(record["request"], "flushedQueue");
    assert_eq!(record["defined"], true);
    assert_eq!(record["value"], r#"__fbBatchedBridge.flushedQueue("1",[2]);"#);
    assert_eq!(record["stats"]["sent"], 1);
    assert_eq!(record["stats"]["received"], 1);

    stop(child, &dir);
}

#[test]
fn eval_raw_prints_reply_text() {
    let dir = unique_temp_dir("eval");
    let sock_path = dir.join("host.sock");
    let child = spawn_serve(&sock_path, &[]);
    let sock = sock_path.to_str().expect("utf-8 path");

    let output = scriptwire(&["--format", "raw", "eval", sock, "x=[1,2];"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "undefined");

    let output = scriptwire(&["--format", "raw", "eval", sock, "hello"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "\"hello\"");

    stop(child, &dir);
}

#[test]
fn eval_file_reports_application_script_done() {
    let dir = unique_temp_dir("eval-file");
    let sock_path = dir.join("host.sock");
    let script_path = dir.join("app.js");
    std::fs::write(&script_path, "require('main');\n").expect("script should be writable");
    let child = spawn_serve(&sock_path, &[]);

    let output = scriptwire(&[
        "--format",
        "pretty",
        "eval",
        sock_path.to_str().expect("utf-8 path"),
        "--file",
        script_path.to_str().expect("utf-8 path"),
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("app.js"), "stdout: {stdout}");
    assert!(stdout.contains("sent=1 received=1"), "stdout: {stdout}");

    stop(child, &dir);
}

#[test]
fn serve_exits_after_count_sessions() {
    let dir = unique_temp_dir("count");
    let sock_path = dir.join("host.sock");
    let mut child = spawn_serve(&sock_path, &["--count", "1"]);

    let output = scriptwire(&["eval", sock_path.to_str().expect("utf-8 path"), "1"]);
    assert!(output.status.success());

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().expect("child status should be readable") {
            break status;
        }
        if start.elapsed() >= Duration::from_secs(5) {
            let _ = child.kill();
            panic!("serve did not exit after its last session");
        }
        thread::sleep(Duration::from_millis(25));
    };
    assert!(status.success());
    assert!(!sock_path.exists(), "socket file should be removed on exit");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn call_missing_socket_returns_3() {
    let dir = unique_temp_dir("missing");
    let output = scriptwire(&[
        "call",
        dir.join("nobody.sock").to_str().expect("utf-8 path"),
        "flushedQueue",
    ]);
    assert_eq!(output.status.code(), Some(3));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn call_with_invalid_json_arg_returns_64() {
    let output = scriptwire(&["call", "/tmp/unused.sock", "m", "--arg", "not-json"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not valid JSON"));
}

#[test]
fn call_with_invalid_method_returns_64() {
    let dir = unique_temp_dir("bad-method");
    let sock_path = dir.join("host.sock");
    let child = spawn_serve(&sock_path, &[]);

    let output = scriptwire(&["call", sock_path.to_str().expect("utf-8 path"), "a.b()"]);
    assert_eq!(output.status.code(), Some(64));

    stop(child, &dir);
}

#[test]
fn version_reports_name() {
    let output = scriptwire(&["version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("scriptwire "));

    let output = scriptwire(&["version", "--extended"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("frame_byte_order: "));
}
