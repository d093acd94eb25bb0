
use serde_json::json;
use test_support::{fixture_path, request, request_err, request_ok, spawn_sidecar};

#[test]
fn health_reports_version_and_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(
        health.get("version").and_then(|v| v.as_str()),
        Some(env!("CARGO_PKG_VERSION"))
    );
    assert!(health
        .get("workspacePath")
        .map(|v| v.is_null())
        .unwrap_or(false));
}

#[test]
fn unknown_method_is_not_implemented() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let code = request_err(&mut stdin, &mut reader, "1", "bogus.method", json!({}));
    assert_eq!(code, "not_implemented");
}

#[test]
fn workspace_select_and_scan_lists_exports() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let ws = fixture_path("fixtures/reports");
    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": ws.to_string_lossy() }),
    );
    assert!(selected.get("workspacePath").is_some());

    let scan = request_ok(&mut stdin, &mut reader, "2", "reports.scan", json!({}));
    let files: Vec<String> = scan
        .get("files")
        .and_then(|v| v.as_array())
        .expect("files array")
        .iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect();
    assert!(files.contains(&"8a_trim1.csv".to_string()));
    assert!(files.contains(&"8a_2024-09.csv".to_string()));
    let mut sorted = files.clone();
    sorted.sort();
    assert_eq!(files, sorted);
}

#[test]
fn workspace_select_rejects_a_plain_file() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let file = tempfile::NamedTempFile::new().expect("temp file");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": file.path().to_string_lossy() }),
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn scan_without_workspace_is_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let code = request_err(&mut stdin, &mut reader, "1", "reports.scan", json!({}));
    assert_eq!(code, "no_workspace");
}

#[test]
fn bad_json_line_still_gets_a_reply() {
    use std::io::{BufRead, Write};

    let (_child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "this is not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let resp: serde_json::Value = serde_json::from_str(&line).expect("parse");
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("bad_json"));

    // The loop keeps serving after a bad line.
    let health = request(&mut stdin, &mut reader, "2", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
}
