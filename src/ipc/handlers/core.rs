use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

/// Selects the directory that holds the exported report files. Relative
/// report paths in later requests resolve against it.
fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = path else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match std::fs::metadata(&path) {
        Ok(meta) if meta.is_dir() => {
            info!(path = %path.display(), "workspace selected");
            state.workspace = Some(path.clone());
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Ok(_) => err(
            &req.id,
            "bad_params",
            format!("'{}' is not a directory", path.display()),
            None,
        ),
        Err(e) => err(
            &req.id,
            "io_error",
            format!("cannot read '{}': {}", path.display(), e),
            None,
        ),
    }
}

/// Candidate export files in the workspace, for the GUI's file picker.
fn handle_reports_scan(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(ws) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match scan_export_files(&ws) {
        Ok(files) => ok(&req.id, json!({ "files": files })),
        Err(e) => err(&req.id, "io_error", format!("{e:?}"), None),
    }
}

fn scan_export_files(folder: &Path) -> anyhow::Result<Vec<String>> {
    let mut files: Vec<String> = Vec::new();
    for ent in std::fs::read_dir(folder)? {
        let ent = ent?;
        let p = ent.path();
        if !p.is_file() {
            continue;
        }
        let name = p.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if name.to_ascii_lowercase().ends_with(".csv") {
            files.push(name.to_string());
        }
    }
    files.sort();
    Ok(files)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "reports.scan" => Some(handle_reports_scan(state, req)),
        _ => None,
    }
}
