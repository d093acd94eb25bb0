use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Session state. Only the selected workspace directory lives here; parsed
/// reports are request-scoped and never cached across requests.
pub struct AppState {
    pub workspace: Option<PathBuf>,
}
