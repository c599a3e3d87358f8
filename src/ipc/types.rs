use std::path::PathBuf;

use serde::Deserialize;

use crate::calc::{ExtraField, Settings};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Session state for one sidecar process. The defaults are whatever the
/// shell last loaded or updated; requests may override them per call, and
/// nothing here is ever written back to disk.
pub struct AppState {
    pub config_path: Option<PathBuf>,
    pub settings: Settings,
    pub extra_fields: Vec<ExtraField>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            config_path: None,
            settings: Settings::default(),
            extra_fields: Vec::new(),
        }
    }
}
