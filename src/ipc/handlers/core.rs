use crate::config;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "configPath": state.config_path.as_ref().map(|p| p.to_string_lossy().to_string()),
            "extraFieldCount": state.extra_fields.len(),
        }),
    )
}

fn handle_config_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    // Validate the whole document before touching state so a bad file
    // never half-applies.
    match config::load_config(&path, &state.settings) {
        Ok(loaded) => {
            state.settings = loaded.settings;
            state.extra_fields = loaded.extra_fields;
            state.config_path = Some(path.clone());
            ok(
                &req.id,
                json!({
                    "configPath": path.to_string_lossy(),
                    "settings": state.settings.to_json(),
                    "extraFieldCount": state.extra_fields.len(),
                }),
            )
        }
        Err(e) => err(&req.id, "config_load_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "config.load" => Some(handle_config_load(state, req)),
        _ => None,
    }
}
