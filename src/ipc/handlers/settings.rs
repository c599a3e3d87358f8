use crate::calc;
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "settings": state.settings.to_json() }))
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("settings") else {
        return err(&req.id, "bad_params", "missing params.settings", None);
    };
    let parsed = match calc::parse_settings(raw, &state.settings) {
        Ok(s) => s,
        Err(e) => return calc_err(&req.id, e),
    };
    if let Err(e) = calc::validate_settings(&parsed) {
        return calc_err(&req.id, e);
    }
    state.settings = parsed;
    ok(&req.id, json!({ "settings": state.settings.to_json() }))
}

fn fields_json(state: &AppState) -> serde_json::Value {
    json!(state
        .extra_fields
        .iter()
        .map(|f| f.to_json())
        .collect::<Vec<_>>())
}

fn handle_fields_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "extraFields": fields_json(state) }))
}

fn handle_fields_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("fields") else {
        return err(&req.id, "bad_params", "missing params.fields", None);
    };
    let parsed = match calc::parse_extra_fields(raw) {
        Ok(fields) => fields,
        Err(e) => return calc_err(&req.id, e),
    };
    if let Err(e) = calc::validate_extra_fields(&parsed) {
        return calc_err(&req.id, e);
    }
    state.extra_fields = parsed;
    ok(&req.id, json!({ "extraFields": fields_json(state) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        "fields.list" => Some(handle_fields_list(state, req)),
        "fields.set" => Some(handle_fields_set(state, req)),
        _ => None,
    }
}
