use std::path::Path;

use anyhow::Context;

use crate::calc::{self, ExtraField, Settings};

pub struct LoadedConfig {
    pub settings: Settings,
    pub extra_fields: Vec<ExtraField>,
}

/// Read a config document shaped as
/// `{ "defaultSettings": {...}, "extraFields": [...] }`, both parts
/// optional. `base` supplies values for settings keys the file leaves
/// out. The whole document is parsed and validated before anything is
/// returned, so callers can apply the result atomically.
pub fn load_config(path: &Path, base: &Settings) -> anyhow::Result<LoadedConfig> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    let doc: serde_json::Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config file {}", path.display()))?;
    let Some(obj) = doc.as_object() else {
        anyhow::bail!("config root must be a JSON object");
    };

    let settings = match obj.get("defaultSettings") {
        None => base.clone(),
        Some(v) => calc::parse_settings(v, base)
            .map_err(|e| anyhow::anyhow!("defaultSettings: {}", e.message))?,
    };
    calc::validate_settings(&settings)
        .map_err(|e| anyhow::anyhow!("defaultSettings: {}", e.message))?;

    let extra_fields = match obj.get("extraFields") {
        None => Vec::new(),
        Some(v) => calc::parse_extra_fields(v)
            .map_err(|e| anyhow::anyhow!("extraFields: {}", e.message))?,
    };
    calc::validate_extra_fields(&extra_fields)
        .map_err(|e| anyhow::anyhow!("extraFields: {}", e.message))?;

    Ok(LoadedConfig {
        settings,
        extra_fields,
    })
}
