//! Modular configuration loader.
//!
//! Supports splitting configuration across two files in the same directory:
//! - `config.json` - Bot behavior (paging, timeouts, logging)
//! - `secrets.json` - Credentials (Telegram token, Spotify client)
//!
//! Secrets are deep-merged into the `secrets` key of the base config, so a
//! value present in `secrets.json` wins over one in `config.json`.

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// File name of the credentials file loaded next to the main config.
pub const SECRETS_FILE: &str = "secrets.json";

/// Load a JSON file and return its contents as a Value.
/// Returns None if file doesn't exist.
fn load_json_file(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(Some(value))
}

/// Deep merge two JSON values.
/// Source values override target values, with object merging at each level.
fn merge_json(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    Some(target_value) => {
                        merge_json(target_value, source_value);
                    }
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
        }
        (target, source) => {
            *target = source;
        }
    }
}

/// Load the config file at `config_file` plus `secrets.json` from its directory.
///
/// Missing files are treated as empty objects, so a fresh install loads as
/// all defaults.
pub fn load_modular_config(config_file: &Path) -> Result<Value> {
    let mut config =
        load_json_file(config_file)?.unwrap_or_else(|| Value::Object(Default::default()));

    let Some(dir) = config_file.parent() else {
        return Ok(config);
    };

    tracing::debug!("Loading modular config from {}", dir.display());

    if let Some(secrets) = load_json_file(&dir.join(SECRETS_FILE))? {
        if let Some(config_obj) = config.as_object_mut() {
            match config_obj.get_mut("secrets") {
                Some(existing) => merge_json(existing, secrets),
                None => {
                    config_obj.insert("secrets".to_string(), secrets);
                }
            }
        }
        tracing::debug!("Loaded {SECRETS_FILE}");
    }

    Ok(config)
}
