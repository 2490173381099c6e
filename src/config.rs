//! # Configuration Store
//!
//! Loads and saves the JSON configuration document. The document is kept as a
//! raw `serde_json::Value` so keys this version does not recognize survive a
//! load/save round trip. Missing or malformed files fall back to the default
//! document rather than failing.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};
use tracing::{error, warn};

pub const DEFAULT_TEMPLATE_NAME: &str = "standard";
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u64 = 1000;

/// Builds the default configuration document.
pub fn default_document() -> Value {
    json!({
        "api_key": "",
        "template_name": DEFAULT_TEMPLATE_NAME,
        "model": DEFAULT_MODEL,
        "default_directory": "",
        "parameters": {
            "temperature": DEFAULT_TEMPERATURE,
            "max_tokens": DEFAULT_MAX_TOKENS,
        },
    })
}

/// Configuration store bound to a file path.
pub struct ConfigStore {
    path: PathBuf,
    doc: Value,
}

impl ConfigStore {
    /// Load the document at `path`. An absent file creates the default
    /// document on disk; an unparsable one is reported and replaced in memory
    /// with the defaults.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(doc) if doc.is_object() => doc,
                Ok(_) => {
                    warn!("config at {} is not a JSON object, using defaults", path.display());
                    default_document()
                }
                Err(e) => {
                    warn!("failed to parse config at {}: {}, using defaults", path.display(), e);
                    default_document()
                }
            },
            Err(_) => {
                let doc = default_document();
                let store = ConfigStore { path: path.clone(), doc: doc.clone() };
                // First run: persist the defaults so the user has a file to edit.
                store.save();
                doc
            }
        };
        ConfigStore { path, doc }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Value {
        &self.doc
    }

    /// Write the document as pretty JSON, via a temp file renamed over the
    /// target so a crash never leaves a half-written config behind.
    pub fn save(&self) -> bool {
        let content = match serde_json::to_string_pretty(&self.doc) {
            Ok(c) => c,
            Err(e) => {
                error!("failed to serialize config: {}", e);
                return false;
            }
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    error!("failed to create config directory {}: {}", parent.display(), e);
                    return false;
                }
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        if let Err(e) = fs::write(&tmp, content) {
            error!("failed to write config to {}: {}", tmp.display(), e);
            return false;
        }
        match fs::rename(&tmp, &self.path) {
            Ok(()) => true,
            Err(e) => {
                error!("failed to replace config at {}: {}", self.path.display(), e);
                let _ = fs::remove_file(&tmp);
                false
            }
        }
    }

    /// Resolve a dotted-path key (e.g. `parameters.temperature`).
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut current = &self.doc;
        for part in key.split('.') {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    /// Point-update a dotted-path key, creating intermediate objects as
    /// needed, then persist the document.
    pub fn update(&mut self, key: &str, value: Value) -> bool {
        let parts: Vec<&str> = key.split('.').collect();
        let mut current = &mut self.doc;
        for part in &parts[..parts.len() - 1] {
            let obj = match current.as_object_mut() {
                Some(o) => o,
                None => return false,
            };
            current = obj
                .entry((*part).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        match current.as_object_mut() {
            Some(o) => {
                o.insert(parts[parts.len() - 1].to_string(), value);
            }
            None => return false,
        }
        self.save()
    }

    /// Structural sanity check before a run uses this document.
    pub fn validate(&self) -> Result<(), String> {
        match self.get("model") {
            Some(Value::String(model)) if !model.is_empty() => {}
            _ => return Err("model must be a non-empty string".to_string()),
        }
        match self.get("parameters") {
            None => {}
            Some(Value::Object(_)) => {}
            Some(_) => return Err("parameters must be an object".to_string()),
        }
        if let Some(temp) = self.get("parameters.temperature") {
            match temp.as_f64() {
                Some(t) if (0.0..=1.0).contains(&t) => {}
                _ => {
                    return Err("parameters.temperature must be a number between 0 and 1".to_string());
                }
            }
        }
        if let Some(max) = self.get("parameters.max_tokens") {
            match max.as_u64() {
                Some(m) if m > 0 => {}
                _ => return Err("parameters.max_tokens must be a positive integer".to_string()),
            }
        }
        Ok(())
    }
}
