//! # Template Catalog
//!
//! Discovers, loads and validates prompt templates. A template is a plain
//! text file with a `## System Message` section followed by a
//! `## User Message` section whose body carries exactly one `{PROMPT}`
//! placeholder. The catalog caches loaded templates and tracks which one is
//! currently active, scoped to the catalog instance.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

pub const SYSTEM_MARKER: &str = "## System Message";
pub const USER_MARKER: &str = "## User Message";
pub const PLACEHOLDER: &str = "{PROMPT}";
pub const TEMPLATE_EXTENSION: &str = "txt";

/// A parsed, validated prompt template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub system: String,
    pub user: String,
}

impl Template {
    /// Parse raw template text. Returns `None` when the structure is invalid.
    pub fn parse(name: &str, text: &str) -> Option<Self> {
        if !validate(text) {
            return None;
        }
        let system_idx = text.find(SYSTEM_MARKER)?;
        let user_idx = text.find(USER_MARKER)?;
        let system = text[system_idx + SYSTEM_MARKER.len()..user_idx].trim();
        let user = text[user_idx + USER_MARKER.len()..].trim();
        Some(Template {
            name: name.to_string(),
            system: system.to_string(),
            user: user.to_string(),
        })
    }

    /// Substitute the caller's text into the user-section placeholder.
    pub fn render(&self, input: &str) -> String {
        self.user.replacen(PLACEHOLDER, input, 1)
    }
}

/// Structural validation: both section markers present in order, and the
/// user section contains exactly one placeholder token.
pub fn validate(text: &str) -> bool {
    let (system_idx, user_idx) = match (text.find(SYSTEM_MARKER), text.find(USER_MARKER)) {
        (Some(s), Some(u)) => (s, u),
        _ => return false,
    };
    if user_idx < system_idx {
        return false;
    }
    let system_body = &text[system_idx + SYSTEM_MARKER.len()..user_idx];
    let user_body = &text[user_idx + USER_MARKER.len()..];
    if system_body.trim().is_empty() || user_body.trim().is_empty() {
        return false;
    }
    user_body.matches(PLACEHOLDER).count() == 1
}

/// Template catalog over a directory of `*.txt` files.
pub struct TemplateCatalog {
    dir: PathBuf,
    cache: HashMap<String, Template>,
    current: Option<String>,
}

impl TemplateCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        TemplateCatalog {
            dir: dir.into(),
            cache: HashMap::new(),
            current: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Template names in the catalog directory, sorted lexicographically so
    /// repeated listings are stable.
    pub fn list_available(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot read template directory {}: {}", self.dir.display(), e);
                return Vec::new();
            }
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some(TEMPLATE_EXTENSION) {
                    path.file_stem().map(|s| s.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        names
    }

    /// Load a template by name. An absent or invalid template is `None`, not
    /// an error; a successful load installs the template as current.
    pub fn load(&mut self, name: &str) -> Option<Template> {
        if name.is_empty() {
            return None;
        }
        if let Some(template) = self.cache.get(name) {
            let template = template.clone();
            self.current = Some(name.to_string());
            return Some(template);
        }
        let path = self.dir.join(format!("{}.{}", name, TEMPLATE_EXTENSION));
        let text = fs::read_to_string(&path).ok()?;
        let template = match Template::parse(name, &text) {
            Some(t) => t,
            None => {
                warn!("template {} is structurally invalid", path.display());
                return None;
            }
        };
        self.cache.insert(name.to_string(), template.clone());
        self.current = Some(name.to_string());
        Some(template)
    }

    /// The most recently successfully loaded template, if any.
    pub fn current(&self) -> Option<&Template> {
        self.current.as_deref().and_then(|name| self.cache.get(name))
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }
}
