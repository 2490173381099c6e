//! # LLM Layer
//!
//! Shared types for the model-provider abstraction: descriptors, the redacted
//! API-key container, the provider-boundary error value, and the registry
//! that resolves composite `provider/model` identifiers across providers.

pub mod chat;
pub mod providers;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

pub use providers::ModelProvider;

/// Hours a cached model listing stays fresh.
pub const CACHE_EXPIRY_HOURS: i64 = 24;

/// Per-model pricing as reported by the provider (OpenRouter quotes strings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<String>,
}

/// Normalized description of one remotely hosted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<ModelPricing>,
}

/// API credential held in process memory only. Never serialized, never
/// printed; the buffer is overwritten when the container is dropped.
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        ApiKey(key.into())
    }

    /// The raw key, for building request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl Drop for ApiKey {
    fn drop(&mut self) {
        let mut bytes = std::mem::take(&mut self.0).into_bytes();
        for b in bytes.iter_mut() {
            *b = 0;
        }
    }
}

/// Error value at the provider boundary.
#[derive(Debug)]
pub struct Error {
    pub provider: String,
    pub message: String,
}

impl Error {
    pub fn new(provider: &str, message: impl Into<String>) -> Self {
        Error {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.provider, self.message)
    }
}

impl std::error::Error for Error {}

/// HTTP client reused across requests
pub(crate) fn http_client() -> &'static reqwest::Client {
    use std::sync::OnceLock;
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client")
    })
}

/// Split a composite `provider/model-name` identifier on the first `/`.
/// Identifiers without a separator (or with an empty half) are rejected.
pub fn parse_model_id(model_id: &str) -> Option<(&str, &str)> {
    match model_id.split_once('/') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
            Some((provider, model))
        }
        _ => None,
    }
}

/// Look up a descriptor by composite id inside an aggregate from
/// [`ModelRegistry::get_all_models`]. Matches on descriptor id or name.
pub fn resolve_model<'a>(
    model_id: &str,
    all_models: &'a BTreeMap<String, Vec<ModelDescriptor>>,
) -> Option<&'a ModelDescriptor> {
    let (provider_id, model_name) = parse_model_id(model_id)?;
    all_models
        .get(provider_id)?
        .iter()
        .find(|m| m.id == model_name || m.name == model_name)
}

/// On-disk cache entry for one provider's model listing.
#[derive(Debug, Serialize, Deserialize)]
struct CachedListing {
    timestamp: i64,
    models: Vec<ModelDescriptor>,
}

/// Registry of model providers keyed by provider id.
pub struct ModelRegistry {
    providers: HashMap<String, Box<dyn ModelProvider>>,
    cache_dir: PathBuf,
}

impl ModelRegistry {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        ModelRegistry {
            providers: HashMap::new(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Registry with the built-in providers registered.
    pub fn with_default_providers(cache_dir: impl Into<PathBuf>) -> Self {
        let mut registry = ModelRegistry::new(cache_dir);
        registry.register(Box::new(providers::deepseek::DeepSeekProvider::new()));
        registry.register(Box::new(providers::openai::OpenAiProvider::new()));
        registry.register(Box::new(providers::openrouter::OpenRouterProvider::new()));
        registry
    }

    /// Register a provider under its id. Re-registering an id replaces the
    /// previous provider (last write wins).
    pub fn register(&mut self, provider: Box<dyn ModelProvider>) {
        let id = provider.id().to_string();
        if self.providers.insert(id.clone(), provider).is_some() {
            debug!("provider {} re-registered, previous entry replaced", id);
        }
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    /// Registered provider ids, sorted for stable display.
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn display_name(&self, provider_id: &str) -> Option<&str> {
        self.providers.get(provider_id).map(|p| p.display_name())
    }

    /// Models for one provider, served from the disk cache while fresh.
    /// A failed refresh falls back to a stale cache before giving up; an
    /// unknown provider id yields an empty list, never a panic.
    pub async fn get_models(
        &self,
        provider_id: &str,
        api_key: &ApiKey,
        force_refresh: bool,
    ) -> Vec<ModelDescriptor> {
        let provider = match self.providers.get(provider_id) {
            Some(p) => p,
            None => {
                error!("unknown provider id: {}", provider_id);
                return Vec::new();
            }
        };

        let cache_file = self.cache_dir.join(format!("{}_models.json", provider_id));
        if !force_refresh {
            if let Some(models) = read_cache(&cache_file, true) {
                return models;
            }
        }

        match provider.fetch_models(api_key).await {
            Some(models) => {
                write_cache(&cache_file, &models);
                models
            }
            None => {
                // Fetch failed: a stale listing beats no listing.
                read_cache(&cache_file, false).unwrap_or_default()
            }
        }
    }

    /// Aggregate model listings across every provider id present in the key
    /// map. A provider whose fetch fails (or whose id is unknown) maps to an
    /// empty list so partial results keep every requested key.
    pub async fn get_all_models(
        &self,
        api_keys: &HashMap<String, ApiKey>,
        force_refresh: bool,
    ) -> BTreeMap<String, Vec<ModelDescriptor>> {
        let mut all = BTreeMap::new();
        for (provider_id, api_key) in api_keys {
            let models = self.get_models(provider_id, api_key, force_refresh).await;
            all.insert(provider_id.clone(), models);
        }
        all
    }
}

fn read_cache(cache_file: &std::path::Path, require_fresh: bool) -> Option<Vec<ModelDescriptor>> {
    let content = fs::read_to_string(cache_file).ok()?;
    let cached: CachedListing = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("discarding unreadable model cache {}: {}", cache_file.display(), e);
            return None;
        }
    };
    if require_fresh {
        let age = chrono::Utc::now().timestamp() - cached.timestamp;
        if age >= CACHE_EXPIRY_HOURS * 3600 {
            return None;
        }
    }
    Some(cached.models)
}

fn write_cache(cache_file: &std::path::Path, models: &[ModelDescriptor]) {
    if let Some(parent) = cache_file.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("cannot create cache directory {}: {}", parent.display(), e);
            return;
        }
    }
    let entry = CachedListing {
        timestamp: chrono::Utc::now().timestamp(),
        models: models.to_vec(),
    };
    match serde_json::to_string_pretty(&entry) {
        Ok(content) => {
            if let Err(e) = fs::write(cache_file, content) {
                warn!("failed to write model cache {}: {}", cache_file.display(), e);
            }
        }
        Err(e) => warn!("failed to serialize model cache: {}", e),
    }
}
