//! OpenRouter provider
//!
//! OpenRouter aggregates many upstream vendors and is the one launch
//! provider that reports context windows and pricing in its listing.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::error;

use super::{ApiKey, LIST_TIMEOUT_SECS, ModelProvider};
use crate::llm::{ModelDescriptor, ModelPricing, http_client};

pub const PROVIDER_ID: &str = "openrouter";
const MODELS_URL: &str = "https://openrouter.ai/api/v1/models";

/// OpenRouter models listing response
#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    context_length: Option<u64>,
    #[serde(default)]
    pricing: Option<PricingEntry>,
}

#[derive(Debug, Deserialize)]
struct PricingEntry {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    completion: Option<String>,
}

pub struct OpenRouterProvider {
    api_url: String,
}

impl OpenRouterProvider {
    pub fn new() -> Self {
        OpenRouterProvider {
            api_url: MODELS_URL.to_string(),
        }
    }
}

impl Default for OpenRouterProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for OpenRouterProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn display_name(&self) -> &str {
        "OpenRouter"
    }

    async fn fetch_models(&self, api_key: &ApiKey) -> Option<Vec<ModelDescriptor>> {
        let response = http_client()
            .get(&self.api_url)
            .bearer_auth(api_key.expose())
            .timeout(std::time::Duration::from_secs(LIST_TIMEOUT_SECS))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                error!("failed to fetch OpenRouter model list: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            error!("OpenRouter model list returned HTTP {}", response.status());
            return None;
        }

        let list: ModelList = match response.json().await {
            Ok(l) => l,
            Err(e) => {
                error!("failed to parse OpenRouter model list: {}", e);
                return None;
            }
        };

        Some(
            list.data
                .into_iter()
                .map(|m| {
                    let name = if m.name.is_empty() { m.id.clone() } else { m.name };
                    ModelDescriptor {
                        id: m.id,
                        name,
                        description: m.description,
                        provider: PROVIDER_ID.to_string(),
                        context_length: m.context_length,
                        pricing: m.pricing.map(|p| ModelPricing {
                            prompt: p.prompt,
                            completion: p.completion,
                        }),
                    }
                })
                .collect(),
        )
    }
}
