//! OpenAI provider
//!
//! Model listing via `api.openai.com/v1/models`.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::error;

use super::{ApiKey, LIST_TIMEOUT_SECS, ModelProvider};
use crate::llm::{ModelDescriptor, http_client};

pub const PROVIDER_ID: &str = "openai";
const MODELS_URL: &str = "https://api.openai.com/v1/models";

/// OpenAI models listing response
#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    description: String,
}

pub struct OpenAiProvider {
    api_url: String,
}

impl OpenAiProvider {
    pub fn new() -> Self {
        OpenAiProvider {
            api_url: MODELS_URL.to_string(),
        }
    }
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn display_name(&self) -> &str {
        "OpenAI"
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
                error!("failed to fetch OpenAI model list: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            error!("OpenAI model list returned HTTP {}", response.status());
            return None;
        }

        let list: ModelList = match response.json().await {
            Ok(l) => l,
            Err(e) => {
                error!("failed to parse OpenAI model list: {}", e);
                return None;
            }
        };

        Some(
            list.data
                .into_iter()
                .map(|m| ModelDescriptor {
                    name: m.id.clone(),
                    id: m.id,
                    description: m.description,
                    provider: PROVIDER_ID.to_string(),
                    context_length: None,
                    pricing: None,
                })
                .collect(),
        )
    }
}
