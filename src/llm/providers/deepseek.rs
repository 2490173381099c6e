//! DeepSeek provider (default)
//!
//! Model listing via the OpenAI-compatible `/models` endpoint at
//! `api.deepseek.com`.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::error;

use super::{ApiKey, LIST_TIMEOUT_SECS, ModelProvider};
use crate::llm::{ModelDescriptor, http_client};

pub const PROVIDER_ID: &str = "deepseek";
const MODELS_URL: &str = "https://api.deepseek.com/v1/models";

/// DeepSeek models listing response
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

pub struct DeepSeekProvider {
    api_url: String,
}

impl DeepSeekProvider {
    pub fn new() -> Self {
        DeepSeekProvider {
            api_url: MODELS_URL.to_string(),
        }
    }
}

impl Default for DeepSeekProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for DeepSeekProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn display_name(&self) -> &str {
        "DeepSeek"
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
                error!("failed to fetch DeepSeek model list: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            error!("DeepSeek model list returned HTTP {}", response.status());
            return None;
        }

        let list: ModelList = match response.json().await {
            Ok(l) => l,
            Err(e) => {
                error!("failed to parse DeepSeek model list: {}", e);
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
