//! # Model Providers
//!
//! One module per vendor. Providers differ only in endpoint, authentication
//! headers and the response shape they normalize into [`ModelDescriptor`]s;
//! everything else (caching, registry dispatch) lives a level up.

pub mod deepseek;
pub mod openai;
pub mod openrouter;

use async_trait::async_trait;

use super::{ApiKey, ModelDescriptor};

/// Seconds allowed for a model-listing request.
pub(crate) const LIST_TIMEOUT_SECS: u64 = 10;

/// Capability contract for a named model provider.
///
/// `fetch_models` catches transport errors and non-success statuses at the
/// boundary and reports them as `None`; `Some(vec![])` means the provider
/// answered with zero models, which callers must treat differently.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Stable provider id, the left half of a composite model identifier.
    fn id(&self) -> &str;

    /// Human-readable vendor name.
    fn display_name(&self) -> &str;

    /// Fetch the provider's current model listing.
    async fn fetch_models(&self, api_key: &ApiKey) -> Option<Vec<ModelDescriptor>>;
}
