//! # Command Handlers
//!
//! One handler per subcommand. Handlers own the wiring: configuration load,
//! processor construction, and user-facing output. Results go to stdout;
//! diagnostics go through tracing.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde_json::Value;

use crate::cli::{Cli, Command, ConfigAction};
use crate::config::{ConfigStore, DEFAULT_MODEL, DEFAULT_TEMPLATE_NAME};
use crate::llm::{ApiKey, ModelRegistry, resolve_model};
use crate::paths;
use crate::processor::{ProcessorOptions, PromptProcessor};
use crate::tasks::TaskManager;
use crate::templates::TemplateCatalog;

pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(paths::config_file);
    let mut store = ConfigStore::load(config_path);

    match &cli.command {
        Command::Process { text } => handle_process(&cli, &store, text).await,
        Command::File { path } => handle_file(&cli, &store, path.clone()).await,
        Command::Dir { path, no_recursive, extensions, resume } => {
            handle_dir(&cli, &store, path.clone(), !*no_recursive, extensions, *resume).await
        }
        Command::Templates { dir } => handle_templates(&store, dir.clone()),
        Command::Models { provider, refresh } => {
            handle_models(&cli, &store, provider.clone(), *refresh).await
        }
        Command::Config { action } => handle_config(&mut store, action),
    }
}

/// Resolve the template directory: explicit config key, then the user-level
/// directory when it exists, then `./templates`.
fn resolve_templates_dir(store: &ConfigStore) -> PathBuf {
    let configured = store.get_str("templates_dir", "");
    if !configured.is_empty() {
        return PathBuf::from(configured);
    }
    let user_dir = paths::templates_dir();
    if user_dir.is_dir() {
        return user_dir;
    }
    PathBuf::from(paths::TEMPLATES_DIR)
}

/// Build a processor from the stored configuration plus CLI overrides.
fn build_processor(cli: &Cli, store: &ConfigStore) -> Result<PromptProcessor> {
    if let Err(reason) = store.validate() {
        bail!("configuration at {} is invalid: {}", store.path().display(), reason);
    }

    let api_key = cli
        .api_key
        .clone()
        .unwrap_or_else(|| store.get_str("api_key", ""));
    if api_key.is_empty() {
        bail!("no API key configured; pass --api-key or set api_key in the config");
    }

    let options = ProcessorOptions {
        template_name: cli
            .template
            .clone()
            .unwrap_or_else(|| store.get_str("template_name", DEFAULT_TEMPLATE_NAME)),
        model: cli
            .model
            .clone()
            .unwrap_or_else(|| store.get_str("model", DEFAULT_MODEL)),
        temperature: store.get_f64("parameters.temperature", 0.7) as f32,
        max_tokens: store.get_u64("parameters.max_tokens", 1000) as u32,
        output_path: cli
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(store.get_str("output_directory", "output"))),
        timeout_secs: store.get_u64("request.timeout_secs", 30),
        max_retries: store.get_u64("request.max_retries", 2) as usize,
    };

    let catalog = TemplateCatalog::new(resolve_templates_dir(store));
    let registry = ModelRegistry::with_default_providers(paths::cache_dir());
    PromptProcessor::new(ApiKey::new(api_key), options, catalog, registry)
}

async fn handle_process(cli: &Cli, store: &ConfigStore, text: &str) -> Result<()> {
    let processor = build_processor(cli, store)?;
    match processor.process_content(text).await {
        Some(result) => {
            println!("{}", result);
            Ok(())
        }
        None => bail!("failed to process content"),
    }
}

async fn handle_file(cli: &Cli, store: &ConfigStore, path: PathBuf) -> Result<()> {
    let processor = build_processor(cli, store)?;
    if processor.process_file(&path).await {
        println!("Processed {}", path.display());
        Ok(())
    } else {
        bail!("failed to process {}", path.display());
    }
}

async fn handle_dir(
    cli: &Cli,
    store: &ConfigStore,
    path: PathBuf,
    recursive: bool,
    extensions: &[String],
    resume: bool,
) -> Result<()> {
    let mut processor = build_processor(cli, store)?
        .with_tasks(TaskManager::new(paths::checkpoint_dir()), resume);
    let stats = processor.process_directory(&path, recursive, extensions).await?;

    println!("{}", stats.summary());
    for file in &stats.failed_files {
        println!("  failed: {}", file.display());
    }
    Ok(())
}

fn handle_templates(store: &ConfigStore, dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| resolve_templates_dir(store));
    let catalog = TemplateCatalog::new(&dir);
    let names = catalog.list_available();
    if names.is_empty() {
        println!("No templates found in {}", dir.display());
        return Ok(());
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

/// Per-provider API keys: `api_keys.<id>` from the config, falling back to
/// the CLI override and then the flat `api_key` entry.
fn api_keys_for(
    cli: &Cli,
    store: &ConfigStore,
    registry: &ModelRegistry,
    only: Option<&str>,
) -> HashMap<String, ApiKey> {
    let fallback = cli
        .api_key
        .clone()
        .unwrap_or_else(|| store.get_str("api_key", ""));
    let mut keys = HashMap::new();
    for id in registry.provider_ids() {
        if let Some(only) = only {
            if id != only {
                continue;
            }
        }
        let key = store.get_str(&format!("api_keys.{}", id), &fallback);
        if !key.is_empty() {
            keys.insert(id, ApiKey::new(key));
        }
    }
    keys
}

async fn handle_models(
    cli: &Cli,
    store: &ConfigStore,
    provider: Option<String>,
    refresh: bool,
) -> Result<()> {
    let registry = ModelRegistry::with_default_providers(paths::cache_dir());
    if let Some(id) = &provider {
        if !registry.contains(id) {
            bail!(
                "unknown provider '{}'; registered providers: {}",
                id,
                registry.provider_ids().join(", ")
            );
        }
    }

    let keys = api_keys_for(cli, store, &registry, provider.as_deref());
    if keys.is_empty() {
        bail!("no API key configured; pass --api-key or set api_key in the config");
    }

    let all = registry.get_all_models(&keys, refresh).await;
    for (provider_id, models) in &all {
        let display = registry.display_name(provider_id).unwrap_or(provider_id);
        println!("=== {} ({}) ===", display, provider_id);
        if models.is_empty() {
            println!("  (no models available)");
            continue;
        }
        for model in models {
            let mut line = format!("  {}/{}", provider_id, model.id);
            if let Some(context) = model.context_length {
                line.push_str(&format!("  [context: {}]", context));
            }
            println!("{}", line);
        }
    }

    if provider.is_none() {
        let configured = cli
            .model
            .clone()
            .unwrap_or_else(|| store.get_str("model", DEFAULT_MODEL));
        match resolve_model(&configured, &all) {
            Some(descriptor) => {
                println!("\nConfigured model {} is available ({}).", configured, descriptor.name)
            }
            None => {
                println!("\nConfigured model {} was not found in the listings above.", configured)
            }
        }
    }
    Ok(())
}

fn handle_config(store: &mut ConfigStore, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let value = store
                .get(key)
                .with_context(|| format!("key not set: {}", key))?;
            match value {
                Value::String(s) => println!("{}", s),
                other => println!("{}", other),
            }
            Ok(())
        }
        ConfigAction::Set { key, value } => {
            let parsed: Value = serde_json::from_str(value)
                .unwrap_or_else(|_| Value::String(value.clone()));
            if store.update(key, parsed) {
                Ok(())
            } else {
                bail!("failed to update {}", key);
            }
        }
    }
}
