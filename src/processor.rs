//! # Prompt Processor
//!
//! The orchestration façade: resolve a template, substitute the caller's
//! text into its placeholder, dispatch to the configured provider, and
//! return or persist the completion. Batch runs walk a directory in stable
//! lexicographic order, record per-file failures without aborting, and
//! checkpoint progress so they can be resumed.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, ensure};
use chrono::{Local, Utc};
use tracing::{error, info};

use crate::config::{DEFAULT_MODEL, DEFAULT_TEMPLATE_NAME};
use crate::llm::chat::{CompletionClient, CompletionRequest, HttpCompletionClient};
use crate::llm::{ApiKey, ModelRegistry, parse_model_id};
use crate::tasks::{TaskManager, TaskStatus};
use crate::templates::{Template, TemplateCatalog};

/// Marker in a file name identifying an output of a previous run.
const OPTIMIZED_MARKER: &str = "_optimized";

/// Settings for one processor instance.
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    pub template_name: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub output_path: PathBuf,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        ProcessorOptions {
            template_name: DEFAULT_TEMPLATE_NAME.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            output_path: PathBuf::from("output"),
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

/// Aggregate outcome of a directory run.
#[derive(Debug, Default)]
pub struct BatchStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failed_files: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub elapsed: Duration,
}

impl BatchStats {
    pub fn summary(&self) -> String {
        format!(
            "{} attempted, {} succeeded, {} failed, {} skipped in {:.2}s (output: {})",
            self.total,
            self.success,
            self.failed,
            self.skipped,
            self.elapsed.as_secs_f64(),
            self.output_dir.display(),
        )
    }
}

pub struct PromptProcessor {
    api_key: ApiKey,
    options: ProcessorOptions,
    catalog: TemplateCatalog,
    registry: ModelRegistry,
    client: Box<dyn CompletionClient>,
    template: Template,
    tasks: Option<TaskManager>,
    resume: bool,
}

impl PromptProcessor {
    /// Build a processor, failing fast when neither the requested template
    /// nor the `standard` fallback loads.
    pub fn new(
        api_key: ApiKey,
        options: ProcessorOptions,
        mut catalog: TemplateCatalog,
        registry: ModelRegistry,
    ) -> Result<Self> {
        let template = catalog
            .load(&options.template_name)
            .or_else(|| catalog.load(DEFAULT_TEMPLATE_NAME))
            .with_context(|| {
                format!(
                    "no usable template '{}' (or fallback '{}') in {}",
                    options.template_name,
                    DEFAULT_TEMPLATE_NAME,
                    catalog.dir().display()
                )
            })?;
        Ok(PromptProcessor {
            api_key,
            options,
            catalog,
            registry,
            client: Box::new(HttpCompletionClient),
            template,
            tasks: None,
            resume: false,
        })
    }

    /// Replace the completion client (tests, alternative transports).
    pub fn with_client(mut self, client: Box<dyn CompletionClient>) -> Self {
        self.client = client;
        self
    }

    /// Attach a checkpoint manager; `resume` continues the latest unfinished
    /// task over the same input directory.
    pub fn with_tasks(mut self, tasks: TaskManager, resume: bool) -> Self {
        self.tasks = Some(tasks);
        self.resume = resume;
        self
    }

    /// Swap the active template; the current one stays if the load fails.
    pub fn set_template(&mut self, name: &str) -> bool {
        match self.catalog.load(name) {
            Some(template) => {
                self.template = template;
                true
            }
            None => false,
        }
    }

    pub fn active_template(&self) -> &str {
        self.catalog.current_name().unwrap_or(&self.template.name)
    }

    /// Lowest-level operation: dispatch an assembled payload to the resolved
    /// provider. `None` signals failure; the reason is logged.
    pub async fn generate_response(&self, system: &str, user: &str) -> Option<String> {
        let (provider_id, model_name) = match parse_model_id(&self.options.model) {
            Some(parts) => parts,
            None => {
                error!(
                    "invalid model identifier '{}', expected provider/model-name",
                    self.options.model
                );
                return None;
            }
        };
        if !self.registry.contains(provider_id) {
            error!("unknown provider '{}' in model identifier", provider_id);
            return None;
        }

        let request = CompletionRequest {
            provider_id,
            model: model_name,
            system,
            user,
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            timeout_secs: self.options.timeout_secs,
            max_retries: self.options.max_retries,
        };
        match self.client.complete(&request, &self.api_key).await {
            Ok(text) => Some(text),
            Err(e) => {
                error!("completion failed: {}", e);
                None
            }
        }
    }

    /// Run the core sequence for a single string. Pure request/response: no
    /// persistence, `None` on failure.
    pub async fn process_content(&self, content: &str) -> Option<String> {
        let user = self.template.render(content);
        self.generate_response(&self.template.system, &user).await
    }

    /// Process one file into the configured output directory. The output
    /// name derives from the source stem plus a timestamp.
    pub async fn process_file(&self, path: &Path) -> bool {
        let dest = self.single_output_path(path);
        match self.process_into(path, &dest).await {
            Ok(()) => {
                info!("wrote {}", dest.display());
                true
            }
            Err(reason) => {
                error!("failed to process {}: {}", path.display(), reason);
                false
            }
        }
    }

    /// Process every matching file under `dir`, accumulating statistics.
    /// Individual failures are recorded and never abort the walk.
    pub async fn process_directory(
        &mut self,
        dir: &Path,
        recursive: bool,
        extensions: &[String],
    ) -> Result<BatchStats> {
        ensure!(dir.is_dir(), "directory does not exist: {}", dir.display());
        let started = Instant::now();
        let allowed = normalize_extensions(extensions);
        let files = collect_files(dir, recursive);

        // Resume the latest unfinished task over this directory, or start a
        // fresh one.
        let mut skip_done = std::collections::BTreeSet::new();
        let batch_dir;
        if let Some(tasks) = self.tasks.as_mut() {
            let resumed = if self.resume {
                tasks
                    .load_latest()
                    .filter(|t| t.status == TaskStatus::Running && t.input_path == dir)
                    .cloned()
            } else {
                None
            };
            match resumed {
                Some(task) => {
                    info!(
                        "resuming task {} ({} of {} files remaining)",
                        task.task_id,
                        task.unfinished_files(&files).len(),
                        files.len()
                    );
                    skip_done = task.processed.clone();
                    batch_dir = task.output_path.clone();
                }
                None => {
                    batch_dir = self
                        .options
                        .output_path
                        .join(Local::now().format("%Y%m%d-%H%M%S").to_string());
                    tasks.create_task(dir, &batch_dir);
                }
            }
        } else {
            batch_dir = self
                .options
                .output_path
                .join(Local::now().format("%Y%m%d-%H%M%S").to_string());
        }

        let mut stats = BatchStats {
            output_dir: batch_dir.clone(),
            ..BatchStats::default()
        };

        for file in files {
            let name = file.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !matches_extensions(&file, &allowed) {
                stats.skipped += 1;
                continue;
            }
            if name.contains(OPTIMIZED_MARKER) {
                stats.skipped += 1;
                if let Some(tasks) = self.tasks.as_mut() {
                    tasks.skip_file(&file);
                }
                continue;
            }
            if skip_done.contains(&file) {
                stats.skipped += 1;
                continue;
            }

            stats.total += 1;
            let rel = file.strip_prefix(dir).unwrap_or(&file);
            let dest = batch_dir.join(rel);
            let outcome = self.process_into(&file, &dest).await;
            let success = outcome.is_ok();
            if let Err(reason) = outcome {
                error!("failed to process {}: {}", file.display(), reason);
                stats.failed += 1;
                stats.failed_files.push(file.clone());
            } else {
                stats.success += 1;
            }
            if let Some(tasks) = self.tasks.as_mut() {
                tasks.update_progress(&file, success);
            }
        }

        stats.elapsed = started.elapsed();

        if let Some(tasks) = self.tasks.as_mut() {
            if stats.total > 0 && stats.success == 0 {
                tasks.fail_task();
            } else {
                tasks.complete_task();
            }
            tasks.write_report(&stats.summary());
        }

        info!("batch finished: {}", stats.summary());
        Ok(stats)
    }

    /// Core per-file sequence shared by single-file and batch mode.
    async fn process_into(&self, src: &Path, dest: &Path) -> std::result::Result<(), String> {
        let content = fs::read_to_string(src)
            .map_err(|e| format!("cannot read source file: {}", e))?;
        let result = self
            .process_content(&content)
            .await
            .ok_or_else(|| "model call failed".to_string())?;
        self.write_output(src, dest, &result)
    }

    /// Write a completion with its one-line provenance header.
    fn write_output(&self, src: &Path, dest: &Path, result: &str) -> std::result::Result<(), String> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("cannot create output directory: {}", e))?;
        }
        let header = format!(
            "<!-- source: {} | model: {} | generated: {} -->\n\n",
            src.display(),
            self.options.model,
            Utc::now().to_rfc3339(),
        );
        fs::write(dest, format!("{}{}", header, result))
            .map_err(|e| format!("cannot write output file: {}", e))
    }

    /// Output path for single-file mode: `<output>/<stem>-<timestamp>.<ext>`.
    fn single_output_path(&self, src: &Path) -> PathBuf {
        let stem = src
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let timestamp = Local::now().format("%Y%m%d-%H%M%S");
        let name = match src.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}-{}.{}", stem, timestamp, ext),
            None => format!("{}-{}", stem, timestamp),
        };
        self.options.output_path.join(name)
    }
}

/// Lowercase every allowed extension and make sure it carries its dot.
fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|e| {
            let e = e.trim().to_lowercase();
            if e.starts_with('.') { e } else { format!(".{}", e) }
        })
        .filter(|e| e.len() > 1)
        .collect()
}

/// An empty allow-list means every file matches.
fn matches_extensions(path: &Path, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => allowed.iter().any(|a| a == &format!(".{}", ext.to_lowercase())),
        None => false,
    }
}

/// All files under `root`, sorted lexicographically by path so repeated runs
/// visit them in the same order.
fn collect_files(root: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!("cannot read directory {}: {}", dir.display(), e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Error;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const TEMPLATE: &str =
        "## System Message\nYou optimize prompts.\n\n## User Message\nImprove:\n{PROMPT}\n";

    /// Uppercases the rendered user message, or fails on demand.
    struct StubClient {
        fail: bool,
    }

    #[async_trait]
    impl CompletionClient for StubClient {
        async fn complete(
            &self,
            request: &CompletionRequest<'_>,
            _api_key: &ApiKey,
        ) -> Result<String, Error> {
            if self.fail {
                Err(Error::new(request.provider_id, "simulated failure"))
            } else {
                Ok(request.user.to_uppercase())
            }
        }
    }

    fn make_processor(tmp: &TempDir, fail: bool) -> PromptProcessor {
        let templates = tmp.path().join("templates");
        fs::create_dir_all(&templates).unwrap();
        fs::write(templates.join("standard.txt"), TEMPLATE).unwrap();

        let options = ProcessorOptions {
            output_path: tmp.path().join("output"),
            ..ProcessorOptions::default()
        };
        let catalog = TemplateCatalog::new(&templates);
        let registry = ModelRegistry::with_default_providers(tmp.path().join("cache"));
        PromptProcessor::new(ApiKey::new("test-key"), options, catalog, registry)
            .unwrap()
            .with_client(Box::new(StubClient { fail }))
    }

    #[tokio::test]
    async fn process_content_returns_completion() {
        let tmp = TempDir::new().unwrap();
        let processor = make_processor(&tmp, false);

        let result = processor.process_content("hello").await.unwrap();
        assert_eq!(result, "IMPROVE:\nHELLO");
    }

    #[tokio::test]
    async fn process_content_failure_is_none() {
        let tmp = TempDir::new().unwrap();
        let processor = make_processor(&tmp, true);
        assert!(processor.process_content("hello").await.is_none());
    }

    #[tokio::test]
    async fn invalid_model_id_is_failure_not_panic() {
        let tmp = TempDir::new().unwrap();
        let mut processor = make_processor(&tmp, false);
        processor.options.model = "no-separator".to_string();
        assert!(processor.process_content("hello").await.is_none());

        processor.options.model = "unknown/model".to_string();
        assert!(processor.process_content("hello").await.is_none());
    }

    #[tokio::test]
    async fn process_file_writes_provenance_header() {
        let tmp = TempDir::new().unwrap();
        let processor = make_processor(&tmp, false);
        let src = tmp.path().join("note.md");
        fs::write(&src, "hello").unwrap();

        assert!(processor.process_file(&src).await);

        let outputs = collect_files(&tmp.path().join("output"), true);
        assert_eq!(outputs.len(), 1);
        let content = fs::read_to_string(&outputs[0]).unwrap();
        assert!(content.contains("source: "));
        assert!(content.contains("note.md"));
        assert!(content.contains("model: deepseek/deepseek-chat"));
        assert!(content.contains("IMPROVE:\nHELLO"));
    }

    #[tokio::test]
    async fn directory_filters_extensions_and_counts() {
        let tmp = TempDir::new().unwrap();
        let mut processor = make_processor(&tmp, false);
        let input = tmp.path().join("input");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("a.md"), "one").unwrap();
        fs::write(input.join("b.txt"), "two").unwrap();
        fs::write(input.join("c.png"), "bytes").unwrap();

        let extensions = vec![".md".to_string(), ".txt".to_string()];
        let stats = processor
            .process_directory(&input, true, &extensions)
            .await
            .unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn directory_failures_do_not_abort_batch() {
        let tmp = TempDir::new().unwrap();
        let mut processor = make_processor(&tmp, true);
        let input = tmp.path().join("input");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("a.md"), "one").unwrap();
        fs::write(input.join("b.md"), "two").unwrap();

        let stats = processor
            .process_directory(&input, true, &[".md".to_string()])
            .await
            .unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.failed_files.len(), 2);
    }

    #[tokio::test]
    async fn directory_preserves_relative_layout() {
        let tmp = TempDir::new().unwrap();
        let mut processor = make_processor(&tmp, false);
        let input = tmp.path().join("input");
        fs::create_dir_all(input.join("sub")).unwrap();
        fs::write(input.join("top.md"), "top").unwrap();
        fs::write(input.join("sub/nested.md"), "nested").unwrap();

        let stats = processor
            .process_directory(&input, true, &[".md".to_string()])
            .await
            .unwrap();

        assert_eq!(stats.success, 2);
        assert!(stats.output_dir.join("top.md").exists());
        assert!(stats.output_dir.join("sub/nested.md").exists());
    }

    #[tokio::test]
    async fn non_recursive_skips_subdirectories() {
        let tmp = TempDir::new().unwrap();
        let mut processor = make_processor(&tmp, false);
        let input = tmp.path().join("input");
        fs::create_dir_all(input.join("sub")).unwrap();
        fs::write(input.join("top.md"), "top").unwrap();
        fs::write(input.join("sub/nested.md"), "nested").unwrap();

        let stats = processor
            .process_directory(&input, false, &[".md".to_string()])
            .await
            .unwrap();

        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut processor = make_processor(&tmp, false);
        let result = processor
            .process_directory(&tmp.path().join("nope"), true, &[])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn resume_skips_already_processed_files() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("input");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("a.md"), "one").unwrap();
        fs::write(input.join("b.md"), "two").unwrap();
        let checkpoints = tmp.path().join("checkpoints");

        // Simulate an interrupted run that already handled a.md.
        let mut manager = TaskManager::new(&checkpoints);
        manager.create_task(&input, &tmp.path().join("output/old-batch"));
        manager.update_progress(&input.join("a.md"), true);

        let mut processor = make_processor(&tmp, false)
            .with_tasks(TaskManager::new(&checkpoints), true);
        let stats = processor
            .process_directory(&input, true, &[".md".to_string()])
            .await
            .unwrap();

        assert_eq!(stats.total, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.output_dir, tmp.path().join("output/old-batch"));
    }

    #[test]
    fn set_template_swaps_only_on_success() {
        let tmp = TempDir::new().unwrap();
        let mut processor = make_processor(&tmp, false);
        fs::write(tmp.path().join("templates/concise.txt"), TEMPLATE).unwrap();

        assert!(processor.set_template("concise"));
        assert_eq!(processor.active_template(), "concise");

        assert!(!processor.set_template("missing"));
        assert_eq!(processor.active_template(), "concise");
    }

    #[test]
    fn missing_template_fails_construction() {
        let tmp = TempDir::new().unwrap();
        let templates = tmp.path().join("templates");
        fs::create_dir_all(&templates).unwrap();

        let catalog = TemplateCatalog::new(&templates);
        let registry = ModelRegistry::with_default_providers(tmp.path().join("cache"));
        let result = PromptProcessor::new(
            ApiKey::new("k"),
            ProcessorOptions::default(),
            catalog,
            registry,
        );
        assert!(result.is_err());
    }

    #[test]
    fn extension_normalization() {
        let allowed = normalize_extensions(&["md".to_string(), " .TXT ".to_string()]);
        assert_eq!(allowed, vec![".md", ".txt"]);

        assert!(matches_extensions(Path::new("a.md"), &allowed));
        assert!(matches_extensions(Path::new("b.TXT"), &allowed));
        assert!(!matches_extensions(Path::new("c.png"), &allowed));
        assert!(!matches_extensions(Path::new("no_extension"), &allowed));
        assert!(matches_extensions(Path::new("anything.bin"), &[]));
    }

    #[test]
    fn collected_files_are_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("z")).unwrap();
        fs::write(tmp.path().join("b.md"), "").unwrap();
        fs::write(tmp.path().join("a.md"), "").unwrap();
        fs::write(tmp.path().join("z/c.md"), "").unwrap();

        let files = collect_files(tmp.path(), true);
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.md", "b.md", "z/c.md"]);
    }
}
