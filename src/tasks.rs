//! # Batch Task Checkpoints
//!
//! Persists the progress of a batch run as JSON after every file so an
//! interrupted run can resume with only its unfinished files. Each task also
//! gets a plain-text report next to its checkpoint when it ends.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

/// Resumable record of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default)]
    pub processed: BTreeSet<PathBuf>,
    #[serde(default)]
    pub failed: BTreeSet<PathBuf>,
    #[serde(default)]
    pub skipped: BTreeSet<PathBuf>,
    pub status: TaskStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskState {
    fn new(input_path: &Path, output_path: &Path) -> Self {
        let now = Local::now();
        TaskState {
            task_id: now.format("task-%Y%m%d-%H%M%S").to_string(),
            input_path: input_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            processed: BTreeSet::new(),
            failed: BTreeSet::new(),
            skipped: BTreeSet::new(),
            status: TaskStatus::Running,
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
        }
    }

    /// Files from `all` not yet touched by this task.
    pub fn unfinished_files(&self, all: &[PathBuf]) -> Vec<PathBuf> {
        all.iter()
            .filter(|p| !self.processed.contains(*p) && !self.skipped.contains(*p))
            .cloned()
            .collect()
    }
}

/// Manages checkpoints under a directory; holds at most one current task.
pub struct TaskManager {
    checkpoint_dir: PathBuf,
    current: Option<TaskState>,
}

impl TaskManager {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        TaskManager {
            checkpoint_dir: checkpoint_dir.into(),
            current: None,
        }
    }

    pub fn current(&self) -> Option<&TaskState> {
        self.current.as_ref()
    }

    /// Start a new task and write its first checkpoint.
    pub fn create_task(&mut self, input_path: &Path, output_path: &Path) -> &TaskState {
        self.current = Some(TaskState::new(input_path, output_path));
        self.save_checkpoint();
        self.current.as_ref().expect("task just created")
    }

    /// Load the most recently updated checkpoint, if any, as the current
    /// task.
    pub fn load_latest(&mut self) -> Option<&TaskState> {
        let entries = fs::read_dir(&self.checkpoint_dir).ok()?;
        let mut latest: Option<TaskState> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !file_name.starts_with("checkpoint_") || !file_name.ends_with(".json") {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            match serde_json::from_str::<TaskState>(&content) {
                Ok(state) => {
                    let newer = latest
                        .as_ref()
                        .map(|l| state.updated_at > l.updated_at)
                        .unwrap_or(true);
                    if newer {
                        latest = Some(state);
                    }
                }
                Err(e) => warn!("skipping unreadable checkpoint {}: {}", path.display(), e),
            }
        }
        self.current = latest;
        self.current.as_ref()
    }

    /// Record one file's outcome and checkpoint.
    pub fn update_progress(&mut self, file: &Path, success: bool) {
        if let Some(task) = self.current.as_mut() {
            task.processed.insert(file.to_path_buf());
            if !success {
                task.failed.insert(file.to_path_buf());
            }
            task.updated_at = Local::now().to_rfc3339();
        }
        self.save_checkpoint();
    }

    /// Record a file that was skipped rather than attempted.
    pub fn skip_file(&mut self, file: &Path) {
        if let Some(task) = self.current.as_mut() {
            task.skipped.insert(file.to_path_buf());
            task.updated_at = Local::now().to_rfc3339();
        }
        self.save_checkpoint();
    }

    pub fn complete_task(&mut self) {
        self.finish(TaskStatus::Completed);
    }

    pub fn fail_task(&mut self) {
        self.finish(TaskStatus::Failed);
    }

    fn finish(&mut self, status: TaskStatus) {
        if let Some(task) = self.current.as_mut() {
            task.status = status;
            task.updated_at = Local::now().to_rfc3339();
        }
        self.save_checkpoint();
    }

    fn checkpoint_path(&self, task_id: &str) -> PathBuf {
        self.checkpoint_dir.join(format!("checkpoint_{}.json", task_id))
    }

    /// Persist the current task. Failures are logged, not fatal: losing a
    /// checkpoint only costs resumability.
    pub fn save_checkpoint(&self) -> bool {
        let Some(task) = self.current.as_ref() else {
            return false;
        };
        if let Err(e) = fs::create_dir_all(&self.checkpoint_dir) {
            warn!("cannot create checkpoint directory {}: {}", self.checkpoint_dir.display(), e);
            return false;
        }
        let path = self.checkpoint_path(&task.task_id);
        match serde_json::to_string_pretty(task) {
            Ok(content) => match fs::write(&path, content) {
                Ok(()) => true,
                Err(e) => {
                    warn!("failed to write checkpoint {}: {}", path.display(), e);
                    false
                }
            },
            Err(e) => {
                warn!("failed to serialize checkpoint: {}", e);
                false
            }
        }
    }

    /// Write a plain-text report for the current task next to its
    /// checkpoint. Returns the report path when written.
    pub fn write_report(&self, summary: &str) -> Option<PathBuf> {
        let task = self.current.as_ref()?;
        let path = self.checkpoint_dir.join(format!("report_{}.txt", task.task_id));
        let mut content = String::new();
        content.push_str(&format!("Task:    {}\n", task.task_id));
        content.push_str(&format!("Input:   {}\n", task.input_path.display()));
        content.push_str(&format!("Output:  {}\n", task.output_path.display()));
        content.push_str(&format!("Status:  {:?}\n", task.status));
        content.push_str(&format!("Updated: {}\n\n", task.updated_at));
        content.push_str(summary);
        content.push('\n');
        if !task.failed.is_empty() {
            content.push_str("\nFailed files:\n");
            for file in &task.failed {
                content.push_str(&format!("  {}\n", file.display()));
            }
        }
        match fs::write(&path, content) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("failed to write report {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn checkpoint_round_trip() {
        let tmp = TempDir::new().unwrap();
        let mut manager = TaskManager::new(tmp.path());

        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        let task_id = manager.create_task(&input, &output).task_id.clone();
        manager.update_progress(&input.join("a.md"), true);
        manager.update_progress(&input.join("b.md"), false);
        manager.skip_file(&input.join("c.png"));

        let mut fresh = TaskManager::new(tmp.path());
        let loaded = fresh.load_latest().unwrap();
        assert_eq!(loaded.task_id, task_id);
        assert_eq!(loaded.processed.len(), 2);
        assert_eq!(loaded.failed.len(), 1);
        assert_eq!(loaded.skipped.len(), 1);
        assert_eq!(loaded.status, TaskStatus::Running);
    }

    #[test]
    fn unfinished_files_excludes_touched_paths() {
        let tmp = TempDir::new().unwrap();
        let mut manager = TaskManager::new(tmp.path());
        manager.create_task(Path::new("in"), Path::new("out"));
        manager.update_progress(Path::new("in/a.md"), true);
        manager.skip_file(Path::new("in/b.md"));

        let all = vec![
            PathBuf::from("in/a.md"),
            PathBuf::from("in/b.md"),
            PathBuf::from("in/c.md"),
        ];
        let unfinished = manager.current().unwrap().unfinished_files(&all);
        assert_eq!(unfinished, vec![PathBuf::from("in/c.md")]);
    }

    #[test]
    fn complete_marks_status() {
        let tmp = TempDir::new().unwrap();
        let mut manager = TaskManager::new(tmp.path());
        manager.create_task(Path::new("in"), Path::new("out"));
        manager.complete_task();

        let mut fresh = TaskManager::new(tmp.path());
        assert_eq!(fresh.load_latest().unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn load_latest_without_checkpoints_is_none() {
        let tmp = TempDir::new().unwrap();
        let mut manager = TaskManager::new(tmp.path().join("empty"));
        assert!(manager.load_latest().is_none());
    }

    #[test]
    fn report_lists_failed_files() {
        let tmp = TempDir::new().unwrap();
        let mut manager = TaskManager::new(tmp.path());
        manager.create_task(Path::new("in"), Path::new("out"));
        manager.update_progress(Path::new("in/bad.md"), false);

        let report = manager.write_report("1 file attempted").unwrap();
        let content = fs::read_to_string(report).unwrap();
        assert!(content.contains("1 file attempted"));
        assert!(content.contains("bad.md"));
    }
}
