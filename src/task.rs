use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::Result;

/// Progress sink for the pipeline. Calls are fire-and-forget: implementations
/// handle their own persistence failures.
#[async_trait]
pub trait ProgressTracker: Send + Sync {
    async fn report_status(&self, task_id: &str, status: &str, progress: u8);

    /// Shallow merge of `fields` into the task record
    async fn report_metadata(&self, task_id: &str, fields: Map<String, Value>);
}

/// Persisted state of one task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl TaskRecord {
    pub fn unknown() -> Self {
        Self {
            status: "unknown".to_string(),
            ..Default::default()
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    fn merge(&mut self, fields: Map<String, Value>) {
        for (key, value) in fields {
            match key.as_str() {
                "status" => {
                    if let Some(status) = value.as_str() {
                        self.status = status.to_string();
                    }
                }
                "progress" => {
                    if let Some(progress) = value.as_u64() {
                        self.progress = progress.min(100) as u8;
                    }
                }
                _ => {
                    self.metadata.insert(key, value);
                }
            }
        }
    }
}

/// Task records kept in memory and mirrored to a JSON file after every update
pub struct TaskStore {
    path: PathBuf,
    tasks: RwLock<HashMap<String, TaskRecord>>,
}

impl TaskStore {
    /// Open the store; a missing or unreadable file starts empty
    pub async fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let tasks = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(tasks) => tasks,
                Err(e) => {
                    error!("Failed to load tasks from {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                error!("Failed to load tasks from {}: {}", path.display(), e);
                HashMap::new()
            }
        };

        Self {
            path,
            tasks: RwLock::new(tasks),
        }
    }

    /// Register a new task for an uploaded file and return its id
    pub async fn create_task(&self, filename: &str, file_path: &Path) -> String {
        let task_id = Uuid::new_v4().to_string();
        let mut fields = Map::new();
        fields.insert("filename".to_string(), Value::from(filename));
        fields.insert("file_path".to_string(), Value::from(file_path.to_string_lossy().into_owned()));
        self.report_metadata(&task_id, fields).await;
        self.report_status(&task_id, "Uploading...", 0).await;
        task_id
    }

    pub async fn get_task(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.read().await.get(task_id).cloned()
    }

    /// Like `get_task`, but unknown ids report `unknown` at 0%
    pub async fn get_task_status(&self, task_id: &str) -> TaskRecord {
        self.get_task(task_id).await.unwrap_or_else(TaskRecord::unknown)
    }

    async fn update<F>(&self, task_id: &str, apply: F)
    where
        F: FnOnce(&mut TaskRecord),
    {
        // The write guard is held across the save so snapshots hit disk in order
        let mut tasks = self.tasks.write().await;
        let record = tasks.entry(task_id.to_string()).or_default();
        apply(record);
        record.updated_at = Some(Utc::now());

        match serde_json::to_string_pretty(&*tasks) {
            Ok(content) => {
                if let Err(e) = self.save(&content).await {
                    error!("Failed to save tasks: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize tasks: {}", e),
        }
    }

    async fn save(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ProgressTracker for TaskStore {
    async fn report_status(&self, task_id: &str, status: &str, progress: u8) {
        debug!("Task {}: {} ({}%)", task_id, status, progress);
        let progress = if progress > 100 {
            warn!("Clamping progress {} to 100", progress);
            100
        } else {
            progress
        };
        self.update(task_id, |record| {
            record.status = status.to_string();
            record.progress = progress;
        })
        .await;
    }

    async fn report_metadata(&self, task_id: &str, fields: Map<String, Value>) {
        self.update(task_id, |record| record.merge(fields)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_status_and_metadata_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");

        let store = TaskStore::open(&path).await;
        store.report_metadata("t1", fields(json!({"file_path": "/v.mkv", "streams": []}))).await;
        store.report_status("t1", "Splitting Audio...", 20).await;
        store.report_metadata("t1", fields(json!({"needs_selection": false}))).await;

        let reopened = TaskStore::open(&path).await;
        let record = reopened.get_task("t1").await.unwrap();
        assert_eq!(record.status, "Splitting Audio...");
        assert_eq!(record.progress, 20);
        assert_eq!(record.get_str("file_path"), Some("/v.mkv"));
        assert_eq!(record.metadata.get("needs_selection"), Some(&json!(false)));
        assert!(record.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_metadata_merge_is_shallow() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(dir.path().join("tasks.json")).await;
        store.report_metadata("t", fields(json!({"a": {"x": 1}, "b": 1}))).await;
        store.report_metadata("t", fields(json!({"a": {"y": 2}}))).await;

        let record = store.get_task("t").await.unwrap();
        assert_eq!(record.metadata.get("a"), Some(&json!({"y": 2})));
        assert_eq!(record.metadata.get("b"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_unknown_task_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(dir.path().join("tasks.json")).await;
        let record = store.get_task_status("missing").await;
        assert_eq!(record.status, "unknown");
        assert_eq!(record.progress, 0);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = TaskStore::open(&path).await;
        assert!(store.get_task("anything").await.is_none());
        store.report_status("t", "Analyzing...", 0).await;
        assert_eq!(TaskStore::open(&path).await.get_task_status("t").await.status, "Analyzing...");
    }

    #[tokio::test]
    async fn test_create_task_registers_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(dir.path().join("tasks.json")).await;
        let id = store.create_task("Episode 01.mkv", Path::new("/uploads/Episode 01.mkv")).await;

        let record = store.get_task(&id).await.unwrap();
        assert_eq!(record.status, "Uploading...");
        assert_eq!(record.get_str("filename"), Some("Episode 01.mkv"));
    }
}
