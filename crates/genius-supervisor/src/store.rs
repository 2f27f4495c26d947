use crate::types::Workflow;
use async_trait::async_trait;
use genius_core::{GeniusError, GeniusResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Workflow records keyed by id, partitioned into active and terminal sets.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert or replace a record, moving it to the partition matching its status.
    async fn put(&self, workflow: &Workflow) -> GeniusResult<()>;
    async fn get(&self, id: Uuid) -> GeniusResult<Option<Workflow>>;
    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> GeniusResult<bool>;
    async fn list_active(&self) -> GeniusResult<Vec<Uuid>>;
    async fn list_terminal(&self) -> GeniusResult<Vec<Uuid>>;
}

#[derive(Default)]
struct Partitions {
    active: HashMap<Uuid, Workflow>,
    terminal: HashMap<Uuid, Workflow>,
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    inner: RwLock<Partitions>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_ids<'a>(records: impl Iterator<Item = &'a Workflow>) -> Vec<Uuid> {
    let mut list: Vec<&Workflow> = records.collect();
    list.sort_by_key(|w| w.created_at);
    list.into_iter().map(|w| w.id).collect()
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn put(&self, workflow: &Workflow) -> GeniusResult<()> {
        let mut inner = self.inner.write().await;
        if workflow.status.is_terminal() {
            inner.active.remove(&workflow.id);
            inner.terminal.insert(workflow.id, workflow.clone());
        } else {
            inner.terminal.remove(&workflow.id);
            inner.active.insert(workflow.id, workflow.clone());
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> GeniusResult<Option<Workflow>> {
        let inner = self.inner.read().await;
        Ok(inner
            .active
            .get(&id)
            .or_else(|| inner.terminal.get(&id))
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> GeniusResult<bool> {
        let mut inner = self.inner.write().await;
        let removed = inner.active.remove(&id).is_some() | inner.terminal.remove(&id).is_some();
        Ok(removed)
    }

    async fn list_active(&self) -> GeniusResult<Vec<Uuid>> {
        Ok(sorted_ids(self.inner.read().await.active.values()))
    }

    async fn list_terminal(&self) -> GeniusResult<Vec<Uuid>> {
        Ok(sorted_ids(self.inner.read().await.terminal.values()))
    }
}

/// One JSON file per workflow under `active/` or `terminal/`.
///
/// Moving a record between partitions takes two filesystem steps, so writers
/// hold `lock` exclusively and readers share it.
pub struct FileWorkflowStore {
    active_dir: PathBuf,
    terminal_dir: PathBuf,
    lock: RwLock<()>,
}

impl FileWorkflowStore {
    pub async fn new(dir: PathBuf) -> GeniusResult<Self> {
        let active_dir = dir.join("active");
        let terminal_dir = dir.join("terminal");
        tokio::fs::create_dir_all(&active_dir).await?;
        tokio::fs::create_dir_all(&terminal_dir).await?;
        Ok(Self {
            active_dir,
            terminal_dir,
            lock: RwLock::new(()),
        })
    }

    fn file_name(id: Uuid) -> String {
        format!("{id}.json")
    }

    async fn read(path: PathBuf) -> GeniusResult<Option<Workflow>> {
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let workflow = serde_json::from_str(&data)
            .map_err(|e| GeniusError::Store(format!("Failed to parse workflow record: {e}")))?;
        Ok(Some(workflow))
    }

    async fn remove_if_present(path: PathBuf) -> GeniusResult<bool> {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_dir(dir: &Path) -> GeniusResult<Vec<Uuid>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl WorkflowStore for FileWorkflowStore {
    async fn put(&self, workflow: &Workflow) -> GeniusResult<()> {
        let name = Self::file_name(workflow.id);
        let (target, other) = if workflow.status.is_terminal() {
            (&self.terminal_dir, &self.active_dir)
        } else {
            (&self.active_dir, &self.terminal_dir)
        };
        let json = serde_json::to_string_pretty(workflow)?;
        let _guard = self.lock.write().await;
        let tmp = target.join(format!("{name}.tmp"));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, target.join(&name)).await?;
        Self::remove_if_present(other.join(&name)).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> GeniusResult<Option<Workflow>> {
        let name = Self::file_name(id);
        let _guard = self.lock.read().await;
        if let Some(wf) = Self::read(self.active_dir.join(&name)).await? {
            return Ok(Some(wf));
        }
        Self::read(self.terminal_dir.join(&name)).await
    }

    async fn delete(&self, id: Uuid) -> GeniusResult<bool> {
        let name = Self::file_name(id);
        let _guard = self.lock.write().await;
        let active = Self::remove_if_present(self.active_dir.join(&name)).await?;
        let terminal = Self::remove_if_present(self.terminal_dir.join(&name)).await?;
        Ok(active || terminal)
    }

    async fn list_active(&self) -> GeniusResult<Vec<Uuid>> {
        let _guard = self.lock.read().await;
        Self::list_dir(&self.active_dir).await
    }

    async fn list_terminal(&self) -> GeniusResult<Vec<Uuid>> {
        let _guard = self.lock.read().await;
        Self::list_dir(&self.terminal_dir).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{WorkflowOptions, WorkflowStatus};

    fn workflow() -> Workflow {
        Workflow::new(
            "https://github.com/octocat/Hello-World",
            5,
            WorkflowOptions::default(),
            |_| 3,
        )
    }

    #[tokio::test]
    async fn test_memory_store_partitions_by_status() {
        let store = InMemoryWorkflowStore::new();
        let mut wf = workflow();
        store.put(&wf).await.unwrap();
        assert_eq!(store.list_active().await.unwrap(), vec![wf.id]);
        assert!(store.list_terminal().await.unwrap().is_empty());

        wf.finish(WorkflowStatus::Failed, Some("boom".into()));
        store.put(&wf).await.unwrap();
        assert!(store.list_active().await.unwrap().is_empty());
        assert_eq!(store.list_terminal().await.unwrap(), vec![wf.id]);

        let loaded = store.get(wf.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_memory_store_delete() {
        let store = InMemoryWorkflowStore::new();
        let wf = workflow();
        store.put(&wf).await.unwrap();
        assert!(store.delete(wf.id).await.unwrap());
        assert!(!store.delete(wf.id).await.unwrap());
        assert!(store.get(wf.id).await.unwrap().is_none());
    }
}
