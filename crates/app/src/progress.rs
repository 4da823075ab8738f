use tracing::warn;

use staff_map_core::types::JobProgress;

use crate::cache::SharedCache;

/// Typed view over the shared cache for job progress snapshots.
///
/// Both job runners and the polling handlers go through this registry so
/// they observe the same state regardless of where the job executes.
#[derive(Clone)]
pub struct JobProgressRegistry {
    cache: SharedCache,
}

impl JobProgressRegistry {
    pub fn new(cache: SharedCache) -> Self {
        Self { cache }
    }

    fn key(task_id: &str) -> String {
        format!("job:{task_id}")
    }

    /// Stores the snapshot for the given task id.
    pub async fn set(&self, task_id: &str, progress: &JobProgress) {
        match serde_json::to_string(progress) {
            Ok(payload) => self.cache.set(Self::key(task_id), payload).await,
            Err(err) => {
                warn!(stage = "jobs", task = %task_id, error = %err, "failed to encode progress snapshot")
            }
        }
    }

    /// Returns the snapshot for the given task id, if present and decodable.
    pub async fn get(&self, task_id: &str) -> Option<JobProgress> {
        let payload = self.cache.get(&Self::key(task_id)).await?;
        match serde_json::from_str(&payload) {
            Ok(progress) => Some(progress),
            Err(err) => {
                warn!(stage = "jobs", task = %task_id, error = %err, "failed to decode progress snapshot");
                None
            }
        }
    }

    /// Removes the snapshot for the given task id.
    pub async fn remove(&self, task_id: &str) {
        self.cache.remove(&Self::key(task_id)).await;
    }
}
