use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use staff_map_core::types::JobProgress;
use staff_map_remote::SheetRow;
use staff_map_storage::{Database, EmployeeError};

use crate::progress::JobProgressRegistry;

/// Runs sheet enrichment jobs as detached background tasks.
///
/// Each job cross-references stored employee ids against sheet rows and
/// updates department/position assignments. Enrichment deliberately does
/// not refresh the map cache; changes become visible on the next manual or
/// sync-triggered rebuild.
#[derive(Clone)]
pub struct EnrichRunner {
    database: Database,
    registry: JobProgressRegistry,
    step_delay: Duration,
    cleanup_grace: Duration,
}

impl EnrichRunner {
    pub fn new(
        database: Database,
        registry: JobProgressRegistry,
        step_delay: Duration,
        cleanup_grace: Duration,
    ) -> Self {
        Self {
            database,
            registry,
            step_delay,
            cleanup_grace,
        }
    }

    /// Spawns one enrichment job over the given ids and sheet rows.
    pub fn spawn(&self, ids: Vec<i64>, rows: Vec<SheetRow>, task_id: String) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(ids, rows, task_id).await })
    }

    pub(crate) async fn run(self, ids: Vec<i64>, rows: Vec<SheetRow>, task_id: String) {
        info!(
            stage = "enrich",
            task = %task_id,
            ids = ids.len(),
            rows = rows.len(),
            "starting sheet enrichment job"
        );
        let mut progress = self
            .registry
            .get(&task_id)
            .await
            .unwrap_or_else(|| JobProgress::started(Some(ids.len() as u64)));

        match self.apply_rows(&ids, &rows, &task_id, &mut progress).await {
            Ok(updated) => {
                counter!("enrich_rows_updated_total").increment(updated);
                progress.complete(format!("updated {updated} records"));
                info!(stage = "enrich", task = %task_id, updated, "sheet enrichment finished");
            }
            Err(err) => {
                progress.fail(err.to_string());
                error!(stage = "enrich", task = %task_id, error = %err, "sheet enrichment failed");
            }
        }
        self.registry.set(&task_id, &progress).await;

        tokio::time::sleep(self.cleanup_grace).await;
        self.registry.remove(&task_id).await;
        debug!(stage = "enrich", task = %task_id, "progress entry removed");
    }

    /// Applies matching sheet rows in id order.
    ///
    /// A storage failure halts the loop; already committed updates are kept.
    async fn apply_rows(
        &self,
        ids: &[i64],
        rows: &[SheetRow],
        task_id: &str,
        progress: &mut JobProgress,
    ) -> Result<u64, EmployeeError> {
        let employees = self.database.employees();
        let mut updated = 0u64;

        for (index, user_id) in ids.iter().enumerate() {
            if let Some(row) = rows.iter().find(|row| row.id == *user_id) {
                employees
                    .update_assignment(*user_id, &row.department, &row.position)
                    .await?;
                updated += 1;
                debug!(stage = "enrich", task = %task_id, user = user_id, "assignment updated");
            }
            progress.processed = (index + 1) as u64;
            progress.updated = updated;
            self.registry.set(task_id, progress).await;
            tokio::time::sleep(self.step_delay).await;
        }

        Ok(updated)
    }
}
