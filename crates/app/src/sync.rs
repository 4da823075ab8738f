use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use staff_map_core::types::JobProgress;

use crate::mapcache::MapCacheService;
use crate::progress::JobProgressRegistry;
use crate::roster::EmployeeDirectory;

/// Rejected id ranges never reach the runner; this is the single
/// synchronous validation boundary of the pipeline.
#[derive(Debug, Error)]
pub enum RangeError {
    #[error("invalid id range {start_id}-{end_id}")]
    Invalid { start_id: i64, end_id: i64 },
}

/// Validates an inclusive directory id range before a job is scheduled.
pub fn validate_range(start_id: i64, end_id: i64) -> Result<(), RangeError> {
    if start_id < 1 || end_id < start_id {
        return Err(RangeError::Invalid { start_id, end_id });
    }
    Ok(())
}

/// Runs directory sync jobs as detached background tasks.
///
/// Each job walks an id range through [`EmployeeDirectory::get_or_fetch`],
/// reporting progress into the shared registry after every id. A fixed
/// per-id delay throttles the external directory. Jobs are not cancellable;
/// callers observe them through the registry until the entry expires.
#[derive(Clone)]
pub struct SyncRunner {
    roster: EmployeeDirectory,
    registry: JobProgressRegistry,
    map_cache: MapCacheService,
    step_delay: Duration,
    cleanup_grace: Duration,
}

impl SyncRunner {
    pub fn new(
        roster: EmployeeDirectory,
        registry: JobProgressRegistry,
        map_cache: MapCacheService,
        step_delay: Duration,
        cleanup_grace: Duration,
    ) -> Self {
        Self {
            roster,
            registry,
            map_cache,
            step_delay,
            cleanup_grace,
        }
    }

    /// Spawns one sync job; the caller must have validated the range.
    pub fn spawn(&self, start_id: i64, end_id: i64, task_id: String) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(start_id, end_id, task_id).await })
    }

    pub(crate) async fn run(self, start_id: i64, end_id: i64, task_id: String) {
        info!(
            stage = "sync",
            task = %task_id,
            start_id,
            end_id,
            "starting directory sync job"
        );
        let mut progress = JobProgress::started(None);
        self.registry.set(&task_id, &progress).await;

        let mut added = 0u64;
        for user_id in start_id..=end_id {
            if let Some(envelope) = self.roster.get_or_fetch(user_id).await {
                if envelope.user.mail_in_domain(self.roster.email_domain()) {
                    added += 1;
                }
            }
            progress.processed += 1;
            progress.updated = added;
            self.registry.set(&task_id, &progress).await;
            debug!(
                stage = "sync",
                task = %task_id,
                user = user_id,
                processed = progress.processed,
                added,
                "processed directory id"
            );
            tokio::time::sleep(self.step_delay).await;
        }

        info!(
            stage = "sync",
            task = %task_id,
            added,
            "directory sync finished, refreshing map cache"
        );
        counter!("sync_users_added_total").increment(added);

        match self.map_cache.rebuild().await {
            Ok(summary) => {
                counter!("sync_jobs_total", "result" => "completed").increment(1);
                progress.complete(format!("added {added} employees"));
                info!(
                    stage = "sync",
                    task = %task_id,
                    markers = summary.markers,
                    "map cache refreshed after sync"
                );
            }
            Err(err) => {
                counter!("sync_jobs_total", "result" => "failed").increment(1);
                progress.fail(err.to_string());
                error!(stage = "sync", task = %task_id, error = %err, "map cache refresh failed after sync");
            }
        }
        self.registry.set(&task_id, &progress).await;

        tokio::time::sleep(self.cleanup_grace).await;
        self.registry.remove(&task_id).await;
        debug!(stage = "sync", task = %task_id, "progress entry removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use reqwest::Client;
    use serde_json::json;
    use staff_map_core::types::JobStatus;
    use staff_map_remote::{DirectoryClient, GeocoderClient};
    use staff_map_storage::Database;
    use url::Url;

    use crate::cache::{SharedCache, MAP_CACHE_KEY};

    fn fast_runner(
        db: &Database,
        directory_server: &MockServer,
        geocoder_server: &MockServer,
        cache: SharedCache,
    ) -> SyncRunner {
        let http = Client::builder().build().expect("client");
        let directory = DirectoryClient::new(
            "api-key",
            Url::parse(&format!("{}/", directory_server.base_url())).expect("url"),
            http.clone(),
        );
        let geocoder = GeocoderClient::new(
            "staff-map-tests/1.0",
            Url::parse(&format!("{}/", geocoder_server.base_url())).expect("url"),
            http,
        );
        let roster = EmployeeDirectory::new(db.clone(), directory, "@example.com");
        let registry = JobProgressRegistry::new(cache.clone());
        let map_cache = MapCacheService::new(
            db.clone(),
            geocoder,
            cache,
            "https://tasks.example.com",
        );
        SyncRunner::new(
            roster,
            registry,
            map_cache,
            Duration::from_millis(1),
            Duration::from_millis(20),
        )
    }

    #[test]
    fn range_validation_rejects_bad_bounds() {
        assert!(validate_range(5, 3).is_err());
        assert!(validate_range(0, 3).is_err());
        assert!(validate_range(-2, -1).is_err());
        assert!(validate_range(1, 1).is_ok());
        assert!(validate_range(1, 100).is_ok());
    }

    #[tokio::test]
    async fn run_persists_matching_users_and_refreshes_cache() {
        let db = Database::connect("sqlite::memory:?cache=shared")
            .await
            .expect("connect");
        db.run_migrations().await.expect("migrations");

        let directory_server = MockServer::start_async().await;
        directory_server
            .mock_async(|when, then| {
                when.method(GET).path("/users/1.json");
                then.status(200).json_body(json!({
                    "user": {
                        "id": 1,
                        "firstname": "Анна",
                        "lastname": "Смирнова",
                        "mail": "anna@example.com",
                        "custom_fields": [
                            {"name": "Город проживания", "value": "Москва"}
                        ]
                    }
                }));
            })
            .await;
        directory_server
            .mock_async(|when, then| {
                when.method(GET).path("/users/2.json");
                then.status(200).json_body(json!({
                    "user": {
                        "id": 2,
                        "firstname": "Гость",
                        "lastname": "Внешний",
                        "mail": "guest@other.com",
                        "custom_fields": []
                    }
                }));
            })
            .await;
        directory_server
            .mock_async(|when, then| {
                when.method(GET).path("/users/3.json");
                then.status(404).body("not found");
            })
            .await;

        let geocoder_server = MockServer::start_async().await;
        let cache = SharedCache::new();
        let runner = fast_runner(&db, &directory_server, &geocoder_server, cache.clone());
        let registry = runner.registry.clone();

        runner.run(1, 3, "task-1".to_string()).await;

        let employee = db
            .employees()
            .fetch(1)
            .await
            .expect("fetch")
            .expect("persisted");
        assert_eq!(employee.city.as_deref(), Some("Москва"));
        assert!(db.employees().fetch(2).await.expect("fetch").is_none());
        assert!(db.employees().fetch(3).await.expect("fetch").is_none());

        // The capital override resolves Москва without the geocoder, so the
        // cache holds exactly one marker.
        let payload = cache.get(MAP_CACHE_KEY).await.expect("cache written");
        assert!(payload.contains("Москва"));

        // The grace period has elapsed by the time run() returns.
        assert_eq!(registry.get("task-1").await, None);
    }

    #[tokio::test]
    async fn progress_is_visible_while_the_job_runs() {
        let db = Database::connect("sqlite::memory:?cache=shared")
            .await
            .expect("connect");
        db.run_migrations().await.expect("migrations");

        let directory_server = MockServer::start_async().await;
        for user_id in 1..=2 {
            directory_server
                .mock_async(move |when, then| {
                    when.method(GET).path(format!("/users/{user_id}.json"));
                    then.status(404).body("not found");
                })
                .await;
        }

        let geocoder_server = MockServer::start_async().await;
        let cache = SharedCache::new();
        let mut runner = fast_runner(&db, &directory_server, &geocoder_server, cache);
        runner.cleanup_grace = Duration::from_millis(500);
        let registry = runner.registry.clone();

        let handle = runner.spawn(1, 2, "task-2".to_string());

        // Wait for the loop to finish; the entry then lingers for the grace
        // period with its final snapshot.
        tokio::time::sleep(Duration::from_millis(250)).await;
        let snapshot = registry.get("task-2").await.expect("entry retained");
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.updated, 0);
        assert_eq!(snapshot.status, JobStatus::Completed);

        handle.await.expect("job task");
        assert_eq!(registry.get("task-2").await, None);
    }
}
