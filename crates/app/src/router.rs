use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use staff_map_core::types::{JobProgress, MapMarker};
use staff_map_remote::{DirectoryClient, GeocoderClient, SheetClient};
use staff_map_storage::Database;

use crate::cache::SharedCache;
use crate::enrich::EnrichRunner;
use crate::mapcache::MapCacheService;
use crate::progress::JobProgressRegistry;
use crate::roster::EmployeeDirectory;
use crate::stream;
use crate::sync::{validate_range, SyncRunner};
use crate::telemetry;

const VISITOR_COOKIE: &str = "visitor_id";
const VISITOR_COOKIE_MAX_AGE_SECS: u64 = 60 * 60 * 24;

/// Throttle and cleanup delays for the background jobs.
///
/// Production values respect the external directory's rate limits; tests
/// shrink them to keep runs fast.
#[derive(Debug, Clone, Copy)]
pub struct JobTimings {
    pub sync_step: Duration,
    pub sync_grace: Duration,
    pub enrich_step: Duration,
    pub enrich_grace: Duration,
}

impl Default for JobTimings {
    fn default() -> Self {
        Self {
            sync_step: Duration::from_millis(500),
            sync_grace: Duration::from_secs(2),
            enrich_step: Duration::from_millis(100),
            enrich_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    registry: JobProgressRegistry,
    map_cache: MapCacheService,
    sync: SyncRunner,
    enrich: EnrichRunner,
    sheets: Option<SheetClient>,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        directory: DirectoryClient,
        geocoder: GeocoderClient,
        sheets: Option<SheetClient>,
        directory_base: String,
        email_domain: String,
        timings: JobTimings,
    ) -> Self {
        let clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync> = Arc::new(Utc::now);
        let shared_cache = SharedCache::new();
        let registry = JobProgressRegistry::new(shared_cache.clone());
        let roster = EmployeeDirectory::new(storage.clone(), directory, email_domain);
        let map_cache = MapCacheService::new(
            storage.clone(),
            geocoder,
            shared_cache,
            directory_base,
        );
        let sync = SyncRunner::new(
            roster,
            registry.clone(),
            map_cache.clone(),
            timings.sync_step,
            timings.sync_grace,
        );
        let enrich = EnrichRunner::new(
            storage.clone(),
            registry.clone(),
            timings.enrich_step,
            timings.enrich_grace,
        );
        Self {
            metrics,
            storage,
            registry,
            map_cache,
            sync,
            enrich,
            sheets,
            clock,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn registry(&self) -> &JobProgressRegistry {
        &self.registry
    }

    pub fn map_cache(&self) -> &MapCacheService {
        &self.map_cache
    }

    pub fn sync(&self) -> &SyncRunner {
        &self.sync
    }

    pub fn enrich(&self) -> &EnrichRunner {
        &self.enrich
    }

    pub fn sheets(&self) -> Option<&SheetClient> {
        self.sheets.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/map_data", get(map_data))
        .route("/map/stream", get(stream::map_stream))
        .route("/track_visit", get(track_visit))
        .route("/refresh_cache", get(refresh_cache))
        .route("/add_users", post(add_users))
        .route("/progress/:task_id", get(sync_progress))
        .route("/update_from_sheet", post(update_from_sheet))
        .route("/sheet_progress/:task_id", get(sheet_progress))
        .route("/admin_stats", get(admin_stats))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .unwrap()
}

async fn map_data(State(state): State<AppState>) -> Json<Vec<MapMarker>> {
    let markers = match state.map_cache().read_markers().await {
        Ok(markers) => markers,
        Err(err) => {
            error!(stage = "map", error = %err, "failed to read map cache");
            Vec::new()
        }
    };
    Json(markers)
}

async fn refresh_cache(State(state): State<AppState>) -> Json<Value> {
    match state.map_cache().rebuild().await {
        Ok(summary) => {
            info!(
                stage = "map",
                markers = summary.markers,
                "manual map cache refresh completed"
            );
            Json(json!({ "message": "Map data cache refreshed" }))
        }
        Err(err) => {
            error!(stage = "map", error = %err, "manual map cache refresh failed");
            Json(json!({ "status": "error", "message": err.to_string() }))
        }
    }
}

async fn track_visit(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let existing = cookie_value(&headers, VISITOR_COOKIE);
    let visitor_id = existing
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    match state.storage().visits().record(&visitor_id, state.now()).await {
        Ok(()) => counter!("visits_recorded_total").increment(1),
        Err(err) => error!(stage = "visits", error = %err, "failed to record visit"),
    }

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8");
    if existing.is_none() {
        builder = builder.header(
            header::SET_COOKIE,
            format!(
                "{VISITOR_COOKIE}={visitor_id}; Max-Age={VISITOR_COOKIE_MAX_AGE_SECS}; Path=/"
            ),
        );
    }
    builder.body(Body::from("employee map")).unwrap()
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').map(str::trim).find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    date_start: String,
    date_end: String,
}

async fn admin_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Json<Value> {
    let visits = state.storage().visits();

    let unique_visitors = visits
        .unique_visitors(&query.date_start, &query.date_end)
        .await
        .unwrap_or_else(|err| {
            error!(stage = "visits", error = %err, "failed to count unique visitors");
            0
        });
    let total_visits = visits
        .total_visits(&query.date_start, &query.date_end)
        .await
        .unwrap_or_else(|err| {
            error!(stage = "visits", error = %err, "failed to count total visits");
            0
        });

    Json(json!({
        "unique_visitors": unique_visitors,
        "total_visits": total_visits,
    }))
}

#[derive(Debug, Deserialize)]
struct UserRange {
    start_id: i64,
    end_id: i64,
    task_id: String,
}

async fn add_users(State(state): State<AppState>, Json(range): Json<UserRange>) -> Json<Value> {
    if let Err(err) = validate_range(range.start_id, range.end_id) {
        counter!("sync_jobs_total", "result" => "rejected").increment(1);
        warn!(
            stage = "sync",
            task = %range.task_id,
            start_id = range.start_id,
            end_id = range.end_id,
            "rejected sync job: invalid range"
        );
        return Json(json!({ "message": err.to_string(), "status": "error" }));
    }

    state
        .sync()
        .spawn(range.start_id, range.end_id, range.task_id.clone());
    info!(
        stage = "sync",
        task = %range.task_id,
        start_id = range.start_id,
        end_id = range.end_id,
        "scheduled directory sync job"
    );
    Json(json!({
        "message": "processing started",
        "task_id": range.task_id,
        "status": "success",
    }))
}

async fn sync_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<JobProgress> {
    let progress = state.registry().get(&task_id).await.unwrap_or_default();
    debug!(stage = "sync", task = %task_id, processed = progress.processed, "progress polled");
    Json(progress)
}

#[derive(Debug, Deserialize)]
struct SheetTask {
    task_id: String,
}

async fn update_from_sheet(
    State(state): State<AppState>,
    Json(task): Json<SheetTask>,
) -> Json<Value> {
    let Some(sheets) = state.sheets() else {
        warn!(stage = "sheet", "sheet source not configured");
        return Json(json!({ "status": "error", "message": "sheet source not configured" }));
    };

    let rows = match sheets.list_rows().await {
        Ok(rows) => rows,
        Err(err) => {
            error!(stage = "sheet", error = %err, "failed to load sheet rows");
            return Json(json!({ "status": "error", "message": err.to_string() }));
        }
    };

    let ids = match state.storage().employees().list_ids().await {
        Ok(ids) => ids,
        Err(err) => {
            error!(stage = "storage", error = %err, "failed to list employee ids");
            return Json(json!({ "status": "error", "message": err.to_string() }));
        }
    };

    let total = ids.len() as u64;
    state
        .registry()
        .set(&task.task_id, &JobProgress::started(Some(total)))
        .await;
    state.enrich().spawn(ids, rows, task.task_id.clone());
    info!(
        stage = "enrich",
        task = %task.task_id,
        total,
        "scheduled sheet enrichment job"
    );
    Json(json!({
        "status": "success",
        "total_users": total,
        "task_id": task.task_id,
    }))
}

async fn sheet_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<JobProgress> {
    let progress = state
        .registry()
        .get(&task_id)
        .await
        .unwrap_or_else(JobProgress::not_found);
    debug!(stage = "enrich", task = %task_id, processed = progress.processed, "progress polled");
    Json(progress)
}
