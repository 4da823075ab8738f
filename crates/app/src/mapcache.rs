use std::{collections::HashMap, sync::Arc, time::Instant};

use metrics::{counter, gauge, histogram};
use thiserror::Error;
use tracing::{debug, info, warn};

use staff_map_core::grouping::group_by_city;
use staff_map_core::types::{EmployeeProfile, MapMarker};
use staff_map_remote::GeocoderClient;
use staff_map_storage::{Database, EmployeeError};

use crate::cache::{SharedCache, MAP_CACHE_KEY};

/// Canonical name of the capital city with pinned coordinates.
pub const CAPITAL_CITY: &str = "Москва";
/// Fixed coordinates for the capital, skipping the geocoder round-trip.
pub const CAPITAL_COORDINATES: [f64; 2] = [55.778487, 37.672379];

/// Sentinel never handed to the geocoder.
const UNKNOWN_CITY: &str = "No city";

/// Rebuilds the city-grouped map view from the employee store and publishes
/// it into the shared cache as one replaceable value.
#[derive(Clone)]
pub struct MapCacheService {
    database: Database,
    geocoder: GeocoderClient,
    cache: SharedCache,
    directory_base: Arc<str>,
}

/// Counters describing the outcome of one rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildSummary {
    pub markers: usize,
    pub employees: usize,
}

impl MapCacheService {
    pub fn new(
        database: Database,
        geocoder: GeocoderClient,
        cache: SharedCache,
        directory_base: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            database,
            geocoder,
            cache,
            directory_base: directory_base.into(),
        }
    }

    /// Rebuilds the map cache from scratch.
    ///
    /// The geocode cache lives only for the duration of one rebuild; a few
    /// redundant lookups across rebuilds are accepted in exchange for never
    /// serving stale coordinates. Cities whose coordinates cannot be
    /// resolved are dropped from the view. Concurrent rebuilds are safe:
    /// the cache entry is replaced wholesale, so readers observe either the
    /// old or the new view, never a mix.
    pub async fn rebuild(&self) -> Result<RebuildSummary, MapCacheError> {
        let started = Instant::now();
        info!(stage = "map", "rebuilding map cache");

        let employees = self.database.employees().list_all().await?;
        let profiles: Vec<EmployeeProfile> = employees
            .into_iter()
            .map(|employee| EmployeeProfile::from_employee(employee, &self.directory_base))
            .collect();
        let groups = group_by_city(profiles);

        let mut coordinates_cache: HashMap<String, [f64; 2]> = HashMap::new();
        let mut markers = Vec::with_capacity(groups.len());
        for group in groups {
            let Some(coordinates) = self
                .resolve_coordinates(&group.city, &mut coordinates_cache)
                .await
            else {
                warn!(stage = "map", city = %group.city, "coordinates not found, city dropped");
                continue;
            };
            debug!(
                stage = "map",
                city = %group.city,
                employees = group.employees.len(),
                "marker added to map cache"
            );
            markers.push(MapMarker {
                city: group.city,
                coordinates,
                employees: group.employees,
            });
        }

        let employees_on_map = markers
            .iter()
            .map(|marker| marker.employees.len())
            .sum::<usize>();
        let payload = serde_json::to_string(&markers)?;
        self.cache.set(MAP_CACHE_KEY, payload).await;

        histogram!("map_rebuild_seconds").record(started.elapsed().as_secs_f64());
        gauge!("map_markers").set(markers.len() as f64);
        info!(
            stage = "map",
            markers = markers.len(),
            employees = employees_on_map,
            "map cache rebuilt"
        );

        Ok(RebuildSummary {
            markers: markers.len(),
            employees: employees_on_map,
        })
    }

    /// Reads the current map view from the shared cache.
    ///
    /// An absent entry decodes to an empty view.
    pub async fn read_markers(&self) -> Result<Vec<MapMarker>, MapCacheError> {
        let Some(payload) = self.cache.get(MAP_CACHE_KEY).await else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&payload)?)
    }

    /// Resolves coordinates for one canonical city.
    ///
    /// The per-rebuild cache short-circuits repeated cities; the capital
    /// bypasses the geocoder entirely and is never inserted into the cache.
    async fn resolve_coordinates(
        &self,
        city: &str,
        cache: &mut HashMap<String, [f64; 2]>,
    ) -> Option<[f64; 2]> {
        if city.is_empty() || city == UNKNOWN_CITY {
            warn!(stage = "geocoder", %city, "city skipped");
            return None;
        }
        if city == CAPITAL_CITY {
            return Some(CAPITAL_COORDINATES);
        }
        if let Some(coordinates) = cache.get(city) {
            counter!("geocoder_lookup_total", "result" => "cached").increment(1);
            return Some(*coordinates);
        }

        match self.geocoder.geocode(city).await {
            Ok(Some((lat, lon))) => {
                counter!("geocoder_lookup_total", "result" => "ok").increment(1);
                let coordinates = [lat, lon];
                cache.insert(city.to_string(), coordinates);
                info!(stage = "geocoder", %city, lat, lon, "coordinates resolved");
                Some(coordinates)
            }
            Ok(None) => {
                counter!("geocoder_lookup_total", "result" => "miss").increment(1);
                warn!(stage = "geocoder", %city, "city not found in geocoder");
                None
            }
            Err(err) => {
                counter!("geocoder_lookup_total", "result" => "error").increment(1);
                warn!(stage = "geocoder", %city, error = %err, "geocoder lookup failed");
                None
            }
        }
    }
}

/// Errors that can interrupt a map cache rebuild.
#[derive(Debug, Error)]
pub enum MapCacheError {
    #[error("failed to load employees: {0}")]
    Employees(#[from] EmployeeError),
    #[error("failed to encode map cache: {0}")]
    Encode(#[from] serde_json::Error),
}
