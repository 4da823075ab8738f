mod cache;
mod enrich;
mod mapcache;
mod progress;
mod roster;
mod router;
mod stream;
mod sync;
mod telemetry;

use std::{net::SocketAddr, time::Duration};

use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use staff_map_remote::{DirectoryClient, GeocoderClient, SheetClient};
use staff_map_storage::Database;
use staff_map_util::{load_env_file, AppConfig};

use crate::router::{app_router, AppState, JobTimings};

/// Upper bound on any single call to an external capability.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;

    let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
    let directory = DirectoryClient::new(
        &config.directory_api_key,
        api_base(&config.directory_url)?,
        http.clone(),
    );
    let geocoder = GeocoderClient::new(
        &config.geocoder_user_agent,
        api_base(&config.geocoder_url)?,
        http.clone(),
    );
    let sheets = match &config.sheet_url {
        Some(raw) => Some(SheetClient::new(Url::parse(raw)?, http)),
        None => None,
    };

    let state = AppState::new(
        metrics,
        database,
        directory,
        geocoder,
        sheets,
        config.directory_url.trim_end_matches('/').to_string(),
        config.email_domain.clone(),
        JobTimings::default(),
    );

    // Warm the map view so the first client does not see an empty map; a
    // failing rebuild is not fatal, the next sync or manual refresh retries.
    if let Err(err) = state.map_cache().rebuild().await {
        warn!(stage = "map", error = %err, "initial map cache rebuild failed");
    }

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app_router(state))
        .await
        .map_err(|err| err.into())
}

/// Normalizes a configured base URL so relative joins keep the full path.
fn api_base(raw: &str) -> Result<Url, url::ParseError> {
    if raw.ends_with('/') {
        Url::parse(raw)
    } else {
        Url::parse(&format!("{raw}/"))
    }
}
