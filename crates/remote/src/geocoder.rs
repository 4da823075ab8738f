use std::num::ParseFloatError;

use reqwest::{header::USER_AGENT, Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Client for a Nominatim-style forward geocoding service.
#[derive(Clone)]
pub struct GeocoderClient {
    http: Client,
    base_url: Url,
    user_agent: String,
}

impl GeocoderClient {
    /// Creates a new geocoder client with the provided configuration.
    ///
    /// The user agent is mandatory; public Nominatim instances reject
    /// anonymous clients.
    pub fn new(user_agent: impl Into<String>, base_url: Url, http: Client) -> Self {
        Self {
            http,
            base_url,
            user_agent: user_agent.into(),
        }
    }

    /// Resolves a city name to `(latitude, longitude)`.
    ///
    /// Returns `Ok(None)` when the service has no match for the query.
    pub async fn geocode(&self, city: &str) -> Result<Option<(f64, f64)>, GeocoderError> {
        let mut url = self.base_url.join("search")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", city);
            query.append_pair("format", "json");
            query.append_pair("limit", "1");
        }

        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<unavailable>"));
            return Err(GeocoderError::Status { status, body });
        }

        let places: Vec<Place> = response.json().await?;
        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        let lat = place.lat.parse::<f64>()?;
        let lon = place.lon.parse::<f64>()?;
        Ok(Some((lat, lon)))
    }
}

/// Single geocoder result. Coordinates arrive as strings on the wire.
#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

/// Errors produced by the geocoder client.
#[derive(Debug, Error)]
pub enum GeocoderError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid coordinate value: {0}")]
    Coordinates(#[from] ParseFloatError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(base_url: &Url) -> GeocoderClient {
        GeocoderClient::new(
            "staff-map-tests/1.0",
            base_url.clone(),
            Client::builder().build().expect("client"),
        )
    }

    #[tokio::test]
    async fn geocode_parses_first_result() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/")).expect("url");
        let client = client(&base);

        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/search")
                    .query_param("q", "Казань")
                    .query_param("format", "json")
                    .query_param("limit", "1")
                    .header("user-agent", "staff-map-tests/1.0");
                then.status(200).json_body(json!([
                    {"lat": "55.7887", "lon": "49.1221", "display_name": "Казань"}
                ]));
            })
            .await;

        let coordinates = client.geocode("Казань").await.expect("geocode");
        mock.assert_async().await;
        assert_eq!(coordinates, Some((55.7887, 49.1221)));
    }

    #[tokio::test]
    async fn empty_result_maps_to_none() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/")).expect("url");
        let client = client(&base);

        server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(200).json_body(json!([]));
            })
            .await;

        let coordinates = client.geocode("Несуществующий").await.expect("geocode");
        assert_eq!(coordinates, None);
    }

    #[tokio::test]
    async fn error_status_returns_message() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/")).expect("url");
        let client = client(&base);

        server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(503).body("overloaded");
            })
            .await;

        let err = client.geocode("Казань").await.expect_err("should error");
        match err {
            GeocoderError::Status { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
