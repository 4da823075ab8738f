use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Client for the tabular export that feeds department/position enrichment.
#[derive(Clone)]
pub struct SheetClient {
    http: Client,
    url: Url,
}

impl SheetClient {
    /// Creates a new sheet client reading from the provided export URL.
    pub fn new(url: Url, http: Client) -> Self {
        Self { http, url }
    }

    /// Fetches every row of the export in sheet order.
    pub async fn list_rows(&self) -> Result<Vec<SheetRow>, SheetError> {
        let response = self.http.get(self.url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<unavailable>"));
            return Err(SheetError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}

/// One sheet row keyed by the directory id in the `#` column.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SheetRow {
    #[serde(rename = "#")]
    pub id: i64,
    #[serde(rename = "Отдел", default)]
    pub department: String,
    #[serde(rename = "Должность", default)]
    pub position: String,
}

/// Errors produced by the sheet client.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn list_rows_parses_export() {
        let server = MockServer::start_async().await;
        let url = Url::parse(&server.url("/export")).expect("url");
        let client = SheetClient::new(url, Client::builder().build().expect("client"));

        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/export");
                then.status(200).json_body(json!([
                    {"#": 101, "Отдел": "Маркетинг", "Должность": "Аналитик"},
                    {"#": 102, "Должность": "Инженер"}
                ]));
            })
            .await;

        let rows = client.list_rows().await.expect("list rows");
        mock.assert_async().await;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 101);
        assert_eq!(rows[0].department, "Маркетинг");
        assert_eq!(rows[1].department, "");
        assert_eq!(rows[1].position, "Инженер");
    }

    #[tokio::test]
    async fn error_status_returns_message() {
        let server = MockServer::start_async().await;
        let url = Url::parse(&server.url("/export")).expect("url");
        let client = SheetClient::new(url, Client::builder().build().expect("client"));

        server
            .mock_async(|when, then| {
                when.method(GET).path("/export");
                then.status(403).body("forbidden");
            })
            .await;

        let err = client.list_rows().await.expect_err("should error");
        match err {
            SheetError::Status { status, body } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
