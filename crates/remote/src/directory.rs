use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Custom field carrying the employee's city of residence.
pub const CITY_FIELD: &str = "Город проживания";
/// Custom field carrying the employee's department.
pub const DEPARTMENT_FIELD: &str = "Отдел";
/// Custom field carrying the employee's position.
pub const POSITION_FIELD: &str = "Должность";

/// Client for the issue-tracker user registry that serves as the employee
/// directory.
#[derive(Clone)]
pub struct DirectoryClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl DirectoryClient {
    /// Creates a new directory client with the provided configuration.
    pub fn new(api_key: impl Into<String>, base_url: Url, http: Client) -> Self {
        Self {
            http,
            base_url,
            api_key: api_key.into(),
        }
    }

    /// Fetches a single user record by directory id.
    pub async fn fetch_user(&self, user_id: i64) -> Result<DirectoryUserEnvelope, DirectoryError> {
        let url = self.base_url.join(&format!("users/{user_id}.json"))?;
        let response = self
            .http
            .get(url)
            .header("X-Redmine-API-Key", &self.api_key)
            .send()
            .await?;

        parse_json(response).await
    }
}

/// Envelope wrapping one directory user, mirroring the registry's wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryUserEnvelope {
    pub user: DirectoryUser,
}

/// Directory user record with its free-form custom fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: i64,
    pub firstname: String,
    pub lastname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default)]
    pub custom_fields: Vec<DirectoryCustomField>,
}

impl DirectoryUser {
    /// Returns the trimmed value of the named custom field when it is
    /// present and non-empty.
    pub fn custom_field(&self, name: &str) -> Option<&str> {
        self.custom_fields
            .iter()
            .find(|field| field.name == name)
            .and_then(|field| field.value.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Full name assembled the same way the directory displays it.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }

    /// Returns `true` when the user's mail ends with the given domain suffix.
    pub fn mail_in_domain(&self, domain: &str) -> bool {
        self.mail
            .as_deref()
            .map(|mail| mail.ends_with(domain))
            .unwrap_or(false)
    }
}

/// Single name/value custom field attached to a directory user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryCustomField {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// Errors produced by the directory client.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

async fn parse_json<T>(response: Response) -> Result<T, DirectoryError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(DirectoryError::Status { status, body });
    }

    Ok(response.json().await?)
}
