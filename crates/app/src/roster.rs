use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, info, warn};

use staff_map_core::normalizer::CityNormalizer;
use staff_map_core::types::Employee;
use staff_map_remote::{
    DirectoryClient, DirectoryCustomField, DirectoryUser, DirectoryUserEnvelope, CITY_FIELD,
    DEPARTMENT_FIELD, POSITION_FIELD,
};
use staff_map_storage::{Database, NewEmployee};

/// Placeholder emitted in envelopes for employees without a stored city, so
/// store-sourced and directory-sourced payloads look identical downstream.
const CITY_PLACEHOLDER: &str = "No city";

/// Store-or-fetch facade over the employee table and the external directory.
///
/// Lookups prefer the local store; misses fall through to the directory,
/// apply the corporate domain filter and persist matching users. Every
/// failure mode degrades to `None` so job loops never abort on a single id.
#[derive(Clone)]
pub struct EmployeeDirectory {
    database: Database,
    directory: DirectoryClient,
    email_domain: Arc<str>,
}

impl EmployeeDirectory {
    pub fn new(
        database: Database,
        directory: DirectoryClient,
        email_domain: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            database,
            directory,
            email_domain: email_domain.into(),
        }
    }

    /// Returns the configured corporate mail suffix.
    pub fn email_domain(&self) -> &str {
        &self.email_domain
    }

    /// Returns the employee envelope for the given directory id.
    ///
    /// Store hits are reshaped into the directory wire format. Store misses
    /// consult the external directory; users outside the corporate domain
    /// are neither persisted nor returned.
    pub async fn get_or_fetch(&self, user_id: i64) -> Option<DirectoryUserEnvelope> {
        match self.database.employees().fetch(user_id).await {
            Ok(Some(employee)) => {
                debug!(stage = "storage", user = user_id, "employee found in store");
                return Some(envelope_from_employee(&employee));
            }
            Ok(None) => {}
            Err(err) => {
                error!(stage = "storage", user = user_id, error = %err, "employee lookup failed")
            }
        }

        let envelope = match self.directory.fetch_user(user_id).await {
            Ok(envelope) => {
                counter!("directory_fetch_total", "result" => "ok").increment(1);
                envelope
            }
            Err(err) => {
                counter!("directory_fetch_total", "result" => "error").increment(1);
                warn!(stage = "directory", user = user_id, error = %err, "directory fetch failed");
                return None;
            }
        };

        if !envelope.user.mail_in_domain(&self.email_domain) {
            debug!(
                stage = "directory",
                user = user_id,
                "user outside corporate domain, skipped"
            );
            return None;
        }

        self.persist(&envelope.user).await;
        Some(envelope)
    }

    async fn persist(&self, user: &DirectoryUser) {
        // mail_in_domain has already established the mail is present.
        let Some(email) = user.mail.as_deref() else {
            return;
        };
        let name = user.full_name();
        let city = CityNormalizer::normalize(user.custom_field(CITY_FIELD));
        let record = NewEmployee {
            id: user.id,
            name: &name,
            email,
            city: city.as_deref(),
            department: user.custom_field(DEPARTMENT_FIELD),
            position: user.custom_field(POSITION_FIELD),
        };

        match self.database.employees().upsert(&record).await {
            Ok(()) => info!(stage = "storage", user = user.id, "employee saved to store"),
            Err(err) => {
                error!(stage = "storage", user = user.id, error = %err, "failed to save employee")
            }
        }
    }
}

/// Reshapes a stored employee into the envelope the directory would return.
fn envelope_from_employee(employee: &Employee) -> DirectoryUserEnvelope {
    let (firstname, lastname) = employee.split_name();
    DirectoryUserEnvelope {
        user: DirectoryUser {
            id: employee.id,
            firstname,
            lastname,
            mail: Some(employee.email.clone()),
            custom_fields: vec![
                DirectoryCustomField {
                    name: CITY_FIELD.to_string(),
                    value: Some(
                        employee
                            .city
                            .clone()
                            .unwrap_or_else(|| CITY_PLACEHOLDER.to_string()),
                    ),
                },
                DirectoryCustomField {
                    name: DEPARTMENT_FIELD.to_string(),
                    value: Some(employee.department.clone().unwrap_or_default()),
                },
                DirectoryCustomField {
                    name: POSITION_FIELD.to_string(),
                    value: Some(employee.position.clone().unwrap_or_default()),
                },
            ],
        },
    }
}
