use serde::{Deserialize, Serialize};

/// Employee record persisted in the local store, keyed by the external
/// directory identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

impl Employee {
    /// Splits the stored full name on the first whitespace boundary.
    ///
    /// The first token becomes the given name; everything that follows is
    /// joined back into the family name.
    pub fn split_name(&self) -> (String, String) {
        let mut parts = self.name.split_whitespace();
        let first = parts.next().unwrap_or_default().to_string();
        let rest = parts.collect::<Vec<_>>().join(" ");
        (first, rest)
    }
}

/// Listing projection of an [`Employee`] with the derived profile link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub id: i64,
    pub name: String,
    pub profile_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

impl EmployeeProfile {
    /// Projects a stored employee, deriving the profile link from the
    /// directory base URL and the record id.
    pub fn from_employee(employee: Employee, directory_base: &str) -> Self {
        let profile_url = format!(
            "{}/users/{}",
            directory_base.trim_end_matches('/'),
            employee.id
        );
        Self {
            id: employee.id,
            name: employee.name,
            profile_url,
            city: employee.city,
            department: employee.department,
            position: employee.position,
        }
    }
}

/// One map marker per canonical city with resolved coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub city: String,
    pub coordinates: [f64; 2],
    pub employees: Vec<MarkerEmployee>,
}

/// Employee payload carried inside a marker. Department and position are
/// omitted from the serialized form when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerEmployee {
    pub name: String,
    pub profile_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

/// Progress snapshot for a background job, keyed by the caller-supplied
/// task identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub processed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    pub updated: u64,
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: JobStatus,
}

impl JobProgress {
    /// Fresh snapshot for a job that has just been scheduled.
    pub fn started(total: Option<u64>) -> Self {
        Self {
            processed: 0,
            total,
            updated: 0,
            error: false,
            message: None,
            status: JobStatus::Running,
        }
    }

    /// Snapshot returned when a job id is unknown or already expired.
    pub fn not_found() -> Self {
        Self {
            processed: 0,
            total: None,
            updated: 0,
            error: true,
            message: Some("task not found".to_string()),
            status: JobStatus::Failed,
        }
    }

    /// Marks the snapshot as successfully finished.
    pub fn complete(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Completed;
        self.message = Some(message.into());
    }

    /// Marks the snapshot as failed, retaining already reported counters.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = true;
        self.status = JobStatus::Failed;
        self.message = Some(message.into());
    }
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::started(None)
    }
}

/// Lifecycle state of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}
