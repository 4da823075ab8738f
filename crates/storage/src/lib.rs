use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, SqlitePool};
use thiserror::Error;

use staff_map_core::types::Employee;

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle to operate on employee records.
    pub fn employees(&self) -> EmployeeRepository {
        EmployeeRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to operate on visit records.
    pub fn visits(&self) -> VisitRepository {
        VisitRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository responsible for the `employees` table.
#[derive(Clone)]
pub struct EmployeeRepository {
    pool: SqlitePool,
}

impl EmployeeRepository {
    /// Fetches a single employee by directory id.
    pub async fn fetch(&self, id: i64) -> Result<Option<Employee>, EmployeeError> {
        let row = sqlx::query_as::<_, EmployeeRow>(
            "SELECT id, name, email, city, department, position FROM employees WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EmployeeRow::into_domain))
    }

    /// Inserts the employee or replaces an existing record with the same id.
    pub async fn upsert(&self, employee: &NewEmployee<'_>) -> Result<(), EmployeeError> {
        sqlx::query(
            "INSERT INTO employees (id, name, email, city, department, position) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE \
             SET name = excluded.name, \
                 email = excluded.email, \
                 city = excluded.city, \
                 department = excluded.department, \
                 position = excluded.position",
        )
        .bind(employee.id)
        .bind(employee.name)
        .bind(employee.email)
        .bind(employee.city)
        .bind(employee.department)
        .bind(employee.position)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists every stored employee ordered by id.
    pub async fn list_all(&self) -> Result<Vec<Employee>, EmployeeError> {
        let rows = sqlx::query_as::<_, EmployeeRow>(
            "SELECT id, name, email, city, department, position FROM employees ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EmployeeRow::into_domain).collect())
    }

    /// Lists the stored directory ids ordered ascending.
    pub async fn list_ids(&self) -> Result<Vec<i64>, EmployeeError> {
        let rows = sqlx::query_as::<_, (i64,)>("SELECT id FROM employees ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Updates the department/position assignment of one employee.
    ///
    /// Returns `false` when no record with the given id exists.
    pub async fn update_assignment(
        &self,
        id: i64,
        department: &str,
        position: &str,
    ) -> Result<bool, EmployeeError> {
        let result = sqlx::query("UPDATE employees SET department = ?, position = ? WHERE id = ?")
            .bind(department)
            .bind(position)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Data required to upsert an employee record.
pub struct NewEmployee<'a> {
    pub id: i64,
    pub name: &'a str,
    pub email: &'a str,
    pub city: Option<&'a str>,
    pub department: Option<&'a str>,
    pub position: Option<&'a str>,
}

/// Raw employee row as stored; legacy placeholder literals are scrubbed
/// when converting into the domain type.
#[derive(Debug, sqlx::FromRow)]
struct EmployeeRow {
    id: i64,
    name: String,
    email: String,
    city: Option<String>,
    department: Option<String>,
    position: Option<String>,
}

impl EmployeeRow {
    fn into_domain(self) -> Employee {
        Employee {
            id: self.id,
            name: self.name,
            email: self.email,
            city: self.city.filter(|value| value != "No city"),
            department: scrub_literal(self.department),
            position: scrub_literal(self.position),
        }
    }
}

fn scrub_literal(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty() && value != "None")
}

/// Errors that can occur while operating on employee records.
#[derive(Debug, Error)]
pub enum EmployeeError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository responsible for the `visits` table.
#[derive(Clone)]
pub struct VisitRepository {
    pool: SqlitePool,
}

impl VisitRepository {
    /// Appends one visit event for the provided visitor token.
    pub async fn record(&self, visitor_id: &str, at: DateTime<Utc>) -> Result<(), VisitError> {
        sqlx::query("INSERT INTO visits (visitor_id, visit_time) VALUES (?, ?)")
            .bind(visitor_id)
            .bind(to_rfc3339(at))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Counts distinct visitors inside the date range.
    ///
    /// Equal start/end dates match that single day; otherwise the raw
    /// timestamps are compared against the range bounds.
    pub async fn unique_visitors(
        &self,
        date_start: &str,
        date_end: &str,
    ) -> Result<i64, VisitError> {
        let (count,): (i64,) = if date_start == date_end {
            sqlx::query_as(
                "SELECT COUNT(DISTINCT visitor_id) FROM visits WHERE DATE(visit_time) = ?",
            )
            .bind(date_start)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT COUNT(DISTINCT visitor_id) FROM visits WHERE visit_time BETWEEN ? AND ?",
            )
            .bind(date_start)
            .bind(date_end)
            .fetch_one(&self.pool)
            .await?
        };

        Ok(count)
    }

    /// Counts every visit inside the date range.
    pub async fn total_visits(&self, date_start: &str, date_end: &str) -> Result<i64, VisitError> {
        let (count,): (i64,) = if date_start == date_end {
            sqlx::query_as("SELECT COUNT(*) FROM visits WHERE DATE(visit_time) = ?")
                .bind(date_start)
                .fetch_one(&self.pool)
                .await?
        } else {
            sqlx::query_as("SELECT COUNT(*) FROM visits WHERE visit_time BETWEEN ? AND ?")
                .bind(date_start)
                .bind(date_end)
                .fetch_one(&self.pool)
                .await?
        };

        Ok(count)
    }
}

/// Errors that can occur while recording or counting visits.
#[derive(Debug, Error)]
pub enum VisitError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
