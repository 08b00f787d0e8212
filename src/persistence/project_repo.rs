//! Project record repository for `SQLite` persistence.
//!
//! The record store knows nothing about worker processes. Updates are
//! full replacements of the mutable fields (last writer wins); callers
//! that need read-modify-write hold the project's lock from
//! [`crate::orchestrator::locks::ProjectLocks`] across both halves.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::project::{ProjectFields, ProjectRecord};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for project records.
#[derive(Clone)]
pub struct ProjectRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ProjectRow {
    project_id: String,
    document: String,
    created_at: String,
    updated_at: String,
}

impl ProjectRow {
    fn into_record(self) -> Result<ProjectRecord> {
        let fields: ProjectFields = serde_json::from_str(&self.document)?;
        Ok(ProjectRecord {
            project_id: self.project_id,
            fields,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {column}: {e}")))
}

impl ProjectRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new project record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AlreadyExists` if `project_id` is already present,
    /// or `AppError::Db` if the insert fails.
    pub async fn create(&self, project_id: &str, fields: &ProjectFields) -> Result<ProjectRecord> {
        let now = Utc::now();
        let document = serde_json::to_string(fields)?;

        let outcome = sqlx::query(
            "INSERT INTO project_record (project_id, document, is_live, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(project_id)
        .bind(&document)
        .bind(i64::from(fields.is_live))
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(self.db.as_ref())
        .await;

        match outcome {
            Ok(_) => {}
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                return Err(AppError::AlreadyExists(format!(
                    "project '{project_id}' is already registered"
                )));
            }
            Err(err) => return Err(err.into()),
        }

        self.get(project_id).await
    }

    /// Retrieve the current snapshot of a project record.
    ///
    /// Absence is not an error: callers branch on the returned option.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the stored document is
    /// unreadable.
    pub async fn read(&self, project_id: &str) -> Result<Option<ProjectRecord>> {
        let row: Option<ProjectRow> = sqlx::query_as(
            "SELECT project_id, document, created_at, updated_at
             FROM project_record WHERE project_id = ?1",
        )
        .bind(project_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(ProjectRow::into_record).transpose()
    }

    /// Retrieve a project record, treating absence as an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the project does not exist.
    pub async fn get(&self, project_id: &str) -> Result<ProjectRecord> {
        self.read(project_id).await?.ok_or_else(|| {
            AppError::NotFound(format!(
                "project '{project_id}' has not been initialised, poll and try again"
            ))
        })
    }

    /// Replace every mutable field of a record with `updates`.
    ///
    /// Fields absent from `updates` revert to their defaults; nothing is
    /// merged with the stored document.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the project does not exist, or
    /// `AppError::Db` if the update fails.
    pub async fn update(&self, project_id: &str, updates: &ProjectFields) -> Result<ProjectRecord> {
        let document = serde_json::to_string(updates)?;

        let result = sqlx::query(
            "UPDATE project_record SET document = ?1, is_live = ?2, updated_at = ?3
             WHERE project_id = ?4",
        )
        .bind(&document)
        .bind(i64::from(updates.is_live))
        .bind(Utc::now().to_rfc3339())
        .bind(project_id)
        .execute(self.db.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "project '{project_id}' does not exist"
            )));
        }

        self.get(project_id).await
    }

    /// List records whose liveness flag is set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_live(&self) -> Result<Vec<ProjectRecord>> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            "SELECT project_id, document, created_at, updated_at
             FROM project_record WHERE is_live = 1
             ORDER BY project_id ASC",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(ProjectRow::into_record).collect()
    }
}
