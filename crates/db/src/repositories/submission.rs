use chrono::{DateTime, Utc};
use sqlx::Row;

use flowerbot_core::domain::submission::{
    NewSubmission, SubmissionField, SubmissionId, SubmissionRecord,
};

use super::{RepositoryError, SubmissionRepository};
use crate::DbPool;

pub struct SqlSubmissionRepository {
    pool: DbPool,
}

impl SqlSubmissionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_submission(row: &sqlx::sqlite::SqliteRow) -> Result<SubmissionRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: Option<String> =
        row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let username: Option<String> =
        row.try_get("username").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message: String =
        row.try_get("message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let picture: Option<String> =
        row.try_get("picture").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let website: bool =
        row.try_get("website").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approved: bool =
        row.try_get("approved").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_updated_str: String =
        row.try_get("last_updated").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let last_updated = DateTime::parse_from_rfc3339(&last_updated_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("last_updated: {e}")))?;

    Ok(SubmissionRecord {
        id: SubmissionId(id),
        name,
        username,
        message,
        picture,
        website,
        approved,
        last_updated,
    })
}

fn update_statement(field: SubmissionField) -> &'static str {
    match field {
        SubmissionField::Name => {
            "UPDATE flower_submission SET name = ?, last_updated = ? WHERE id = ?"
        }
        SubmissionField::Username => {
            "UPDATE flower_submission SET username = ?, last_updated = ? WHERE id = ?"
        }
        SubmissionField::Message => {
            "UPDATE flower_submission SET message = ?, last_updated = ? WHERE id = ?"
        }
        SubmissionField::Picture => {
            "UPDATE flower_submission SET picture = ?, last_updated = ? WHERE id = ?"
        }
        SubmissionField::Website => {
            "UPDATE flower_submission SET website = ?, last_updated = ? WHERE id = ?"
        }
        SubmissionField::Approved => {
            "UPDATE flower_submission SET approved = ?, last_updated = ? WHERE id = ?"
        }
    }
}

#[async_trait::async_trait]
impl SubmissionRepository for SqlSubmissionRepository {
    async fn create(&self, submission: NewSubmission) -> Result<SubmissionRecord, RepositoryError> {
        let record = SubmissionRecord::create(submission, Utc::now())?;

        sqlx::query(
            "INSERT INTO flower_submission (id, name, username, message, picture, website,
                                            approved, last_updated)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(&record.name)
        .bind(&record.username)
        .bind(&record.message)
        .bind(&record.picture)
        .bind(record.website)
        .bind(record.approved)
        .bind(record.last_updated.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_by_id(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<SubmissionRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, username, message, picture, website, approved, last_updated
             FROM flower_submission WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_submission(r)?)),
            None => Ok(None),
        }
    }

    async fn update_field(
        &self,
        id: &SubmissionId,
        field: &str,
        value: &str,
    ) -> Result<SubmissionRecord, RepositoryError> {
        let field: SubmissionField = field.parse()?;
        let mut record =
            self.find_by_id(id).await?.ok_or_else(|| RepositoryError::NotFound(id.0.clone()))?;
        record.apply_update(field, value, Utc::now())?;

        let query = sqlx::query(update_statement(field));
        let query = match field {
            SubmissionField::Name => query.bind(record.name.clone()),
            SubmissionField::Username => query.bind(record.username.clone()),
            SubmissionField::Message => query.bind(record.message.clone()),
            SubmissionField::Picture => query.bind(record.picture.clone()),
            SubmissionField::Website => query.bind(record.website),
            SubmissionField::Approved => query.bind(record.approved),
        };
        let result = query
            .bind(record.last_updated.to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.0.clone()));
        }
        Ok(record)
    }

    async fn delete(&self, id: &SubmissionId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM flower_submission WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.0.clone()));
        }
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<SubmissionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, username, message, picture, website, approved, last_updated
             FROM flower_submission
             ORDER BY last_updated DESC, id ASC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_submission).collect()
    }
}
