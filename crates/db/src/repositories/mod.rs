use async_trait::async_trait;
use thiserror::Error;

use flowerbot_core::domain::submission::{
    FieldUpdateError, NewSubmission, SubmissionId, SubmissionRecord,
};

pub mod memory;
pub mod submission;

pub use memory::InMemorySubmissionRepository;
pub use submission::SqlSubmissionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("submission `{0}` not found")]
    NotFound(String),
    #[error("invalid field name `{0}`; valid fields are: name, username, message, picture, website, approved")]
    InvalidField(String),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<FieldUpdateError> for RepositoryError {
    fn from(error: FieldUpdateError) -> Self {
        match error {
            FieldUpdateError::UnknownField(field) => Self::InvalidField(field),
            FieldUpdateError::InvalidValue { field, reason } => Self::InvalidValue { field, reason },
        }
    }
}

/// Durable store for submission rows.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn create(&self, submission: NewSubmission) -> Result<SubmissionRecord, RepositoryError>;

    async fn find_by_id(&self, id: &SubmissionId)
        -> Result<Option<SubmissionRecord>, RepositoryError>;

    /// Sets one field from its string encoding. Only the documented field names are accepted.
    async fn update_field(
        &self,
        id: &SubmissionId,
        field: &str,
        value: &str,
    ) -> Result<SubmissionRecord, RepositoryError>;

    async fn delete(&self, id: &SubmissionId) -> Result<(), RepositoryError>;

    async fn list_recent(&self, limit: u32) -> Result<Vec<SubmissionRecord>, RepositoryError>;
}
