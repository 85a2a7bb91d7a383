use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use flowerbot_core::domain::submission::{
    NewSubmission, SubmissionField, SubmissionId, SubmissionRecord,
};

use super::{RepositoryError, SubmissionRepository};

#[derive(Default)]
pub struct InMemorySubmissionRepository {
    submissions: RwLock<HashMap<String, SubmissionRecord>>,
}

impl InMemorySubmissionRepository {
    pub async fn len(&self) -> usize {
        self.submissions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl SubmissionRepository for InMemorySubmissionRepository {
    async fn create(&self, submission: NewSubmission) -> Result<SubmissionRecord, RepositoryError> {
        let record = SubmissionRecord::create(submission, Utc::now())?;
        let mut submissions = self.submissions.write().await;
        submissions.insert(record.id.0.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_id(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<SubmissionRecord>, RepositoryError> {
        let submissions = self.submissions.read().await;
        Ok(submissions.get(&id.0).cloned())
    }

    async fn update_field(
        &self,
        id: &SubmissionId,
        field: &str,
        value: &str,
    ) -> Result<SubmissionRecord, RepositoryError> {
        let field: SubmissionField = field.parse()?;
        let mut submissions = self.submissions.write().await;
        let record =
            submissions.get_mut(&id.0).ok_or_else(|| RepositoryError::NotFound(id.0.clone()))?;

        let mut updated = record.clone();
        updated.apply_update(field, value, Utc::now())?;
        *record = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: &SubmissionId) -> Result<(), RepositoryError> {
        let mut submissions = self.submissions.write().await;
        submissions.remove(&id.0).map(|_| ()).ok_or_else(|| RepositoryError::NotFound(id.0.clone()))
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<SubmissionRecord>, RepositoryError> {
        let submissions = self.submissions.read().await;
        let mut records: Vec<SubmissionRecord> = submissions.values().cloned().collect();
        records.sort_by(|a, b| b.last_updated.cmp(&a.last_updated).then(a.id.0.cmp(&b.id.0)));
        records.truncate(limit as usize);
        Ok(records)
    }
}
