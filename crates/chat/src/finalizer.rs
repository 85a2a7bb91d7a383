use std::sync::Arc;
use std::time::Duration;

use flowerbot_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use flowerbot_core::config::AppConfig;
use flowerbot_core::domain::submission::{NewSubmission, SubmissionRecord};
use flowerbot_core::errors::ApplicationError;
use flowerbot_core::moderation::ModerationRequest;
use flowerbot_core::wizard::Draft;
use flowerbot_db::{RepositoryError, SubmissionRepository};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::blocks;
use crate::images::ImageStore;
use crate::moderation::{ModerationError, ModerationWorkflow};
use crate::surface::{ChatSurface, MessageRef, SurfaceError};

const ACTOR: &str = "submission-finalizer";

pub const IMAGE_SKIPPED_WARNING: &str =
    "⚠️ Your image could not be uploaded, so your flower was submitted without it.";

#[derive(Clone, Debug)]
pub struct FinalizerSettings {
    pub upload_timeout: Duration,
    /// Falls back to the channel the submission was started in.
    pub announcement_channel_id: Option<String>,
}

impl FinalizerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            upload_timeout: config.storage.upload_timeout(),
            announcement_channel_id: config.chat.announcement_channel_id.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizeReceipt {
    pub record: SubmissionRecord,
    pub identity: String,
    pub announcement: MessageRef,
    pub ticket: Option<MessageRef>,
    pub image_warning: Option<&'static str>,
}

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("could not create submission record: {0}")]
    Create(#[source] RepositoryError),
    #[error("announcement publish failed (rolled back: {rolled_back}): {source}")]
    Publish {
        #[source]
        source: SurfaceError,
        rolled_back: bool,
    },
    #[error(transparent)]
    Moderation(#[from] ModerationError),
}

impl FinalizeError {
    pub fn to_application(&self) -> ApplicationError {
        match self {
            Self::Create(error) => ApplicationError::Persistence(error.to_string()),
            Self::Publish { source, rolled_back: true } => {
                ApplicationError::Integration(source.to_string())
            }
            Self::Publish { source, rolled_back: false } => ApplicationError::Integrity(format!(
                "announcement failed and the record could not be removed: {source}"
            )),
            Self::Moderation(error) => ApplicationError::Integration(error.to_string()),
        }
    }
}

/// Turns a confirmed draft into a stored, announced and (with consent) moderated submission.
pub struct Finalizer {
    repository: Arc<dyn SubmissionRepository>,
    surface: Arc<dyn ChatSurface>,
    images: Arc<dyn ImageStore>,
    moderation: Arc<ModerationWorkflow>,
    audit: Arc<dyn AuditSink>,
    settings: FinalizerSettings,
}

impl Finalizer {
    pub fn new(
        repository: Arc<dyn SubmissionRepository>,
        surface: Arc<dyn ChatSurface>,
        images: Arc<dyn ImageStore>,
        moderation: Arc<ModerationWorkflow>,
        audit: Arc<dyn AuditSink>,
        settings: FinalizerSettings,
    ) -> Self {
        Self { repository, surface, images, moderation, audit, settings }
    }

    pub async fn finalize(
        &self,
        draft: Draft,
        correlation_id: &str,
    ) -> Result<FinalizeReceipt, FinalizeError> {
        let audit = AuditContext::new(None, Some(draft.user_id.clone()), correlation_id, ACTOR);

        let (picture, image_warning) = self.store_image(&draft, &audit).await;

        let record = self
            .repository
            .create(NewSubmission {
                name: draft.display_name.clone(),
                username: draft.shared_username(),
                message: draft.message.clone().unwrap_or_default(),
                picture,
                website: draft.consent,
            })
            .await
            .map_err(|error| {
                self.audit.emit(
                    AuditEvent::new(
                        &audit,
                        "submission.create_failed",
                        AuditCategory::Persistence,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                FinalizeError::Create(error)
            })?;

        let audit = AuditContext::new(
            Some(record.id.clone()),
            Some(draft.user_id.clone()),
            correlation_id,
            ACTOR,
        );
        self.audit.emit(AuditEvent::new(
            &audit,
            "submission.record_created",
            AuditCategory::Submission,
            AuditOutcome::Success,
        ));

        let identity = draft.effective_identity();
        let channel_id =
            self.settings.announcement_channel_id.as_deref().unwrap_or(&draft.channel_id);
        let announcement = match self
            .surface
            .publish(channel_id, &blocks::announcement(&record, &identity))
            .await
        {
            Ok(announcement) => announcement,
            Err(source) => {
                let rolled_back = self.roll_back(&record, &audit, &source).await;
                return Err(FinalizeError::Publish { source, rolled_back });
            }
        };
        self.audit.emit(
            AuditEvent::new(
                &audit,
                "submission.published",
                AuditCategory::Submission,
                AuditOutcome::Success,
            )
            .with_metadata("channel_id", announcement.channel_id.clone())
            .with_metadata("message_id", announcement.message_id.clone()),
        );

        let ticket = if draft.consent {
            let request = ModerationRequest {
                submission_id: record.id.clone(),
                announcement_link: announcement.permalink.clone(),
                display_identity: identity.clone(),
                platform_username: draft.username.clone(),
                message: record.message.clone(),
                image_url: record.picture.clone(),
                submitted_at: record.last_updated,
            };
            Some(self.moderation.open_ticket(&request, correlation_id).await?)
        } else {
            None
        };

        info!(
            event_name = "submission.finalized",
            correlation_id = %correlation_id,
            submission_id = %record.id,
            user_id = %draft.user_id,
            website = record.website,
            has_image = record.picture.is_some(),
            "submission finalized"
        );

        Ok(FinalizeReceipt { record, identity, announcement, ticket, image_warning })
    }

    /// A failed or slow upload drops the image; the submission itself goes ahead.
    async fn store_image(
        &self,
        draft: &Draft,
        audit: &AuditContext,
    ) -> (Option<String>, Option<&'static str>) {
        let Some(image) = &draft.image else {
            return (None, None);
        };

        let failure = match tokio::time::timeout(self.settings.upload_timeout, self.images.store(image))
            .await
        {
            Ok(Ok(url)) => {
                self.audit.emit(AuditEvent::new(
                    audit,
                    "submission.image_stored",
                    AuditCategory::Submission,
                    AuditOutcome::Success,
                ));
                return (Some(url), None);
            }
            Ok(Err(error)) => error.to_string(),
            Err(_) => format!("upload exceeded {}s", self.settings.upload_timeout.as_secs()),
        };

        warn!(
            event_name = "submission.image_skipped",
            correlation_id = %audit.correlation_id,
            user_id = %draft.user_id,
            error = %failure,
            "image upload failed; continuing without image"
        );
        self.audit.emit(
            AuditEvent::new(
                audit,
                "submission.image_skipped",
                AuditCategory::Submission,
                AuditOutcome::Failed,
            )
            .with_metadata("error", failure),
        );
        (None, Some(IMAGE_SKIPPED_WARNING))
    }

    async fn roll_back(
        &self,
        record: &SubmissionRecord,
        audit: &AuditContext,
        cause: &SurfaceError,
    ) -> bool {
        match self.repository.delete(&record.id).await {
            Ok(()) => {
                warn!(
                    event_name = "submission.rollback_applied",
                    correlation_id = %audit.correlation_id,
                    submission_id = %record.id,
                    error = %cause,
                    "announcement failed; submission record removed"
                );
                self.audit.emit(
                    AuditEvent::new(
                        audit,
                        "submission.rollback_applied",
                        AuditCategory::Submission,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", cause.to_string()),
                );
                true
            }
            Err(delete_error) => {
                error!(
                    event_name = "submission.rollback_failed",
                    correlation_id = %audit.correlation_id,
                    submission_id = %record.id,
                    error = %cause,
                    delete_error = %delete_error,
                    "announcement failed and the submission record could not be removed"
                );
                self.audit.emit(
                    AuditEvent::new(
                        audit,
                        "submission.rollback_failed",
                        AuditCategory::Persistence,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", cause.to_string())
                    .with_metadata("delete_error", delete_error.to_string()),
                );
                false
            }
        }
    }
}
