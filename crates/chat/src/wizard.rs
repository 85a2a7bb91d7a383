//! The submission wizard as seen from chat.
//!
//! [`FlowerWizard`] owns the session table and the collector registry. Every interaction
//! resolves the caller's draft, asks the [`WizardEngine`] whether the event is legal from
//! the draft's step, applies the field change, and answers with the prompt for the step the
//! draft landed on. Image capture runs as a background task per user that reports back
//! through an ephemeral follow-up once the collector resolves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowerbot_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use flowerbot_core::collector::{CollectedMessage, CollectorOutcome, CollectorRegistry};
use flowerbot_core::config::AppConfig;
use flowerbot_core::content_filter::ContentFilter;
use flowerbot_core::domain::image::{accept_image, ImageRejection};
use flowerbot_core::errors::DomainError;
use flowerbot_core::wizard::{
    validate_display_name, validate_for_submission, validate_message, Draft, EditableField,
    SessionTable, TransitionOutcome, WizardAction, WizardEngine, WizardEvent, WizardStep,
};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::blocks::{self, MessageTemplate, ModalTemplate, Reply};
use crate::commands::{CommandEnvelope, CommandRouteError, FlowerCommandService};
use crate::events::{
    ButtonPressEvent, EventContext, EventHandlerError, ModalSubmitEvent, ModalSubmitService,
};
use crate::finalizer::Finalizer;
use crate::images::ImageStore;
use crate::surface::ChatSurface;

const ACTOR: &str = "flower-wizard";

#[derive(Clone, Debug)]
pub struct WizardSettings {
    pub capture_window: Duration,
    pub max_image_bytes: u64,
    pub session_idle: Duration,
}

impl WizardSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            capture_window: config.wizard.image_capture_window(),
            max_image_bytes: config.wizard.max_image_bytes,
            session_idle: config.wizard.session_idle(),
        }
    }
}

#[derive(Clone)]
pub struct FlowerWizard {
    engine: WizardEngine,
    sessions: SessionTable,
    collectors: CollectorRegistry,
    captures: TaskTracker,
    filter: Arc<ContentFilter>,
    surface: Arc<dyn ChatSurface>,
    images: Arc<dyn ImageStore>,
    finalizer: Arc<Finalizer>,
    audit: Arc<dyn AuditSink>,
    settings: WizardSettings,
}

impl FlowerWizard {
    pub fn new(
        engine: WizardEngine,
        settings: WizardSettings,
        surface: Arc<dyn ChatSurface>,
        images: Arc<dyn ImageStore>,
        finalizer: Arc<Finalizer>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            engine,
            sessions: SessionTable::default(),
            collectors: CollectorRegistry::default(),
            captures: TaskTracker::new(),
            filter: Arc::new(ContentFilter::default()),
            surface,
            images,
            finalizer,
            audit,
            settings,
        }
    }

    pub fn with_filter(mut self, filter: ContentFilter) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn collectors(&self) -> &CollectorRegistry {
        &self.collectors
    }

    /// Waits for every image capture task started so far to report back.
    pub async fn settle_captures(&self) {
        self.captures.close();
        self.captures.wait().await;
        self.captures.reopen();
    }

    /// Drops drafts idle for longer than the configured window and stops their collectors.
    pub fn expire_idle_sessions(&self, now: DateTime<Utc>) -> usize {
        let idle = chrono::Duration::from_std(self.settings.session_idle)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let expired = self.sessions.expire_idle(now, idle);
        for draft in &expired {
            self.collectors.stop(&draft.user_id);
            self.audit.emit(
                AuditEvent::new(
                    &self.audit_context(&draft.user_id, "idle-sweep"),
                    "wizard.session_expired",
                    AuditCategory::Wizard,
                    AuditOutcome::Rejected,
                )
                .with_metadata("step", format!("{:?}", draft.step)),
            );
        }
        if !expired.is_empty() {
            info!(
                event_name = "wizard.sessions_expired",
                correlation_id = "idle-sweep",
                expired = expired.len(),
                remaining = self.sessions.len(),
                "dropped idle drafts"
            );
        }
        expired.len()
    }

    /// Runs [`Self::expire_idle_sessions`] on a fixed period until `shutdown` fires.
    pub async fn sweep_idle_sessions(&self, period: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    self.expire_idle_sessions(Utc::now());
                }
            }
        }
    }

    /// Stops any live collector and replaces the caller's draft with a fresh one.
    pub fn start(
        &self,
        user_id: &str,
        username: &str,
        channel_id: &str,
        correlation_id: &str,
    ) -> Reply {
        let stopped_collector = self.collectors.stop(user_id);
        let replaced =
            self.sessions.start(Draft::new(user_id, username, channel_id, Utc::now())).is_some();

        self.audit.emit(
            AuditEvent::new(
                &self.audit_context(user_id, correlation_id),
                "wizard.session_started",
                AuditCategory::Wizard,
                AuditOutcome::Success,
            )
            .with_metadata("replaced_draft", replaced.to_string())
            .with_metadata("stopped_collector", stopped_collector.to_string()),
        );
        Reply::Message(blocks::message_prompt())
    }

    pub async fn press(&self, event: &ButtonPressEvent, ctx: &EventContext) -> Reply {
        let user_id = event.interaction.user_id.as_str();
        let result = match event.action_id.as_str() {
            blocks::MESSAGE_OPEN_ACTION | blocks::REVIEW_EDIT_MESSAGE_ACTION => self
                .open_editor(user_id, WizardEvent::MessageAccepted, |draft| {
                    blocks::message_modal(draft.message.as_deref())
                }),
            blocks::NAME_OPEN_ACTION | blocks::REVIEW_EDIT_NAME_ACTION => self.open_editor(
                user_id,
                WizardEvent::NameAccepted { anonymous: true },
                |draft| blocks::name_modal(draft.display_name.as_deref()),
            ),
            blocks::CONSENT_YES_ACTION | blocks::CONSENT_NO_ACTION => {
                let consent = event.action_id == blocks::CONSENT_YES_ACTION;
                self.step(user_id, ctx, WizardEvent::ConsentChosen, |draft| draft.consent = consent)
            }
            blocks::SHARE_YES_ACTION | blocks::SHARE_NO_ACTION => {
                let share = event.action_id == blocks::SHARE_YES_ACTION;
                self.step(user_id, ctx, WizardEvent::ShareUsernameChosen, |draft| {
                    draft.share_username = share
                })
            }
            blocks::IMAGE_UPLOAD_ACTION => {
                self.step(user_id, ctx, WizardEvent::ImageCaptureStarted, |_| {})
            }
            blocks::IMAGE_SKIP_ACTION => self.step(user_id, ctx, WizardEvent::ImageSkipped, |_| {}),
            blocks::REVIEW_EDIT_CONSENT_ACTION => self.step(
                user_id,
                ctx,
                WizardEvent::EditRequested(EditableField::Consent),
                |_| {},
            ),
            blocks::REVIEW_EDIT_SHARING_ACTION => self.step(
                user_id,
                ctx,
                WizardEvent::EditRequested(EditableField::ShareUsername),
                |_| {},
            ),
            blocks::REVIEW_REPLACE_IMAGE_ACTION => {
                self.step(user_id, ctx, WizardEvent::EditRequested(EditableField::Image), |_| {})
            }
            blocks::REVIEW_CONFIRM_ACTION => return self.confirm(user_id, ctx).await,
            other => {
                debug!(
                    event_name = "wizard.action_unknown",
                    correlation_id = %ctx.correlation_id,
                    action_id = %other,
                    "unrecognised wizard action"
                );
                return notice(
                    "That button is no longer available. Run /flower to start a new submission.",
                );
            }
        };

        result.unwrap_or_else(|error| self.reject(user_id, ctx, error))
    }

    pub fn submit_modal(&self, event: &ModalSubmitEvent, ctx: &EventContext) -> Reply {
        let user_id = event.interaction.user_id.as_str();
        let result = match event.modal_id.as_str() {
            blocks::MESSAGE_MODAL_ID => validate_message(&self.filter, &event.value)
                .and_then(|message| {
                    self.step(user_id, ctx, WizardEvent::MessageAccepted, |draft| {
                        draft.message = Some(message)
                    })
                }),
            blocks::NAME_MODAL_ID => {
                validate_display_name(&self.filter, &event.value).and_then(|name| {
                    let anonymous = name.is_none();
                    self.step(user_id, ctx, WizardEvent::NameAccepted { anonymous }, |draft| {
                        if !anonymous {
                            draft.share_username = false;
                        }
                        draft.display_name = name;
                    })
                })
            }
            other => {
                debug!(
                    event_name = "wizard.modal_unknown",
                    correlation_id = %ctx.correlation_id,
                    modal_id = %other,
                    "unrecognised modal submission"
                );
                return notice("That form is no longer active. Run /flower to start again.");
            }
        };

        result.unwrap_or_else(|error| self.reject(user_id, ctx, error))
    }

    /// Opens a field editor if the draft's current step can accept the edited value.
    fn open_editor<F>(
        &self,
        user_id: &str,
        event: WizardEvent,
        modal: F,
    ) -> Result<Reply, DomainError>
    where
        F: FnOnce(&Draft) -> ModalTemplate,
    {
        let draft = self.sessions.require(user_id)?;
        self.engine.apply(draft.step, &event, &draft.context())?;
        Ok(Reply::Modal(modal(&draft)))
    }

    fn step<F>(
        &self,
        user_id: &str,
        ctx: &EventContext,
        event: WizardEvent,
        change: F,
    ) -> Result<Reply, DomainError>
    where
        F: FnOnce(&mut Draft),
    {
        let audit = self.audit_context(user_id, &ctx.correlation_id);
        let (outcome, draft) = self.sessions.update(user_id, |draft| {
            let outcome = self.engine.apply_with_audit(
                draft.step,
                &event,
                &draft.context(),
                self.audit.as_ref(),
                &audit,
            )?;
            change(draft);
            draft.advance(&outcome);
            Ok(outcome)
        })?;

        for action in &outcome.actions {
            match action {
                WizardAction::StartImageCapture => self.begin_capture(&draft, ctx),
                WizardAction::StopImageCapture => {
                    self.collectors.stop(user_id);
                }
                _ => {}
            }
        }
        Ok(Reply::Message(self.render(&outcome, &draft)))
    }

    fn render(&self, outcome: &TransitionOutcome, draft: &Draft) -> MessageTemplate {
        let window_secs = self.settings.capture_window.as_secs();
        let prompt = outcome.actions.iter().find_map(|action| match action {
            WizardAction::PromptMessage => Some(blocks::message_prompt()),
            WizardAction::PromptName => Some(blocks::name_prompt()),
            WizardAction::PromptConsent => Some(blocks::consent_prompt()),
            WizardAction::PromptShareUsername => Some(blocks::share_username_prompt()),
            WizardAction::PromptImage => {
                Some(blocks::image_prompt(draft.image.is_some(), window_secs))
            }
            WizardAction::StartImageCapture => Some(blocks::image_capture_started(window_secs)),
            WizardAction::ShowReview => Some(self.review(draft)),
            WizardAction::StopImageCapture | WizardAction::Finalize => None,
        });
        prompt.unwrap_or_else(|| self.render_step(draft))
    }

    fn render_step(&self, draft: &Draft) -> MessageTemplate {
        match draft.step {
            WizardStep::Message => blocks::message_prompt(),
            WizardStep::Name => blocks::name_prompt(),
            WizardStep::Consent => blocks::consent_prompt(),
            WizardStep::ShareUsername => blocks::share_username_prompt(),
            WizardStep::Image => blocks::image_prompt(
                draft.image.is_some(),
                self.settings.capture_window.as_secs(),
            ),
            WizardStep::Review => self.review(draft),
        }
    }

    fn review(&self, draft: &Draft) -> MessageTemplate {
        blocks::review_card(draft, self.engine.features().ask_share_username)
    }

    async fn confirm(&self, user_id: &str, ctx: &EventContext) -> Reply {
        let audit = self.audit_context(user_id, &ctx.correlation_id);
        let taken = self.sessions.take_if(user_id, |draft| {
            let outcome = self.engine.apply_with_audit(
                draft.step,
                &WizardEvent::ConfirmRequested,
                &draft.context(),
                self.audit.as_ref(),
                &audit,
            )?;
            validate_for_submission(&self.filter, draft)?;
            Ok(outcome)
        });
        let (outcome, draft) = match taken {
            Ok(taken) => taken,
            Err(error) => return self.reject(user_id, ctx, error),
        };

        if outcome.actions.contains(&WizardAction::StopImageCapture) {
            self.collectors.stop(user_id);
        }
        if !outcome.actions.contains(&WizardAction::Finalize) {
            return notice("Nothing to submit yet. Finish the remaining steps first.");
        }

        let consent = draft.consent;
        match self.finalizer.finalize(draft, &ctx.correlation_id).await {
            Ok(receipt) => {
                Reply::Message(blocks::submission_acknowledgement(consent, receipt.image_warning))
            }
            Err(error) => {
                warn!(
                    event_name = "wizard.finalize_failed",
                    correlation_id = %ctx.correlation_id,
                    user_id = %user_id,
                    error = %error,
                    "submission could not be finalized"
                );
                let interface = error.to_application().into_interface(ctx.correlation_id.clone());
                Reply::Message(blocks::error_message(
                    interface.user_message(),
                    interface.correlation_id(),
                ))
            }
        }
    }

    fn begin_capture(&self, draft: &Draft, ctx: &EventContext) {
        let handle = self.collectors.start(
            draft.user_id.clone(),
            draft.channel_id.clone(),
            self.settings.capture_window,
        );
        info!(
            event_name = "wizard.image_capture_started",
            correlation_id = %ctx.correlation_id,
            user_id = %draft.user_id,
            channel_id = %draft.channel_id,
            window_secs = self.settings.capture_window.as_secs(),
            "waiting for image upload"
        );

        let wizard = self.clone();
        let user_id = draft.user_id.clone();
        let channel_id = draft.channel_id.clone();
        let correlation_id = ctx.correlation_id.clone();
        self.captures.spawn(async move {
            let outcome = handle.wait().await;
            wizard.finish_capture(&user_id, &channel_id, outcome, &correlation_id).await;
        });
    }

    async fn finish_capture(
        &self,
        user_id: &str,
        channel_id: &str,
        outcome: CollectorOutcome,
        correlation_id: &str,
    ) {
        let audit = self.audit_context(user_id, correlation_id);
        match outcome {
            CollectorOutcome::Matched(message) => {
                self.accept_capture(user_id, channel_id, message, correlation_id).await;
            }
            CollectorOutcome::TimedOut => {
                self.audit.emit(AuditEvent::new(
                    &audit,
                    "wizard.image_capture_timed_out",
                    AuditCategory::Wizard,
                    AuditOutcome::Rejected,
                ));
                let Some(draft) = self.sessions.get(user_id) else {
                    return;
                };
                let message = blocks::image_capture_timeout(
                    draft.image.is_some(),
                    self.settings.capture_window.as_secs(),
                );
                self.follow_up(channel_id, user_id, &message).await;
            }
            CollectorOutcome::Cancelled => {
                debug!(
                    event_name = "wizard.image_capture_cancelled",
                    correlation_id = %correlation_id,
                    user_id = %user_id,
                    "image capture stopped before a match"
                );
            }
        }
    }

    async fn accept_capture(
        &self,
        user_id: &str,
        channel_id: &str,
        message: CollectedMessage,
        correlation_id: &str,
    ) {
        let image = match accept_image(&message.attachments, self.settings.max_image_bytes) {
            Ok(image) => image,
            Err(rejection) => {
                self.capture_rejected(user_id, channel_id, correlation_id, &rejection).await;
                return;
            }
        };
        if let Err(error) = self.images.check_reachable(&image.url).await {
            warn!(
                event_name = "wizard.image_unreachable",
                correlation_id = %correlation_id,
                user_id = %user_id,
                error = %error,
                "captured image is not reachable"
            );
            self.capture_rejected(user_id, channel_id, correlation_id, &ImageRejection::Unreachable)
                .await;
            return;
        }

        let ctx = EventContext { correlation_id: correlation_id.to_owned() };
        let reply = self.step(user_id, &ctx, WizardEvent::ImageCaptured, |draft| {
            draft.image = Some(image)
        });
        let follow_up = match reply {
            Ok(Reply::Message(template)) => {
                info!(
                    event_name = "wizard.image_captured",
                    correlation_id = %correlation_id,
                    user_id = %user_id,
                    message_id = %message.message_id,
                    "image attached to draft"
                );
                self.discard_upload(&message, correlation_id).await;
                template
            }
            Ok(Reply::Modal(_)) => return,
            Err(error) => blocks::notice("flower.capture.failed.v1", &error.user_message()),
        };
        self.follow_up(channel_id, user_id, &follow_up).await;
    }

    /// Removes the raw upload from the channel; lacking permission is not an error.
    async fn discard_upload(&self, message: &CollectedMessage, correlation_id: &str) {
        if let Err(error) =
            self.surface.delete_message(&message.channel_id, &message.message_id).await
        {
            debug!(
                event_name = "wizard.upload_cleanup_skipped",
                correlation_id = %correlation_id,
                message_id = %message.message_id,
                error = %error,
                "could not remove uploaded image message"
            );
        }
    }

    async fn capture_rejected(
        &self,
        user_id: &str,
        channel_id: &str,
        correlation_id: &str,
        rejection: &ImageRejection,
    ) {
        self.audit.emit(
            AuditEvent::new(
                &self.audit_context(user_id, correlation_id),
                "wizard.image_rejected",
                AuditCategory::Wizard,
                AuditOutcome::Rejected,
            )
            .with_metadata("reason", format!("{rejection:?}")),
        );
        let has_image = self.sessions.get(user_id).is_some_and(|draft| draft.image.is_some());
        let message = blocks::image_capture_retry(
            &rejection.user_message(),
            has_image,
            self.settings.capture_window.as_secs(),
        );
        self.follow_up(channel_id, user_id, &message).await;
    }

    async fn follow_up(&self, channel_id: &str, user_id: &str, message: &MessageTemplate) {
        if let Err(error) = self.surface.send_ephemeral(channel_id, user_id, message).await {
            warn!(
                event_name = "wizard.follow_up_failed",
                user_id = %user_id,
                channel_id = %channel_id,
                error = %error,
                "could not deliver wizard follow-up"
            );
        }
    }

    fn reject(&self, user_id: &str, ctx: &EventContext, error: DomainError) -> Reply {
        debug!(
            event_name = "wizard.input_rejected",
            correlation_id = %ctx.correlation_id,
            user_id = %user_id,
            error = %error,
            "wizard input rejected"
        );
        notice(&error.user_message())
    }

    fn audit_context(&self, user_id: &str, correlation_id: &str) -> AuditContext {
        AuditContext::new(None, Some(user_id.to_owned()), correlation_id, ACTOR)
    }
}

fn notice(text: &str) -> Reply {
    Reply::Message(blocks::notice("flower.wizard.notice.v1", text))
}

#[async_trait]
impl FlowerCommandService for FlowerWizard {
    async fn start_submission(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<Reply, CommandRouteError> {
        Ok(self.start(
            &envelope.interaction.user_id,
            &envelope.username,
            &envelope.interaction.channel_id,
            &envelope.request_id,
        ))
    }
}

#[async_trait]
impl ModalSubmitService for FlowerWizard {
    async fn handle_modal_submit(
        &self,
        event: &ModalSubmitEvent,
        ctx: &EventContext,
    ) -> Result<Option<Reply>, EventHandlerError> {
        Ok(Some(self.submit_modal(event, ctx)))
    }
}
