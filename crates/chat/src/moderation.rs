//! Review tickets for submissions that may appear on the website.
//!
//! A ticket is posted once per consenting submission. The first approve or decline press
//! claims the ticket, writes the `approved` flag, rewrites the ticket status and removes its
//! buttons. Presses on a ticket that is claimed or decided only re-confirm it and never touch
//! the store. A failed write releases the claim so the buttons stay usable.

use std::sync::Arc;

use chrono::Utc;
use flowerbot_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use flowerbot_core::domain::submission::{SubmissionField, SubmissionId};
use flowerbot_core::moderation::{
    ModerationDecision, ModerationRequest, ModerationTicket, TicketBook, TicketStatus,
};
use flowerbot_db::{RepositoryError, SubmissionRepository};
use thiserror::Error;
use tracing::warn;

use crate::blocks::{self, Reply, MODERATION_APPROVE_ACTION, MODERATION_DECLINE_ACTION};
use crate::events::{ButtonPressEvent, EventContext};
use crate::surface::{ChatSurface, MessageRef, SurfaceError};

const ACTOR: &str = "moderation-workflow";

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("could not post review ticket: {0}")]
    Post(#[from] SurfaceError),
    #[error("could not record moderation decision: {0}")]
    Persistence(#[from] RepositoryError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecisionOutcome {
    Recorded(TicketStatus),
    AlreadyDecided(TicketStatus),
}

pub struct ModerationWorkflow {
    repository: Arc<dyn SubmissionRepository>,
    surface: Arc<dyn ChatSurface>,
    audit: Arc<dyn AuditSink>,
    tickets: TicketBook,
    channel_id: String,
}

impl ModerationWorkflow {
    pub fn new(
        repository: Arc<dyn SubmissionRepository>,
        surface: Arc<dyn ChatSurface>,
        audit: Arc<dyn AuditSink>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self { repository, surface, audit, tickets: TicketBook::default(), channel_id: channel_id.into() }
    }

    pub fn tickets(&self) -> &TicketBook {
        &self.tickets
    }

    pub async fn open_ticket(
        &self,
        request: &ModerationRequest,
        correlation_id: &str,
    ) -> Result<MessageRef, ModerationError> {
        let audit = AuditContext::new(
            Some(request.submission_id.clone()),
            None,
            correlation_id,
            ACTOR,
        );
        let message = blocks::moderation_ticket(request, &TicketStatus::Pending);

        let ticket = match self.surface.post_review_ticket(&self.channel_id, &message).await {
            Ok(ticket) => ticket,
            Err(error) => {
                self.audit.emit(
                    AuditEvent::new(
                        &audit,
                        "moderation.ticket_failed",
                        AuditCategory::Moderation,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                return Err(error.into());
            }
        };

        self.tickets.open(ModerationTicket {
            submission_id: request.submission_id.clone(),
            channel_id: ticket.channel_id.clone(),
            message_id: ticket.message_id.clone(),
            status: TicketStatus::Pending,
        });
        self.audit.emit(
            AuditEvent::new(
                &audit,
                "moderation.ticket_opened",
                AuditCategory::Moderation,
                AuditOutcome::Success,
            )
            .with_metadata("channel_id", ticket.channel_id.clone())
            .with_metadata("message_id", ticket.message_id.clone()),
        );
        Ok(ticket)
    }

    /// Applies a decision from the ticket at `channel_id`/`message_id`.
    pub async fn decide(
        &self,
        submission_id: &SubmissionId,
        channel_id: &str,
        message_id: &str,
        moderator_id: &str,
        decision: ModerationDecision,
        correlation_id: &str,
    ) -> Result<DecisionOutcome, ModerationError> {
        let audit = AuditContext::new(
            Some(submission_id.clone()),
            Some(moderator_id.to_owned()),
            correlation_id,
            ACTOR,
        );

        if let Err(current) =
            self.tickets.claim(submission_id, channel_id, message_id, decision, moderator_id)
        {
            self.audit.emit(
                AuditEvent::new(
                    &audit,
                    "moderation.decision_repeated",
                    AuditCategory::Moderation,
                    AuditOutcome::Rejected,
                )
                .with_metadata("decision", decision.as_str()),
            );
            return Ok(DecisionOutcome::AlreadyDecided(current));
        }

        let approved = if decision.approved() { "true" } else { "false" };
        if let Err(error) = self
            .repository
            .update_field(submission_id, SubmissionField::Approved.as_str(), approved)
            .await
        {
            self.tickets.release(submission_id);
            self.audit.emit(
                AuditEvent::new(
                    &audit,
                    "moderation.decision_failed",
                    AuditCategory::Persistence,
                    AuditOutcome::Failed,
                )
                .with_metadata("decision", decision.as_str())
                .with_metadata("error", error.to_string()),
            );
            return Err(error.into());
        }

        let status = self.tickets.decide(
            submission_id,
            channel_id,
            message_id,
            TicketStatus::Decided {
                decision,
                moderator_id: moderator_id.to_owned(),
                decided_at: Utc::now(),
            },
        );
        self.audit.emit(
            AuditEvent::new(
                &audit,
                "moderation.decision_recorded",
                AuditCategory::Moderation,
                AuditOutcome::Success,
            )
            .with_metadata("decision", decision.as_str()),
        );

        let (ticket_channel, ticket_message) = match self.tickets.get(submission_id) {
            Some(ticket) => (ticket.channel_id, ticket.message_id),
            None => (channel_id.to_owned(), message_id.to_owned()),
        };
        if let Err(error) = self
            .surface
            .update_ticket(&ticket_channel, &ticket_message, &status.label(), true)
            .await
        {
            warn!(
                event_name = "moderation.ticket_update_failed",
                correlation_id = %correlation_id,
                submission_id = %submission_id,
                error = %error,
                "decision stored but ticket could not be updated"
            );
        }

        Ok(DecisionOutcome::Recorded(status))
    }

    /// Turns a ticket button press into a private reply for the moderator.
    pub async fn handle_press(&self, event: &ButtonPressEvent, ctx: &EventContext) -> Reply {
        let decision = match event.action_id.as_str() {
            MODERATION_APPROVE_ACTION => ModerationDecision::Approve,
            MODERATION_DECLINE_ACTION => ModerationDecision::Decline,
            other => {
                return notice(&format!("Unknown moderation action `{other}`."));
            }
        };
        let Some(submission_id) = event.value.as_deref().filter(|value| !value.is_empty()) else {
            return notice("❌ This ticket is missing its flower id.");
        };
        let submission_id = SubmissionId(submission_id.to_owned());

        let outcome = self
            .decide(
                &submission_id,
                &event.interaction.channel_id,
                &event.message_id,
                &event.interaction.user_id,
                decision,
                &ctx.correlation_id,
            )
            .await;

        match outcome {
            Ok(DecisionOutcome::Recorded(TicketStatus::Decided { decision, .. })) => {
                notice(decision_confirmation(decision))
            }
            Ok(DecisionOutcome::Recorded(_)) => {
                notice("⏳ This flower is still awaiting a decision.")
            }
            Ok(DecisionOutcome::AlreadyDecided(TicketStatus::Deciding { moderator_id, .. })) => {
                notice(&format!(
                    "⏳ <@{moderator_id}> is recording a decision for this flower right now."
                ))
            }
            Ok(DecisionOutcome::AlreadyDecided(status)) => {
                notice(&format!("ℹ️ This flower was already handled: {}", status.label()))
            }
            Err(error) => {
                warn!(
                    event_name = "moderation.decision_failed",
                    correlation_id = %ctx.correlation_id,
                    submission_id = %submission_id,
                    error = %error,
                    "moderation decision could not be recorded"
                );
                let verb = if decision.approved() { "approving" } else { "declining" };
                Reply::Message(blocks::error_message(
                    &format!("❌ An error occurred while {verb} this flower. Please try again."),
                    &ctx.correlation_id,
                ))
            }
        }
    }
}

fn decision_confirmation(decision: ModerationDecision) -> &'static str {
    match decision {
        ModerationDecision::Approve => "✅ Flower approved for website publication.",
        ModerationDecision::Decline => "❌ Flower declined. It will not appear on the website.",
    }
}

fn notice(text: &str) -> Reply {
    Reply::Message(blocks::notice("flower.moderation.notice.v1", text))
}
