use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::submission::SubmissionId;

pub const REVIEW_MESSAGE_LIMIT: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModerationDecision {
    Approve,
    Decline,
}

impl ModerationDecision {
    pub fn approved(&self) -> bool {
        matches!(self, Self::Approve)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Decline => "decline",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    Pending,
    /// A moderator's decision is being written to the store.
    Deciding { decision: ModerationDecision, moderator_id: String },
    Decided { decision: ModerationDecision, moderator_id: String, decided_at: DateTime<Utc> },
}

impl TicketStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Decided { .. })
    }

    pub fn label(&self) -> String {
        match self {
            Self::Pending => "⏳ Awaiting moderation decision".to_owned(),
            Self::Deciding { moderator_id, .. } => {
                format!("⏳ Decision in progress by <@{moderator_id}>")
            }
            Self::Decided { decision, moderator_id, decided_at } => {
                let verdict = match decision {
                    ModerationDecision::Approve => "✅ **APPROVED**",
                    ModerationDecision::Decline => "❌ **DECLINED**",
                };
                format!("{verdict} by <@{moderator_id}> at <t:{}:F>", decided_at.timestamp())
            }
        }
    }
}

/// Everything the review card needs about one published submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationRequest {
    pub submission_id: SubmissionId,
    pub announcement_link: String,
    pub display_identity: String,
    pub platform_username: String,
    pub message: String,
    pub image_url: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl ModerationRequest {
    pub fn submitted_by(&self) -> String {
        format!("{} (Display: {})", self.platform_username, self.display_identity)
    }

    pub fn message_preview(&self) -> String {
        truncate_for_review(&self.message)
    }
}

pub fn truncate_for_review(message: &str) -> String {
    if message.chars().count() <= REVIEW_MESSAGE_LIMIT {
        return message.to_owned();
    }
    let kept: String = message.chars().take(REVIEW_MESSAGE_LIMIT - 3).collect();
    format!("{kept}...")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModerationTicket {
    pub submission_id: SubmissionId,
    pub channel_id: String,
    pub message_id: String,
    pub status: TicketStatus,
}

/// Ticket status per submission for the life of the process.
///
/// A submission with no entry (for example after a restart) reads as pending.
#[derive(Clone, Default)]
pub struct TicketBook {
    tickets: Arc<Mutex<HashMap<SubmissionId, ModerationTicket>>>,
}

impl TicketBook {
    pub fn open(&self, ticket: ModerationTicket) {
        self.lock().insert(ticket.submission_id.clone(), ticket);
    }

    pub fn get(&self, submission_id: &SubmissionId) -> Option<ModerationTicket> {
        self.lock().get(submission_id).cloned()
    }

    pub fn status(&self, submission_id: &SubmissionId) -> TicketStatus {
        self.get(submission_id).map(|ticket| ticket.status).unwrap_or(TicketStatus::Pending)
    }

    /// Moves a pending ticket to `Deciding` so only one press writes the decision.
    ///
    /// Returns the current status when the ticket is already claimed or decided.
    pub fn claim(
        &self,
        submission_id: &SubmissionId,
        channel_id: &str,
        message_id: &str,
        decision: ModerationDecision,
        moderator_id: &str,
    ) -> Result<(), TicketStatus> {
        let mut tickets = self.lock();
        let ticket = tickets.entry(submission_id.clone()).or_insert_with(|| ModerationTicket {
            submission_id: submission_id.clone(),
            channel_id: channel_id.to_owned(),
            message_id: message_id.to_owned(),
            status: TicketStatus::Pending,
        });
        if ticket.status != TicketStatus::Pending {
            return Err(ticket.status.clone());
        }
        ticket.status = TicketStatus::Deciding { decision, moderator_id: moderator_id.to_owned() };
        Ok(())
    }

    /// Returns a claimed ticket to `Pending` after its decision failed to persist.
    pub fn release(&self, submission_id: &SubmissionId) {
        if let Some(ticket) = self.lock().get_mut(submission_id) {
            if matches!(ticket.status, TicketStatus::Deciding { .. }) {
                ticket.status = TicketStatus::Pending;
            }
        }
    }

    /// Records a decision. Returns the existing status unchanged if one was already recorded.
    pub fn decide(
        &self,
        submission_id: &SubmissionId,
        channel_id: &str,
        message_id: &str,
        status: TicketStatus,
    ) -> TicketStatus {
        let mut tickets = self.lock();
        let ticket = tickets.entry(submission_id.clone()).or_insert_with(|| ModerationTicket {
            submission_id: submission_id.clone(),
            channel_id: channel_id.to_owned(),
            message_id: message_id.to_owned(),
            status: TicketStatus::Pending,
        });
        if !ticket.status.is_terminal() {
            ticket.status = status;
        }
        ticket.status.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubmissionId, ModerationTicket>> {
        match self.tickets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::domain::submission::SubmissionId;
    use crate::moderation::{
        truncate_for_review, ModerationDecision, ModerationRequest, ModerationTicket, TicketBook,
        TicketStatus,
    };

    fn decided(decision: ModerationDecision, moderator: &str) -> TicketStatus {
        TicketStatus::Decided {
            decision,
            moderator_id: moderator.to_owned(),
            decided_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("timestamp"),
        }
    }

    #[test]
    fn unknown_ticket_reads_as_pending() {
        let book = TicketBook::default();
        assert_eq!(book.status(&SubmissionId("missing".to_owned())), TicketStatus::Pending);
    }

    #[test]
    fn first_decision_wins() {
        let book = TicketBook::default();
        let id = SubmissionId("sub-1".to_owned());
        book.open(ModerationTicket {
            submission_id: id.clone(),
            channel_id: "MOD".to_owned(),
            message_id: "T1".to_owned(),
            status: TicketStatus::Pending,
        });

        let first = book.decide(&id, "MOD", "T1", decided(ModerationDecision::Approve, "M1"));
        let second = book.decide(&id, "MOD", "T1", decided(ModerationDecision::Decline, "M2"));

        assert_eq!(first, second);
        assert!(matches!(
            book.status(&id),
            TicketStatus::Decided { decision: ModerationDecision::Approve, .. }
        ));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn claimed_ticket_rejects_a_second_claim_until_released() {
        let book = TicketBook::default();
        let id = SubmissionId("sub-2".to_owned());

        book.claim(&id, "MOD", "T2", ModerationDecision::Approve, "M1").expect("first claim");
        let blocked = book
            .claim(&id, "MOD", "T2", ModerationDecision::Decline, "M2")
            .expect_err("second claim");
        assert_eq!(
            blocked,
            TicketStatus::Deciding {
                decision: ModerationDecision::Approve,
                moderator_id: "M1".to_owned()
            }
        );
        assert!(!blocked.is_terminal());

        book.release(&id);
        assert_eq!(book.status(&id), TicketStatus::Pending);
        book.claim(&id, "MOD", "T2", ModerationDecision::Decline, "M2").expect("retry claim");

        book.decide(&id, "MOD", "T2", decided(ModerationDecision::Decline, "M2"));
        book.release(&id);
        assert!(book.status(&id).is_terminal(), "release leaves decided tickets alone");
        assert!(book.claim(&id, "MOD", "T2", ModerationDecision::Approve, "M1").is_err());
    }

    #[test]
    fn status_labels_carry_moderator_and_time() {
        assert_eq!(TicketStatus::Pending.label(), "⏳ Awaiting moderation decision");

        let label = decided(ModerationDecision::Approve, "M1").label();
        assert!(label.starts_with("✅ **APPROVED** by <@M1> at <t:"));
        assert!(decided(ModerationDecision::Decline, "M1").label().starts_with("❌ **DECLINED**"));
    }

    #[test]
    fn long_messages_are_truncated_for_review() {
        let short = "a".repeat(1024);
        let long = "b".repeat(1500);

        assert_eq!(truncate_for_review(&short), short);
        let truncated = truncate_for_review(&long);
        assert_eq!(truncated.chars().count(), 1024);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn submitted_by_shows_username_and_display_identity() {
        let request = ModerationRequest {
            submission_id: SubmissionId("sub-1".to_owned()),
            announcement_link: "https://chat.example.test/C1/M1".to_owned(),
            display_identity: "Anonymous".to_owned(),
            platform_username: "petal_fan".to_owned(),
            message: "Happy to report I got the job today!".to_owned(),
            image_url: None,
            submitted_at: Utc::now(),
        };

        assert_eq!(request.submitted_by(), "petal_fan (Display: Anonymous)");
        assert_eq!(request.message_preview(), request.message);
    }
}
