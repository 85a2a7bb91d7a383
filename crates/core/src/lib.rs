pub mod audit;
pub mod collector;
pub mod config;
pub mod content_filter;
pub mod domain;
pub mod errors;
pub mod moderation;
pub mod wizard;

pub use collector::{CollectedMessage, CollectorHandle, CollectorOutcome, CollectorRegistry};
pub use content_filter::ContentFilter;
pub use domain::image::{DraftImage, ImageAttachment, ImageRejection};
pub use domain::submission::{
    FieldUpdateError, NewSubmission, SubmissionField, SubmissionId, SubmissionRecord,
};
pub use errors::{ApplicationError, DomainError, DraftField, InterfaceError, ValidationFailure};
pub use moderation::{
    ModerationDecision, ModerationRequest, ModerationTicket, TicketBook, TicketStatus,
};
pub use wizard::{
    Draft, SessionTable, WizardAction, WizardEngine, WizardEvent, WizardFeatures, WizardStep,
};
