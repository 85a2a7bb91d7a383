use thiserror::Error;

use crate::wizard::WizardTransitionError;

/// Free-text draft fields that are validated at the point of entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DraftField {
    Message,
    Name,
    Image,
}

impl DraftField {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Name => "name",
            Self::Image => "image",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationFailure {
    Empty,
    TooShort { min_chars: usize },
    TooLong { max_chars: usize },
    MalformedUrl,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed for {}: {reason:?}", field.label())]
    Validation { field: DraftField, reason: ValidationFailure },
    #[error("content policy rejected {}", field.label())]
    ContentPolicy { field: DraftField },
    #[error("no active submission session")]
    SessionExpired,
    #[error(transparent)]
    WizardTransition(#[from] WizardTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    /// Field-scoped text shown to the submitter; the draft is left untouched by these errors.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { field: DraftField::Message, reason } => match reason {
                ValidationFailure::Empty => {
                    "❌ Message cannot be empty. Please provide your flower message.".to_owned()
                }
                ValidationFailure::TooShort { min_chars } => {
                    format!("❌ Please provide at least {min_chars} characters for your message.")
                }
                ValidationFailure::TooLong { max_chars } => format!(
                    "❌ Message is too long. Please keep it under {max_chars} characters."
                ),
                ValidationFailure::MalformedUrl => {
                    "❌ Your message could not be processed. Please edit it and try again."
                        .to_owned()
                }
            },
            Self::Validation { field: DraftField::Name, reason } => match reason {
                ValidationFailure::TooLong { max_chars } => {
                    format!("❌ Name is too long. Please keep it under {max_chars} characters.")
                }
                _ => "❌ That name could not be used. Please enter a different name or leave it blank."
                    .to_owned(),
            },
            Self::Validation { field: DraftField::Image, .. } => {
                "❌ Invalid image URL. Please try uploading the image again.".to_owned()
            }
            Self::ContentPolicy { field: DraftField::Message } => {
                "❌ Your message contains inappropriate language. Please keep it positive and respectful."
                    .to_owned()
            }
            Self::ContentPolicy { field: DraftField::Name } => {
                "❌ Your name contains inappropriate language. Please enter a different name or leave blank."
                    .to_owned()
            }
            Self::ContentPolicy { field: DraftField::Image } => {
                "❌ That image could not be accepted. Please choose a different one.".to_owned()
            }
            Self::SessionExpired => "Session expired. Run /flower again.".to_owned(),
            Self::WizardTransition(_) => {
                "That step is no longer active. Use the latest prompt, or run /flower again."
                    .to_owned()
            }
            Self::InvariantViolation(_) => {
                "Something went wrong with your submission. Please run /flower again.".to_owned()
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("integrity failure: {0}")]
    Integrity(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "Your submission could not be processed. Check your answers and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "Something went wrong while saving your flower. Please try again shortly."
            }
            Self::Internal { .. } => "An unexpected error occurred. Please run /flower again.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Integrity(message) | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
