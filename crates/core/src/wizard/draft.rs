use chrono::{DateTime, Utc};
use url::Url;

use crate::content_filter::ContentFilter;
use crate::domain::image::DraftImage;
use crate::errors::{DomainError, DraftField, ValidationFailure};
use crate::wizard::states::{TransitionOutcome, WizardContext, WizardStep};

pub const MESSAGE_MIN_CHARS: usize = 10;
pub const MESSAGE_MAX_CHARS: usize = 1000;
pub const NAME_MAX_CHARS: usize = 100;
pub const ANONYMOUS_IDENTITY: &str = "Anonymous";

/// In-progress submission for one user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Draft {
    pub user_id: String,
    pub username: String,
    pub channel_id: String,
    pub step: WizardStep,
    pub message: Option<String>,
    /// `None` means the submitter left the name blank.
    pub display_name: Option<String>,
    pub consent: bool,
    pub share_username: bool,
    pub image: Option<DraftImage>,
    pub returning_to_review: bool,
    pub started_at: DateTime<Utc>,
    /// Refreshed on every committed change; the idle sweep keys on it.
    pub last_active: DateTime<Utc>,
}

impl Draft {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        channel_id: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            channel_id: channel_id.into(),
            step: WizardStep::Message,
            message: None,
            display_name: None,
            consent: false,
            share_username: false,
            image: None,
            returning_to_review: false,
            started_at,
            last_active: started_at,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.display_name.is_none()
    }

    pub fn context(&self) -> WizardContext {
        WizardContext {
            anonymous: self.is_anonymous(),
            returning_to_review: self.returning_to_review,
        }
    }

    /// Explicit name, then the shared platform username, then the anonymous label.
    pub fn effective_identity(&self) -> String {
        match (&self.display_name, self.share_username) {
            (Some(name), _) => name.clone(),
            (None, true) => self.username.clone(),
            (None, false) => ANONYMOUS_IDENTITY.to_owned(),
        }
    }

    /// Platform username to persist; only kept when the submitter opted to share it.
    pub fn shared_username(&self) -> Option<String> {
        (self.is_anonymous() && self.share_username).then(|| self.username.clone())
    }

    pub fn advance(&mut self, outcome: &TransitionOutcome) {
        self.step = outcome.to;
        if outcome.to == WizardStep::Review {
            self.returning_to_review = true;
        }
    }
}

pub fn validate_message(filter: &ContentFilter, raw: &str) -> Result<String, DomainError> {
    let message = raw.trim();
    let reason = match message.chars().count() {
        0 => Some(ValidationFailure::Empty),
        count if count < MESSAGE_MIN_CHARS => {
            Some(ValidationFailure::TooShort { min_chars: MESSAGE_MIN_CHARS })
        }
        count if count > MESSAGE_MAX_CHARS => {
            Some(ValidationFailure::TooLong { max_chars: MESSAGE_MAX_CHARS })
        }
        _ => None,
    };
    if let Some(reason) = reason {
        return Err(DomainError::Validation { field: DraftField::Message, reason });
    }
    if filter.is_inappropriate(message) {
        return Err(DomainError::ContentPolicy { field: DraftField::Message });
    }
    Ok(message.to_owned())
}

/// Returns `None` for a blank name, which marks the submission as anonymous.
pub fn validate_display_name(
    filter: &ContentFilter,
    raw: &str,
) -> Result<Option<String>, DomainError> {
    let name = raw.trim();
    if name.is_empty() {
        return Ok(None);
    }
    if name.chars().count() > NAME_MAX_CHARS {
        return Err(DomainError::Validation {
            field: DraftField::Name,
            reason: ValidationFailure::TooLong { max_chars: NAME_MAX_CHARS },
        });
    }
    if filter.is_inappropriate(name) {
        return Err(DomainError::ContentPolicy { field: DraftField::Name });
    }
    Ok(Some(name.to_owned()))
}

/// Re-checks a draft at confirm time, in case it was mutated outside the normal steps.
pub fn validate_for_submission(filter: &ContentFilter, draft: &Draft) -> Result<(), DomainError> {
    let message = draft.message.as_deref().ok_or(DomainError::Validation {
        field: DraftField::Message,
        reason: ValidationFailure::Empty,
    })?;
    validate_message(filter, message)?;

    if let Some(name) = draft.display_name.as_deref() {
        validate_display_name(filter, name)?;
    }

    if let Some(image) = &draft.image {
        let well_formed = Url::parse(&image.url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !well_formed {
            return Err(DomainError::Validation {
                field: DraftField::Image,
                reason: ValidationFailure::MalformedUrl,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::content_filter::ContentFilter;
    use crate::domain::image::DraftImage;
    use crate::errors::{DomainError, DraftField, ValidationFailure};
    use crate::wizard::draft::{
        validate_display_name, validate_for_submission, validate_message, Draft,
    };
    use crate::wizard::states::{TransitionOutcome, WizardEvent, WizardStep};

    fn draft() -> Draft {
        let mut draft = Draft::new("U1", "petal_fan", "C1", Utc::now());
        draft.message = Some("Happy to report I got the job today!".to_owned());
        draft
    }

    #[test]
    fn message_length_bounds_are_inclusive() {
        let filter = ContentFilter::default();

        assert!(validate_message(&filter, &"a".repeat(10)).is_ok());
        assert!(validate_message(&filter, &"a".repeat(1000)).is_ok());
        assert_eq!(
            validate_message(&filter, &"a".repeat(9)),
            Err(DomainError::Validation {
                field: DraftField::Message,
                reason: ValidationFailure::TooShort { min_chars: 10 },
            })
        );
        assert_eq!(
            validate_message(&filter, &"a".repeat(1001)),
            Err(DomainError::Validation {
                field: DraftField::Message,
                reason: ValidationFailure::TooLong { max_chars: 1000 },
            })
        );
    }

    #[test]
    fn message_is_trimmed_before_counting() {
        let filter = ContentFilter::default();

        assert!(validate_message(&filter, "   short    ").is_err());
        assert_eq!(
            validate_message(&filter, "  Thank you all so much  ").as_deref(),
            Ok("Thank you all so much")
        );
        assert!(matches!(
            validate_message(&filter, "    "),
            Err(DomainError::Validation { reason: ValidationFailure::Empty, .. })
        ));
    }

    #[test]
    fn profane_message_is_a_content_policy_error() {
        let filter = ContentFilter::default();

        assert_eq!(
            validate_message(&filter, "this is sh1t honestly"),
            Err(DomainError::ContentPolicy { field: DraftField::Message })
        );
    }

    #[test]
    fn blank_name_means_anonymous() {
        let filter = ContentFilter::default();

        assert_eq!(validate_display_name(&filter, "   "), Ok(None));
        assert_eq!(validate_display_name(&filter, " Rosa "), Ok(Some("Rosa".to_owned())));
        assert!(validate_display_name(&filter, &"n".repeat(101)).is_err());
        assert!(validate_display_name(&filter, &"n".repeat(100)).is_ok());
        assert_eq!(
            validate_display_name(&filter, "dickhead"),
            Err(DomainError::ContentPolicy { field: DraftField::Name })
        );
    }

    #[test]
    fn effective_identity_follows_precedence() {
        let mut draft = draft();
        assert_eq!(draft.effective_identity(), "Anonymous");
        assert_eq!(draft.shared_username(), None);

        draft.share_username = true;
        assert_eq!(draft.effective_identity(), "petal_fan");
        assert_eq!(draft.shared_username().as_deref(), Some("petal_fan"));

        draft.display_name = Some("Rosa".to_owned());
        assert_eq!(draft.effective_identity(), "Rosa");
        assert_eq!(draft.shared_username(), None);
    }

    #[test]
    fn reaching_review_marks_the_draft_as_returning() {
        let mut draft = draft();
        draft.step = WizardStep::Image;
        assert!(!draft.context().returning_to_review);

        draft.advance(&TransitionOutcome {
            from: WizardStep::Image,
            to: WizardStep::Review,
            event: WizardEvent::ImageSkipped,
            actions: Vec::new(),
        });

        assert_eq!(draft.step, WizardStep::Review);
        assert!(draft.context().returning_to_review);
    }

    #[test]
    fn final_validation_rechecks_every_field() {
        let filter = ContentFilter::default();
        let mut draft = draft();
        assert!(validate_for_submission(&filter, &draft).is_ok());

        draft.display_name = Some("f u c k".to_owned());
        assert!(matches!(
            validate_for_submission(&filter, &draft),
            Err(DomainError::ContentPolicy { field: DraftField::Name })
        ));

        draft.display_name = None;
        draft.image = Some(DraftImage {
            url: "not a url".to_owned(),
            content_type: "image/png".to_owned(),
            filename: "image.png".to_owned(),
        });
        assert!(matches!(
            validate_for_submission(&filter, &draft),
            Err(DomainError::Validation { field: DraftField::Image, .. })
        ));

        draft.image = None;
        draft.message = Some("too short".to_owned());
        assert!(validate_for_submission(&filter, &draft).is_err());

        draft.message = None;
        assert!(validate_for_submission(&filter, &draft).is_err());
    }
}
