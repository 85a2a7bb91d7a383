use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::wizard::states::{
    EditableField, TransitionOutcome, WizardAction, WizardContext, WizardEvent, WizardStep,
};

/// Optional branches of the submission wizard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WizardFeatures {
    /// Ask anonymous submitters whether their platform username may be shown.
    pub ask_share_username: bool,
}

impl Default for WizardFeatures {
    fn default() -> Self {
        Self { ask_share_username: true }
    }
}

#[derive(Clone, Debug, Default)]
pub struct WizardEngine {
    features: WizardFeatures,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WizardTransitionError {
    #[error("invalid transition from {step:?} using event {event:?}")]
    InvalidTransition { step: WizardStep, event: WizardEvent },
}

impl WizardEngine {
    pub fn new(features: WizardFeatures) -> Self {
        Self { features }
    }

    pub fn features(&self) -> WizardFeatures {
        self.features
    }

    pub fn initial_step(&self) -> WizardStep {
        WizardStep::Message
    }

    pub fn apply(
        &self,
        current: WizardStep,
        event: &WizardEvent,
        context: &WizardContext,
    ) -> Result<TransitionOutcome, WizardTransitionError> {
        use WizardAction::{
            Finalize, PromptConsent, PromptImage, PromptName, PromptShareUsername, ShowReview,
            StartImageCapture, StopImageCapture,
        };
        use WizardEvent::{
            ConfirmRequested, ConsentChosen, EditRequested, ImageCaptureStarted, ImageCaptured,
            ImageSkipped, MessageAccepted, NameAccepted, ShareUsernameChosen,
        };
        use WizardStep::{Consent, Image, Message, Name, Review, ShareUsername};

        let asks_sharing = |anonymous: bool| anonymous && self.features.ask_share_username;

        let (to, actions) = match (current, event) {
            (Message, MessageAccepted) => (Name, vec![PromptName]),
            (Review, MessageAccepted) => (Review, vec![ShowReview]),
            (Name, NameAccepted { .. }) => (Consent, vec![PromptConsent]),
            (Review, NameAccepted { anonymous }) if asks_sharing(*anonymous) => {
                (ShareUsername, vec![PromptShareUsername])
            }
            (Review, NameAccepted { .. }) => (Review, vec![ShowReview]),
            (Consent, ConsentChosen) if context.returning_to_review => (Review, vec![ShowReview]),
            (Consent, ConsentChosen) if asks_sharing(context.anonymous) => {
                (ShareUsername, vec![PromptShareUsername])
            }
            (Consent, ConsentChosen) => (Image, vec![PromptImage]),
            (ShareUsername, ShareUsernameChosen) if context.returning_to_review => {
                (Review, vec![ShowReview])
            }
            (ShareUsername, ShareUsernameChosen) => (Image, vec![PromptImage]),
            (Image, ImageCaptureStarted) => (Image, vec![StartImageCapture]),
            (Image, ImageCaptured) => (Review, vec![ShowReview]),
            (Image, ImageSkipped) => (Review, vec![StopImageCapture, ShowReview]),
            (Review, EditRequested(EditableField::Consent)) => (Consent, vec![PromptConsent]),
            (Review, EditRequested(EditableField::ShareUsername))
                if asks_sharing(context.anonymous) =>
            {
                (ShareUsername, vec![PromptShareUsername])
            }
            (Review, EditRequested(EditableField::Image)) => (Image, vec![PromptImage]),
            (Review, ConfirmRequested) => (Review, vec![StopImageCapture, Finalize]),
            _ => {
                return Err(WizardTransitionError::InvalidTransition {
                    step: current,
                    event: event.clone(),
                });
            }
        };

        Ok(TransitionOutcome { from: current, to, event: event.clone(), actions })
    }

    pub fn apply_with_audit<S>(
        &self,
        current: WizardStep,
        event: &WizardEvent,
        context: &WizardContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, WizardTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "wizard.transition_applied",
                        AuditCategory::Wizard,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "wizard.transition_rejected",
                        AuditCategory::Wizard,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}
