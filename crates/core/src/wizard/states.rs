use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WizardStep {
    Message,
    Name,
    Consent,
    ShareUsername,
    Image,
    Review,
}

/// Fields that are re-captured by moving the draft back to their own step.
///
/// Message and name are edited in place from the review card through a modal, so
/// they never leave `Review`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditableField {
    Consent,
    ShareUsername,
    Image,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WizardEvent {
    MessageAccepted,
    NameAccepted { anonymous: bool },
    ConsentChosen,
    ShareUsernameChosen,
    ImageCaptureStarted,
    ImageCaptured,
    ImageSkipped,
    EditRequested(EditableField),
    ConfirmRequested,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WizardContext {
    /// No display name was given, so the sharing question applies.
    pub anonymous: bool,
    /// The draft has already reached the review card once.
    pub returning_to_review: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WizardAction {
    PromptMessage,
    PromptName,
    PromptConsent,
    PromptShareUsername,
    PromptImage,
    StartImageCapture,
    StopImageCapture,
    ShowReview,
    Finalize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: WizardStep,
    pub to: WizardStep,
    pub event: WizardEvent,
    pub actions: Vec<WizardAction>,
}
