pub mod draft;
pub mod engine;
pub mod sessions;
pub mod states;

pub use draft::{
    validate_display_name, validate_for_submission, validate_message, Draft, ANONYMOUS_IDENTITY,
    MESSAGE_MAX_CHARS, MESSAGE_MIN_CHARS, NAME_MAX_CHARS,
};
pub use engine::{WizardEngine, WizardFeatures, WizardTransitionError};
pub use sessions::SessionTable;
pub use states::{
    EditableField, TransitionOutcome, WizardAction, WizardContext, WizardEvent, WizardStep,
};
