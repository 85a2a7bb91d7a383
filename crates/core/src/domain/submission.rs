use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

impl SubmissionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fields supplied by the finalizer; id, approval and timestamp are assigned on create.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub name: Option<String>,
    pub username: Option<String>,
    pub message: String,
    pub picture: Option<String>,
    pub website: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub name: Option<String>,
    pub username: Option<String>,
    pub message: String,
    pub picture: Option<String>,
    pub website: bool,
    pub approved: bool,
    pub last_updated: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn create(submission: NewSubmission, now: DateTime<Utc>) -> Result<Self, FieldUpdateError> {
        let message = validate_message_value(&submission.message)?;
        if let Some(picture) = submission.picture.as_deref() {
            validate_url_value(SubmissionField::Picture, picture)?;
        }

        Ok(Self {
            id: SubmissionId::generate(),
            name: submission.name.filter(|name| !name.trim().is_empty()),
            username: submission.username.filter(|username| !username.trim().is_empty()),
            message,
            picture: submission.picture,
            website: submission.website,
            approved: false,
            last_updated: now,
        })
    }

    /// Applies a string-encoded single-field update, refreshing `last_updated` on success.
    pub fn apply_update(
        &mut self,
        field: SubmissionField,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<(), FieldUpdateError> {
        if value.is_empty() {
            return Err(FieldUpdateError::InvalidValue {
                field: field.as_str().to_owned(),
                reason: "value must be a non-empty string".to_owned(),
            });
        }

        match field {
            SubmissionField::Name => self.name = Some(value.to_owned()),
            SubmissionField::Username => self.username = Some(value.to_owned()),
            SubmissionField::Message => self.message = validate_message_value(value)?,
            SubmissionField::Picture => {
                validate_url_value(field, value)?;
                self.picture = Some(value.to_owned());
            }
            SubmissionField::Website => self.website = parse_bool_value(field, value)?,
            SubmissionField::Approved => self.approved = parse_bool_value(field, value)?,
        }

        self.last_updated = now;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionField {
    Name,
    Username,
    Message,
    Picture,
    Website,
    Approved,
}

impl SubmissionField {
    pub const ALL: [SubmissionField; 6] = [
        SubmissionField::Name,
        SubmissionField::Username,
        SubmissionField::Message,
        SubmissionField::Picture,
        SubmissionField::Website,
        SubmissionField::Approved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Username => "username",
            Self::Message => "message",
            Self::Picture => "picture",
            Self::Website => "website",
            Self::Approved => "approved",
        }
    }
}

impl FromStr for SubmissionField {
    type Err = FieldUpdateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == value)
            .ok_or_else(|| FieldUpdateError::UnknownField(value.to_owned()))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FieldUpdateError {
    #[error(
        "invalid field name `{0}`; valid fields are: name, username, message, picture, website, approved"
    )]
    UnknownField(String),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}

fn validate_message_value(value: &str) -> Result<String, FieldUpdateError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FieldUpdateError::InvalidValue {
            field: SubmissionField::Message.as_str().to_owned(),
            reason: "message cannot be empty".to_owned(),
        });
    }
    Ok(trimmed.to_owned())
}

fn validate_url_value(field: SubmissionField, value: &str) -> Result<(), FieldUpdateError> {
    Url::parse(value).map(|_| ()).map_err(|_| FieldUpdateError::InvalidValue {
        field: field.as_str().to_owned(),
        reason: format!("must be a valid URL, got `{value}`"),
    })
}

fn parse_bool_value(field: SubmissionField, value: &str) -> Result<bool, FieldUpdateError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(FieldUpdateError::InvalidValue {
            field: field.as_str().to_owned(),
            reason: format!("must be 'true' or 'false' (case-insensitive), got `{value}`"),
        }),
    }
}
