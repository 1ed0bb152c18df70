//! User domain model.
//!
//! # Responsibility
//! - Define the canonical user record and its optional profile projection.
//! - Validate create/patch inputs before they reach persistence.
//!
//! # Invariants
//! - `id` is generated once and never reassigned.
//! - `name` and `email` are non-empty; `email` has a single `@` separator.
//! - `age`, when present, is not negative.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static EMAIL_SHAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("valid email shape regex"));
static EMAIL_DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@?[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*$")
        .expect("valid email domain regex")
});

/// Stable identifier assigned by the store on insert.
pub type UserId = Uuid;

/// Canonical user record as persisted in `users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub age: Option<i64>,
    pub is_active: Option<bool>,
}

/// Create request for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

impl NewUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Checks required fields and email shape.
    pub fn validate(&self) -> Result<(), UserValidationError> {
        validate_name(&self.name)?;
        validate_email(&self.email)
    }

    /// Materializes the record with a freshly generated id.
    pub fn into_user(self) -> User {
        User {
            id: Uuid::new_v4(),
            name: self.name,
            email: self.email,
            age: None,
            is_active: None,
        }
    }
}

/// Partial update. `None` fields keep their stored value.
///
/// Absent keys and explicit JSON `null` both deserialize to `None`, so a
/// patch cannot clear `age` or `isActive` once they are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i64>,
    pub is_active: Option<bool>,
}

impl UserPatch {
    /// Validates only the fields that are present.
    pub fn validate(&self) -> Result<(), UserValidationError> {
        if let Some(name) = self.name.as_deref() {
            validate_name(name)?;
        }
        if let Some(email) = self.email.as_deref() {
            validate_email(email)?;
        }
        if let Some(age) = self.age {
            if age < 0 {
                return Err(UserValidationError::NegativeAge(age));
            }
        }
        Ok(())
    }
}

/// External-service identifiers attached to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub github_handle: Option<String>,
    pub twitter_handle: Option<String>,
}

/// Read model for the user/profile join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWithProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValidationError {
    EmptyName,
    EmptyEmail,
    InvalidEmail(String),
    InvalidDomain(String),
    NegativeAge(i64),
    EmptyBatch,
}

impl Display for UserValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "name must not be empty"),
            Self::EmptyEmail => write!(f, "email must not be empty"),
            Self::InvalidEmail(value) => write!(f, "invalid email `{value}`"),
            Self::InvalidDomain(value) => write!(f, "invalid email domain `{value}`"),
            Self::NegativeAge(value) => write!(f, "age must not be negative, got {value}"),
            Self::EmptyBatch => write!(f, "batch must contain at least one user"),
        }
    }
}

impl Error for UserValidationError {}

/// Normalizes a domain filter to its `@`-prefixed suffix form.
///
/// `email.com` and `@email.com` both become `@email.com`.
pub fn normalize_email_domain(domain: &str) -> Result<String, UserValidationError> {
    let trimmed = domain.trim();
    if !EMAIL_DOMAIN_RE.is_match(trimmed) {
        return Err(UserValidationError::InvalidDomain(trimmed.to_string()));
    }
    Ok(if trimmed.starts_with('@') {
        trimmed.to_string()
    } else {
        format!("@{trimmed}")
    })
}

fn validate_name(name: &str) -> Result<(), UserValidationError> {
    if name.trim().is_empty() {
        return Err(UserValidationError::EmptyName);
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), UserValidationError> {
    if email.trim().is_empty() {
        return Err(UserValidationError::EmptyEmail);
    }
    if !EMAIL_SHAPE_RE.is_match(email) {
        return Err(UserValidationError::InvalidEmail(email.to_string()));
    }
    Ok(())
}
