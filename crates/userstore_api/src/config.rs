//! Runtime options for the HTTP surface.

use userstore_core::{normalize_email_domain, UserValidationError};

pub const DEFAULT_DEACTIVATE_DOMAIN: &str = "@email.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Email suffix targeted by `PUT /users/batch`, always `@`-prefixed.
    pub deactivate_domain: String,
}

impl ApiConfig {
    /// Builds a config, rejecting a malformed domain at startup rather than per request.
    pub fn new(deactivate_domain: &str) -> Result<Self, UserValidationError> {
        Ok(Self {
            deactivate_domain: normalize_email_domain(deactivate_domain)?,
        })
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            deactivate_domain: DEFAULT_DEACTIVATE_DOMAIN.to_string(),
        }
    }
}
