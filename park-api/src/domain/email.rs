use std::fmt;
use std::ops::Deref;

use thiserror::Error;

/// A validated email address for notification recipients.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email(String);

#[derive(Error, Debug, PartialEq)]
#[error("'{0}' is not a valid email address")]
pub struct EmailError(String);

impl Email {
    /// Validates the address shape: exactly one `@`, a non-empty local
    /// part, and a dotted domain.
    pub fn parse(value: impl Into<String>) -> Result<Self, EmailError> {
        let value = value.into();

        let Some((local, domain)) = value.split_once('@') else {
            return Err(EmailError(value));
        };
        if local.trim().is_empty() || domain.contains('@') {
            return Err(EmailError(value));
        }
        if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
            return Err(EmailError(value));
        }

        Ok(Self(value))
    }
}

impl Deref for Email {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
