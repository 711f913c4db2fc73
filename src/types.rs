use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Secret entry used when no name is configured.
pub const DEFAULT_SECRET_NAME: &str = "personal_gcp_key";

/// Name of one entry in the notebook secret store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SecretName(String);

impl SecretName {
    /// Creates a trimmed, non-empty secret name.
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySecretName);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SecretName {
    fn default() -> Self {
        Self(DEFAULT_SECRET_NAME.to_owned())
    }
}

impl std::fmt::Display for SecretName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secret text wrapper that avoids accidental logging and zeroizes on drop.
pub struct SecretValue {
    inner: Secret<String>,
}

impl SecretValue {
    /// Wraps raw secret text.
    pub fn new(text: String) -> Self {
        Self {
            inner: Secret::new(text),
        }
    }

    /// Exposes the secret text to a closure.
    pub fn expose<F, R>(&self, function: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        function(self.inner.expose_secret())
    }

    /// Returns `true` when the secret holds no text.
    pub fn is_empty(&self) -> bool {
        self.inner.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue([REDACTED])")
    }
}
