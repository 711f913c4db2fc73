use std::{
    collections::HashMap,
    env::VarError,
    fs, io,
    path::{Path, PathBuf},
};

use crate::{
    error::{AuthError, Result},
    types::{SecretName, SecretValue},
};

use super::SecretProvider;

/// Default variable prefix for environment-exported secrets.
pub const DEFAULT_ENV_PREFIX: &str = "COLAB_SECRET_";

/// Variable the notebook host exports in every runtime it starts.
pub const DEFAULT_HOST_MARKER_VAR: &str = "COLAB_RELEASE_TAG";

/// Reads secrets exported as `<PREFIX><NAME>` environment variables.
///
/// The store counts as available only while the host marker variable is set,
/// so a laptop shell reports a configuration error instead of a missing secret.
#[derive(Debug, Clone)]
pub struct EnvSecretProvider {
    prefix: String,
    host_marker: Option<String>,
}

impl EnvSecretProvider {
    /// Creates a provider using [`DEFAULT_ENV_PREFIX`] and [`DEFAULT_HOST_MARKER_VAR`].
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Creates a provider with a custom variable prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            host_marker: Some(DEFAULT_HOST_MARKER_VAR.to_owned()),
        }
    }

    /// Replaces the host marker variable; `None` treats every runtime as the host.
    pub fn with_host_marker(mut self, marker: Option<String>) -> Self {
        self.host_marker = marker;
        self
    }

    /// Returns the variable name consulted for `name`.
    pub fn variable_for(&self, name: &SecretName) -> String {
        let suffix = name
            .as_str()
            .chars()
            .map(|character| {
                if character.is_ascii_alphanumeric() {
                    character.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect::<String>();
        format!("{}{suffix}", self.prefix)
    }
}

impl Default for EnvSecretProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretProvider for EnvSecretProvider {
    fn probe(&self) -> Result<()> {
        let Some(marker) = self.host_marker.as_deref() else {
            return Ok(());
        };
        if std::env::var_os(marker).is_some() {
            return Ok(());
        }
        Err(AuthError::Configuration(format!(
            "notebook secret store is not available: {marker} is not set in this runtime"
        )))
    }

    fn get(&self, name: &SecretName) -> Result<Option<SecretValue>> {
        let key = self.variable_for(name);
        match std::env::var(&key) {
            Ok(value) => Ok(Some(SecretValue::new(value))),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(AuthError::InvalidInput(format!(
                "{key} must be valid UTF-8"
            ))),
        }
    }
}

/// Reads secrets stored one-per-file under a mounted directory.
#[derive(Debug, Clone)]
pub struct DirSecretProvider {
    dir: PathBuf,
}

impl DirSecretProvider {
    /// Creates a provider rooted at `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, name: &SecretName) -> Result<PathBuf> {
        let literal = name.as_str();
        if literal == "." || literal == ".." || literal.contains(['/', '\\']) {
            return Err(AuthError::InvalidInput(format!(
                "secret name '{literal}' cannot be used as a file name"
            )));
        }
        Ok(self.dir.join(literal))
    }
}

impl SecretProvider for DirSecretProvider {
    fn probe(&self) -> Result<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        Err(AuthError::Configuration(format!(
            "secret directory is not available in this runtime: {}",
            self.dir.display()
        )))
    }

    fn get(&self, name: &SecretName) -> Result<Option<SecretValue>> {
        match fs::read_to_string(self.path_for(name)?) {
            Ok(text) => Ok(Some(SecretValue::new(text))),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(AuthError::Io(error)),
        }
    }
}

/// In-memory provider for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretProvider {
    entries: HashMap<String, String>,
    available: bool,
}

impl StaticSecretProvider {
    /// Creates an empty, available provider.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            available: true,
        }
    }

    /// Creates a provider whose probe always fails.
    pub fn unavailable() -> Self {
        Self {
            entries: HashMap::new(),
            available: false,
        }
    }

    /// Adds or replaces one entry.
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(name.into(), value.into());
        self
    }
}

impl SecretProvider for StaticSecretProvider {
    fn probe(&self) -> Result<()> {
        if self.available {
            return Ok(());
        }
        Err(AuthError::Configuration(
            "secret store is not available in this runtime".to_owned(),
        ))
    }

    fn get(&self, name: &SecretName) -> Result<Option<SecretValue>> {
        Ok(self
            .entries
            .get(name.as_str())
            .map(|value| SecretValue::new(value.clone())))
    }
}
