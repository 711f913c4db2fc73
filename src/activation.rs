//! Service-account activation from a notebook secret.

use std::{
    env,
    path::{Path, PathBuf},
};

use uuid::Uuid;

use crate::{
    audit::{AuditEvent, AuditSink},
    error::{classify_error_code, Result, ValidationError},
    fs_secure::{persist_temp_file, write_private_temp_file},
    process::ProcessRunner,
    secrets::SecretProvider,
    types::{SecretName, SecretValue},
};

/// Variable consulted by Google client libraries for Application Default Credentials.
pub const ADC_ENV_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Default authentication binary.
pub const DEFAULT_GCLOUD_BINARY: &str = "gcloud";

/// Settings for one activation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationOptions {
    /// Secret holding the service account JSON.
    pub secret_name: SecretName,
    /// Project to select with `gcloud config set project`.
    pub project_id: Option<String>,
    /// Keep the key file after returning. When `false` it is deleted on every
    /// exit path and nothing is published.
    pub keep_credential_file: bool,
    /// Set [`ADC_ENV_VAR`] to the key path. Only honoured when the file is kept.
    pub publish_adc_env: bool,
    /// Directory for the key file; the system temp directory when unset.
    pub key_dir: Option<PathBuf>,
}

impl Default for ActivationOptions {
    fn default() -> Self {
        Self {
            secret_name: SecretName::default(),
            project_id: None,
            keep_credential_file: true,
            publish_adc_env: true,
            key_dir: None,
        }
    }
}

/// Credential state produced by a successful activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialContext {
    /// Absolute key file path. Already deleted when `kept` is `false`.
    pub key_path: PathBuf,
    /// Whether the key file still exists.
    pub kept: bool,
    /// Whether [`ADC_ENV_VAR`] now points at `key_path`.
    pub adc_published: bool,
    /// Project selected for `gcloud`, if any.
    pub project_id: Option<String>,
}

impl CredentialContext {
    /// Returns the key path when it is still usable by client libraries.
    pub fn credentials_file(&self) -> Option<&Path> {
        self.kept.then_some(self.key_path.as_path())
    }
}

/// Turns a stored service account key into an authenticated `gcloud` session.
pub struct CredentialActivator<'a> {
    provider: &'a dyn SecretProvider,
    runner: &'a dyn ProcessRunner,
    gcloud_binary: String,
    audit: AuditSink,
}

impl<'a> CredentialActivator<'a> {
    /// Probes `provider` and builds an activator.
    ///
    /// Fails with [`crate::error::AuthError::Configuration`] when the secret store is not
    /// reachable from this runtime.
    pub fn new(provider: &'a dyn SecretProvider, runner: &'a dyn ProcessRunner) -> Result<Self> {
        provider.probe()?;
        Ok(Self {
            provider,
            runner,
            gcloud_binary: DEFAULT_GCLOUD_BINARY.to_owned(),
            audit: AuditSink::disabled(),
        })
    }

    /// Uses a custom `gcloud` binary.
    pub fn with_gcloud_binary(mut self, gcloud_binary: impl Into<String>) -> Self {
        self.gcloud_binary = gcloud_binary.into();
        self
    }

    /// Records activation events to `audit`.
    pub fn with_audit(mut self, audit: AuditSink) -> Self {
        self.audit = audit;
        self
    }

    /// Argument vector for `gcloud auth activate-service-account`.
    pub fn activate_command(&self, key_path: &Path) -> Vec<String> {
        vec![
            self.gcloud_binary.clone(),
            "auth".to_owned(),
            "activate-service-account".to_owned(),
            "--key-file".to_owned(),
            key_path.to_string_lossy().into_owned(),
        ]
    }

    /// Argument vector for `gcloud config set project`.
    pub fn set_project_command(&self, project_id: &str) -> Vec<String> {
        vec![
            self.gcloud_binary.clone(),
            "config".to_owned(),
            "set".to_owned(),
            "project".to_owned(),
            project_id.to_owned(),
        ]
    }

    /// Fetches, validates, materializes, and activates one service account key.
    pub fn activate(&self, options: &ActivationOptions) -> Result<CredentialContext> {
        let activation_id = Uuid::new_v4();
        let result = self
            .fetch_secret(&options.secret_name)
            .and_then(|secret| self.activate_secret(activation_id, &secret, options));
        if let Err(error) = &result {
            self.audit.record(AuditEvent::CredentialActivationFailed {
                activation_id,
                secret_name: options.secret_name.clone(),
                code: classify_error_code(error).to_owned(),
                message: error.to_string(),
            });
        }
        result
    }

    fn fetch_secret(&self, name: &SecretName) -> Result<SecretValue> {
        let secret = self
            .provider
            .get(name)?
            .ok_or_else(|| ValidationError::MissingSecret(name.to_string()))?;
        if secret.is_empty() {
            return Err(ValidationError::EmptySecret(name.to_string()).into());
        }
        secret
            .expose(|text| serde_json::from_str::<serde_json::Value>(text).map(drop))
            .map_err(|_| ValidationError::MalformedSecret(name.to_string()))?;
        tracing::debug!(secret = %name, "fetched service account secret");
        Ok(secret)
    }

    fn activate_secret(
        &self,
        activation_id: Uuid,
        secret: &SecretValue,
        options: &ActivationOptions,
    ) -> Result<CredentialContext> {
        let key_dir = options.key_dir.clone().unwrap_or_else(env::temp_dir);
        let key_file = secret.expose(|text| write_private_temp_file(&key_dir, text))?;
        let key_path = absolute_path(key_file.path())?;
        tracing::debug!(path = %key_path.display(), "wrote service account key file");

        if !options.keep_credential_file {
            let outcome = self.run_gcloud(activation_id, &key_path, options.project_id.as_deref());
            let removal = key_file.close();
            match &removal {
                Ok(()) => self.audit.record(AuditEvent::CredentialFileRemoved {
                    activation_id,
                    key_path: key_path.clone(),
                }),
                Err(error) => tracing::warn!(
                    path = %key_path.display(),
                    %error,
                    "failed to remove ephemeral key file"
                ),
            }
            // A gcloud failure outranks a removal failure.
            outcome?;
            removal?;
            return Ok(self.finish(activation_id, options, key_path, false, false));
        }

        persist_temp_file(key_file)?;
        let adc_published = options.publish_adc_env;
        if adc_published {
            env::set_var(ADC_ENV_VAR, &key_path);
            tracing::debug!(
                var = ADC_ENV_VAR,
                path = %key_path.display(),
                "published credentials path"
            );
        }
        self.run_gcloud(activation_id, &key_path, options.project_id.as_deref())?;
        Ok(self.finish(activation_id, options, key_path, true, adc_published))
    }

    fn run_gcloud(
        &self,
        activation_id: Uuid,
        key_path: &Path,
        project_id: Option<&str>,
    ) -> Result<()> {
        self.runner.run(&self.activate_command(key_path))?;
        if let Some(project_id) = project_id {
            self.runner.run(&self.set_project_command(project_id))?;
            self.audit.record(AuditEvent::ProjectConfigured {
                activation_id,
                project_id: project_id.to_owned(),
            });
        }
        Ok(())
    }

    fn finish(
        &self,
        activation_id: Uuid,
        options: &ActivationOptions,
        key_path: PathBuf,
        kept: bool,
        adc_published: bool,
    ) -> CredentialContext {
        tracing::info!(
            secret = %options.secret_name,
            kept,
            adc_published,
            "service account activated"
        );
        self.audit.record(AuditEvent::CredentialActivated {
            activation_id,
            secret_name: options.secret_name.clone(),
            key_path: key_path.clone(),
            kept,
            adc_published,
        });
        CredentialContext {
            key_path,
            kept,
            adc_published,
            project_id: options.project_id.clone(),
        }
    }
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(env::current_dir()?.join(path))
}
