use std::{env::VarError, path::Path};

use crate::{
    activation::ActivationOptions,
    audit::{AuditLog, AuditSink},
    config::{resolve_config_path, AuthConfig, ConfigSelection, SecretSourceConfig, CONFIG_ENV_VAR},
    error::{AuthError, Result},
    secrets::{CommandSecretProvider, DirSecretProvider, EnvSecretProvider, SecretProvider},
    types::SecretName,
};

/// Config selection plus the effective settings derived from it.
#[derive(Debug, Clone)]
pub(crate) struct EffectiveCliState {
    pub(crate) selection: ConfigSelection,
    pub(crate) config: AuthConfig,
}

/// Connect flags before they are merged with config defaults.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectFlags {
    pub(crate) secret: Option<String>,
    pub(crate) project: Option<String>,
    pub(crate) keep: bool,
    pub(crate) ephemeral: bool,
    pub(crate) no_adc: bool,
}

pub(crate) fn load_effective_state(
    explicit_path: Option<&Path>,
    no_config: bool,
) -> Result<EffectiveCliState> {
    let current_dir = std::env::current_dir()?;
    let env_path = read_config_env_var()?;
    let selection =
        resolve_config_path(explicit_path, env_path.as_deref(), no_config, &current_dir)?;
    let config = match selection.path.as_deref() {
        Some(path) => AuthConfig::load_from_path(path)?,
        None => AuthConfig::default(),
    };
    tracing::debug!(source = ?selection.source, path = ?selection.path, "config selected");
    Ok(EffectiveCliState { selection, config })
}

pub(crate) fn secret_provider_for(source: &SecretSourceConfig) -> Box<dyn SecretProvider> {
    match source {
        SecretSourceConfig::Env {
            prefix,
            host_marker,
        } => Box::new(
            EnvSecretProvider::with_prefix(prefix).with_host_marker(host_marker.clone()),
        ),
        SecretSourceConfig::Dir { dir } => Box::new(DirSecretProvider::new(dir)),
        SecretSourceConfig::Command { argv } => Box::new(CommandSecretProvider::new(argv.clone())),
    }
}

pub(crate) fn audit_sink_for(config: &AuthConfig) -> Result<AuditSink> {
    match config.audit_path.as_deref() {
        Some(path) => Ok(AuditSink::to_log(AuditLog::new(path)?)),
        None => Ok(AuditSink::disabled()),
    }
}

/// Merges command flags over config defaults. `--keep` and `--ephemeral` both
/// override `activation.keep_credential_file`; `--ephemeral` also disables ADC.
pub(crate) fn activation_options_for(
    config: &AuthConfig,
    flags: ConnectFlags,
) -> Result<ActivationOptions> {
    let defaults = &config.activation;
    let secret_name = match flags.secret.as_deref() {
        Some(literal) => SecretName::new(literal)?,
        None => defaults.secret_name.clone(),
    };
    let project_id = match flags.project {
        Some(project) if project.trim().is_empty() => {
            return Err(AuthError::InvalidInput(
                "--project cannot be empty".to_owned(),
            ))
        }
        Some(project) => Some(project.trim().to_owned()),
        None => defaults.project_id.clone(),
    };
    let keep_credential_file = if flags.ephemeral {
        false
    } else if flags.keep {
        true
    } else {
        defaults.keep_credential_file
    };
    let publish_adc_env = keep_credential_file && defaults.publish_adc_env && !flags.no_adc;

    Ok(ActivationOptions {
        secret_name,
        project_id,
        keep_credential_file,
        publish_adc_env,
        key_dir: defaults.key_dir.clone(),
    })
}

fn read_config_env_var() -> Result<Option<String>> {
    match std::env::var(CONFIG_ENV_VAR) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AuthError::InvalidInput(format!(
            "{CONFIG_ENV_VAR} must be valid UTF-8"
        ))),
    }
}
