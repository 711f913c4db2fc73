use std::{
    fs,
    path::{Component, Path, PathBuf},
};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use serde::{Deserialize, Serialize};

use crate::{
    activation::DEFAULT_GCLOUD_BINARY,
    error::{AuthError, Result},
    secrets::provider::{DEFAULT_ENV_PREFIX, DEFAULT_HOST_MARKER_VAR},
    transfer::DEFAULT_GSUTIL_BINARY,
    types::SecretName,
};

const CONFIG_VERSION_V1: u32 = 1;

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = ".colab-gcp-auth.toml";
/// Environment variable that selects a config file.
pub const CONFIG_ENV_VAR: &str = "COLAB_GCP_AUTH_CONFIG";

/// Source used to select the effective config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfigSource {
    /// Selected via `--config` CLI flag.
    Flag,
    /// Selected via `COLAB_GCP_AUTH_CONFIG`.
    Env,
    /// Selected by walking from the current working directory to root.
    Discovered,
    /// No config file selected.
    None,
}

/// Resolved config selection before parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSelection {
    /// Source used for selection.
    pub source: ConfigSource,
    /// Selected path when a config file was found.
    pub path: Option<PathBuf>,
}

/// Where secrets are read from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecretProviderKind {
    /// `<PREFIX><NAME>` environment variables.
    #[default]
    Env,
    /// One file per secret under a directory.
    Dir,
    /// Helper command printing the secret.
    Command,
}

/// Raw TOML shape for one `.colab-gcp-auth.toml` file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthConfigFile {
    /// Schema version.
    pub version: u32,
    /// External binary overrides.
    #[serde(default)]
    pub tools: ToolsConfigFile,
    /// Secret store selection.
    #[serde(default)]
    pub secrets: SecretsConfigFile,
    /// Activation defaults.
    #[serde(default)]
    pub activation: ActivationConfigFile,
    /// Audit log settings.
    #[serde(default)]
    pub audit: AuditConfigFile,
}

/// Raw `[tools]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfigFile {
    /// `gcloud` binary name or path.
    pub gcloud: Option<String>,
    /// `gsutil` binary name or path.
    pub gsutil: Option<String>,
}

/// Raw `[secrets]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SecretsConfigFile {
    /// Provider kind.
    pub provider: Option<SecretProviderKind>,
    /// Secret read when `--secret` is not given.
    pub default_name: Option<String>,
    /// Variable prefix for the `env` provider.
    pub env_prefix: Option<String>,
    /// Variable that marks the notebook host for the `env` provider; empty disables the check.
    pub host_marker: Option<String>,
    /// Directory for the `dir` provider.
    pub dir: Option<String>,
    /// Helper argv for the `command` provider.
    pub command: Option<Vec<String>>,
}

/// Raw `[activation]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ActivationConfigFile {
    /// Keep the key file after activation.
    pub keep_credential_file: Option<bool>,
    /// Publish `GOOGLE_APPLICATION_CREDENTIALS`.
    pub publish_adc_env: Option<bool>,
    /// Project selected after activation.
    pub project_id: Option<String>,
    /// Directory for key files.
    pub key_dir: Option<String>,
}

/// Raw `[audit]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuditConfigFile {
    /// JSONL audit log path.
    pub path: Option<String>,
}

/// Effective secret store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SecretSourceConfig {
    /// Environment variables with this prefix.
    Env {
        /// Variable prefix.
        prefix: String,
        /// Variable that must be set for the store to count as available.
        host_marker: Option<String>,
    },
    /// Files under this directory.
    Dir {
        /// Absolute directory.
        dir: PathBuf,
    },
    /// Helper command argv.
    Command {
        /// Helper program and leading arguments.
        argv: Vec<String>,
    },
}

/// Effective activation defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivationDefaults {
    /// Secret read when `--secret` is not given.
    pub secret_name: SecretName,
    /// Keep the key file after activation.
    pub keep_credential_file: bool,
    /// Publish `GOOGLE_APPLICATION_CREDENTIALS`.
    pub publish_adc_env: bool,
    /// Project selected after activation.
    pub project_id: Option<String>,
    /// Directory for key files.
    pub key_dir: Option<PathBuf>,
}

/// Effective and validated configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    /// Absolute config file path, when loaded from disk.
    pub source_path: Option<PathBuf>,
    /// `gcloud` binary.
    pub gcloud_binary: String,
    /// `gsutil` binary.
    pub gsutil_binary: String,
    /// Secret store settings.
    pub secrets: SecretSourceConfig,
    /// Activation defaults.
    pub activation: ActivationDefaults,
    /// JSONL audit log path.
    pub audit_path: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            source_path: None,
            gcloud_binary: DEFAULT_GCLOUD_BINARY.to_owned(),
            gsutil_binary: DEFAULT_GSUTIL_BINARY.to_owned(),
            secrets: SecretSourceConfig::Env {
                prefix: DEFAULT_ENV_PREFIX.to_owned(),
                host_marker: Some(DEFAULT_HOST_MARKER_VAR.to_owned()),
            },
            activation: ActivationDefaults {
                secret_name: SecretName::default(),
                keep_credential_file: true,
                publish_adc_env: true,
                project_id: None,
                key_dir: None,
            },
            audit_path: None,
        }
    }
}

impl AuthConfig {
    /// Loads and validates a config file from disk.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let absolute_path = lexical_absolute(path.as_ref(), &cwd);
        if !absolute_path.exists() {
            return Err(AuthError::InvalidInput(format!(
                "config file does not exist: {}",
                absolute_path.display()
            )));
        }

        validate_config_file_permissions(&absolute_path)?;
        let raw = fs::read_to_string(&absolute_path)?;
        Self::parse_from_str(&raw, &absolute_path)
    }

    /// Parses and validates config from TOML text.
    pub fn parse_from_str(raw: &str, source_path: impl AsRef<Path>) -> Result<Self> {
        let parsed = toml::from_str::<AuthConfigFile>(raw)
            .map_err(|error| AuthError::InvalidInput(format!("invalid config TOML: {error}")))?;
        build_config(parsed, source_path.as_ref())
    }
}

/// Resolves one config path based on precedence rules.
pub fn resolve_config_path(
    explicit_path: Option<&Path>,
    env_path: Option<&str>,
    no_config: bool,
    cwd: impl AsRef<Path>,
) -> Result<ConfigSelection> {
    if no_config {
        return Ok(ConfigSelection {
            source: ConfigSource::None,
            path: None,
        });
    }

    let cwd = cwd.as_ref();
    if let Some(path) = explicit_path {
        let candidate = lexical_absolute(path, cwd);
        if !is_regular_config_candidate(&candidate) {
            return Err(AuthError::InvalidInput(format!(
                "config file must be a regular file: {}",
                candidate.display()
            )));
        }
        return Ok(ConfigSelection {
            source: ConfigSource::Flag,
            path: Some(candidate),
        });
    }

    if let Some(value) = env_path {
        if value.trim().is_empty() {
            return Err(AuthError::InvalidInput(format!(
                "{CONFIG_ENV_VAR} cannot be empty"
            )));
        }

        let candidate = lexical_absolute(Path::new(value), cwd);
        if !is_regular_config_candidate(&candidate) {
            return Err(AuthError::InvalidInput(format!(
                "config file must be a regular file: {}",
                candidate.display()
            )));
        }
        return Ok(ConfigSelection {
            source: ConfigSource::Env,
            path: Some(candidate),
        });
    }

    if let Some(discovered) = discover_config(cwd) {
        return Ok(ConfigSelection {
            source: ConfigSource::Discovered,
            path: Some(discovered),
        });
    }

    Ok(ConfigSelection {
        source: ConfigSource::None,
        path: None,
    })
}

/// Discovers the config file by walking from `start_dir` to filesystem root.
pub fn discover_config(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start_dir.as_ref();
    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if is_regular_config_candidate(&candidate) {
            return Some(candidate);
        }

        current = current.parent()?;
    }
}

fn build_config(raw: AuthConfigFile, source_path: &Path) -> Result<AuthConfig> {
    if raw.version != CONFIG_VERSION_V1 {
        return Err(AuthError::InvalidInput(format!(
            "unsupported config version {} (expected {})",
            raw.version, CONFIG_VERSION_V1
        )));
    }

    let source_path = lexical_absolute(source_path, &std::env::current_dir()?);
    let source_dir = source_path.parent().unwrap_or(Path::new("."));

    let gcloud_binary = resolve_binary(raw.tools.gcloud, DEFAULT_GCLOUD_BINARY, "tools.gcloud")?;
    let gsutil_binary = resolve_binary(raw.tools.gsutil, DEFAULT_GSUTIL_BINARY, "tools.gsutil")?;
    let secrets = resolve_secret_source(&raw.secrets, source_dir)?;
    let activation = resolve_activation_defaults(&raw.secrets, &raw.activation, source_dir)?;
    let audit_path = raw
        .audit
        .path
        .as_deref()
        .map(|value| resolve_path_value(value, source_dir, "audit.path"))
        .transpose()?;

    Ok(AuthConfig {
        source_path: Some(source_path),
        gcloud_binary,
        gsutil_binary,
        secrets,
        activation,
        audit_path,
    })
}

fn resolve_binary(value: Option<String>, default: &str, label: &str) -> Result<String> {
    let binary = value.unwrap_or_else(|| default.to_owned());
    if binary.trim().is_empty() {
        return Err(AuthError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(binary)
}

fn resolve_secret_source(
    raw: &SecretsConfigFile,
    source_dir: &Path,
) -> Result<SecretSourceConfig> {
    let provider = raw.provider.unwrap_or_default();
    let stray = |field: &str, set: bool| -> Result<()> {
        if set {
            return Err(AuthError::InvalidInput(format!(
                "secrets.{field} is not used by the '{}' provider",
                provider_label(provider)
            )));
        }
        Ok(())
    };

    match provider {
        SecretProviderKind::Env => {
            stray("dir", raw.dir.is_some())?;
            stray("command", raw.command.is_some())?;
            let prefix = raw
                .env_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_ENV_PREFIX.to_owned());
            ensure_variable_name(&prefix, "secrets.env_prefix")?;
            let host_marker = match raw.host_marker.as_deref() {
                None => Some(DEFAULT_HOST_MARKER_VAR.to_owned()),
                Some("") => None,
                Some(marker) => {
                    ensure_variable_name(marker, "secrets.host_marker")?;
                    Some(marker.to_owned())
                }
            };
            Ok(SecretSourceConfig::Env {
                prefix,
                host_marker,
            })
        }
        SecretProviderKind::Dir => {
            stray("env_prefix", raw.env_prefix.is_some())?;
            stray("host_marker", raw.host_marker.is_some())?;
            stray("command", raw.command.is_some())?;
            let literal = raw.dir.as_deref().ok_or_else(|| {
                AuthError::InvalidInput("secrets.dir is required for the 'dir' provider".to_owned())
            })?;
            Ok(SecretSourceConfig::Dir {
                dir: resolve_path_value(literal, source_dir, "secrets.dir")?,
            })
        }
        SecretProviderKind::Command => {
            stray("env_prefix", raw.env_prefix.is_some())?;
            stray("host_marker", raw.host_marker.is_some())?;
            stray("dir", raw.dir.is_some())?;
            let argv = raw.command.clone().unwrap_or_default();
            if argv.first().map_or(true, |program| program.trim().is_empty()) {
                return Err(AuthError::InvalidInput(
                    "secrets.command must name a helper program".to_owned(),
                ));
            }
            Ok(SecretSourceConfig::Command { argv })
        }
    }
}

fn ensure_variable_name(value: &str, label: &str) -> Result<()> {
    if value
        .chars()
        .all(|character| character.is_ascii_alphanumeric() || character == '_')
    {
        return Ok(());
    }
    Err(AuthError::InvalidInput(format!(
        "{label} '{value}' must use only [A-Za-z0-9_]"
    )))
}

fn resolve_activation_defaults(
    secrets: &SecretsConfigFile,
    raw: &ActivationConfigFile,
    source_dir: &Path,
) -> Result<ActivationDefaults> {
    let secret_name = match secrets.default_name.as_deref() {
        Some(literal) => SecretName::new(literal)?,
        None => SecretName::default(),
    };
    let project_id = match raw.project_id.as_deref().map(str::trim) {
        Some("") => {
            return Err(AuthError::InvalidInput(
                "activation.project_id cannot be empty".to_owned(),
            ))
        }
        other => other.map(ToOwned::to_owned),
    };
    let key_dir = raw
        .key_dir
        .as_deref()
        .map(|value| resolve_path_value(value, source_dir, "activation.key_dir"))
        .transpose()?;

    Ok(ActivationDefaults {
        secret_name,
        keep_credential_file: raw.keep_credential_file.unwrap_or(true),
        publish_adc_env: raw.publish_adc_env.unwrap_or(true),
        project_id,
        key_dir,
    })
}

fn provider_label(kind: SecretProviderKind) -> &'static str {
    match kind {
        SecretProviderKind::Env => "env",
        SecretProviderKind::Dir => "dir",
        SecretProviderKind::Command => "command",
    }
}

fn resolve_path_value(value: &str, source_dir: &Path, label: &str) -> Result<PathBuf> {
    if value.trim().is_empty() {
        return Err(AuthError::InvalidInput(format!("{label} cannot be empty")));
    }

    let path = match value.strip_prefix('~') {
        None => PathBuf::from(value),
        Some("") => home_dir()?,
        Some(rest) => match rest.strip_prefix('/') {
            Some(relative) => home_dir()?.join(relative),
            None => {
                return Err(AuthError::InvalidInput(format!(
                    "{label}: '~user' paths are not supported, use '~/' or an absolute path"
                )))
            }
        },
    };
    Ok(lexical_absolute(&path, source_dir))
}

fn home_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| AuthError::InvalidInput("HOME is not set".to_owned()))
}

/// Anchors `path` at `base` when relative, then folds `.` and `..` without
/// touching the filesystem. `..` at the root stays at the root.
fn lexical_absolute(path: &Path, base: &Path) -> PathBuf {
    base.join(path)
        .components()
        .fold(PathBuf::new(), |mut resolved, component| {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                other => resolved.push(other),
            }
            resolved
        })
}

fn is_regular_config_candidate(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|metadata| metadata.file_type().is_file())
}

fn validate_config_file_permissions(path: &Path) -> Result<()> {
    if !is_regular_config_candidate(path) {
        return Err(AuthError::InvalidInput(format!(
            "config path must be a regular file: {}",
            path.display()
        )));
    }

    // `tools.gcloud` is executed, so the file must only be writable by its owner.
    #[cfg(unix)]
    {
        let mode = fs::metadata(path)?.permissions().mode() & 0o777;
        if mode & 0o022 != 0 {
            return Err(AuthError::InvalidInput(format!(
                "config file {} is writable by group or others (mode {mode:o})",
                path.display()
            )));
        }
    }

    Ok(())
}
