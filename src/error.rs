use std::io;

use thiserror::Error;

/// Validation failures for secrets and transfer requests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Secret name is empty after trimming.
    #[error("secret name must not be empty")]
    EmptySecretName,
    /// Secret entry does not exist in the provider.
    #[error("secret '{0}' is missing; store the service account JSON content in the notebook secrets")]
    MissingSecret(String),
    /// Secret entry exists but holds an empty value.
    #[error("secret '{0}' is empty; store the service account JSON content in the notebook secrets")]
    EmptySecret(String),
    /// Secret value is not JSON text.
    #[error("secret '{0}' does not contain valid JSON")]
    MalformedSecret(String),
    /// Transfer strategy hint is not `sync` or `copy`.
    #[error("unknown transfer strategy '{0}': use 'sync' or 'copy'")]
    UnknownStrategy(String),
    /// Transfer source or destination is empty.
    #[error("transfer {0} path must not be empty")]
    EmptyPath(&'static str),
}

/// Top-level application errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Runtime does not provide a required collaborator.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Validation failure.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// External command exited unsuccessfully.
    #[error("{program} exited with status {status}{}", format_stderr(.stderr))]
    ExternalTool {
        /// Program that was executed.
        program: String,
        /// Exit status code, `-1` when killed by a signal.
        status: i32,
        /// Trimmed standard error, when it was captured.
        stderr: String,
    },
    /// Input was syntactically valid but semantically unsupported.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// JSON serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// UTF-8 conversion error.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

fn format_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// A typed result used across the crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Generic invalid-input error.
pub const ERROR_CODE_INVALID_INPUT: &str = "E100";
/// Secret lookup or payload validation error.
pub const ERROR_CODE_SECRET: &str = "E101";
/// Transfer request validation error.
pub const ERROR_CODE_TRANSFER: &str = "E102";
/// Wrong runtime or missing binary.
pub const ERROR_CODE_CONFIGURATION: &str = "E103";
/// External tool exited unsuccessfully.
pub const ERROR_CODE_EXTERNAL_TOOL: &str = "E400";
/// Filesystem or stream I/O failed.
pub const ERROR_CODE_IO: &str = "E900";
/// Internal serialization/encoding failure.
pub const ERROR_CODE_INTERNAL: &str = "E999";

const ERROR_EXPLANATION_E100: &str = r#"E100 invalid input

The command arguments or config values are syntactically valid but unsupported.

Common fixes:
  - Run `colab-gcp-auth help <command>` for exact argument usage.
  - Run `colab-gcp-auth config validate` to check `.colab-gcp-auth.toml`."#;
const ERROR_EXPLANATION_E101: &str = r#"E101 invalid secret

The secret was missing, empty, or not JSON text.

Recovery:
  - Store the *service account JSON content* (not a path) in the notebook secrets.
  - Grant the notebook access to the secret.
  - Retry with `colab-gcp-auth connect --secret <name>`."#;
const ERROR_EXPLANATION_E102: &str = r#"E102 invalid transfer request

Transfer strategies are `sync` (gsutil rsync) and `copy` (gsutil cp).
Source and destination must both be non-empty.

Examples:
  colab-gcp-auth transfer ./data gs://bucket/data --strategy sync
  colab-gcp-auth transfer gs://bucket/model.pt . --strategy copy"#;
const ERROR_EXPLANATION_E103: &str = r#"E103 configuration error

The current runtime does not provide a required collaborator: the secret
store is unreachable, or a binary was not found in PATH.

Recovery:
  - Run inside the notebook host that owns the secret store.
  - Check `[secrets]` in `.colab-gcp-auth.toml`.
  - Install the Google Cloud SDK (`gcloud`, `gsutil`) and verify PATH."#;
const ERROR_EXPLANATION_E400: &str = r#"E400 external tool failed

`gcloud` or `gsutil` exited with a non-zero status. Its own output above
describes the cause.

Recovery:
  - Confirm the service account key is current and not disabled.
  - Confirm the service account has access to the project or bucket.
  - Re-run the printed command with `--dry-run` to inspect it."#;
const ERROR_EXPLANATION_E900: &str = r#"E900 I/O failure

Filesystem or stream operations failed.

Recovery:
  - Verify the temp directory (or `activation.key_dir`) exists and is writable.
  - Check file permissions and available disk space."#;
const ERROR_EXPLANATION_E999: &str = r#"E999 internal runtime failure

An internal serialization or decoding error occurred.

Recovery:
  - Retry once with the same inputs.
  - If it persists, collect command, inputs, and stderr for diagnosis."#;

const KNOWN_ERROR_CODES: [&str; 7] = [
    ERROR_CODE_INVALID_INPUT,
    ERROR_CODE_SECRET,
    ERROR_CODE_TRANSFER,
    ERROR_CODE_CONFIGURATION,
    ERROR_CODE_EXTERNAL_TOOL,
    ERROR_CODE_IO,
    ERROR_CODE_INTERNAL,
];

/// Returns the stable error code for a runtime error.
pub fn classify_error_code(error: &AuthError) -> &'static str {
    match error {
        AuthError::Validation(validation) => classify_validation_code(validation),
        AuthError::Configuration(_) => ERROR_CODE_CONFIGURATION,
        AuthError::ExternalTool { .. } => ERROR_CODE_EXTERNAL_TOOL,
        AuthError::InvalidInput(_) => ERROR_CODE_INVALID_INPUT,
        AuthError::Io(_) => ERROR_CODE_IO,
        AuthError::Json(_) | AuthError::Utf8(_) => ERROR_CODE_INTERNAL,
    }
}

fn classify_validation_code(error: &ValidationError) -> &'static str {
    match error {
        ValidationError::EmptySecretName
        | ValidationError::MissingSecret(_)
        | ValidationError::EmptySecret(_)
        | ValidationError::MalformedSecret(_) => ERROR_CODE_SECRET,
        ValidationError::UnknownStrategy(_) | ValidationError::EmptyPath(_) => {
            ERROR_CODE_TRANSFER
        }
    }
}

/// Normalizes a user-provided error code for lookups.
pub fn normalize_error_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Returns an explanation block for a known error code.
pub fn explain_error_code(raw: &str) -> Option<&'static str> {
    let normalized = normalize_error_code(raw);
    match normalized.as_str() {
        ERROR_CODE_INVALID_INPUT => Some(ERROR_EXPLANATION_E100),
        ERROR_CODE_SECRET => Some(ERROR_EXPLANATION_E101),
        ERROR_CODE_TRANSFER => Some(ERROR_EXPLANATION_E102),
        ERROR_CODE_CONFIGURATION => Some(ERROR_EXPLANATION_E103),
        ERROR_CODE_EXTERNAL_TOOL => Some(ERROR_EXPLANATION_E400),
        ERROR_CODE_IO => Some(ERROR_EXPLANATION_E900),
        ERROR_CODE_INTERNAL => Some(ERROR_EXPLANATION_E999),
        _ => None,
    }
}

/// Stable list of explainable error codes.
pub fn known_error_codes() -> &'static [&'static str] {
    &KNOWN_ERROR_CODES
}
