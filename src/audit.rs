use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::Result,
    fs_secure::create_private_file_if_missing,
    transfer::TransferStrategy,
    types::SecretName,
};

/// Audit events emitted by the system. Secret text is never recorded.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Service account was activated for `gcloud`.
    CredentialActivated {
        /// Activation id shared by events of one call.
        activation_id: Uuid,
        /// Secret the key was read from.
        secret_name: SecretName,
        /// Key file path.
        key_path: PathBuf,
        /// Whether the key file outlives the call.
        kept: bool,
        /// Whether `GOOGLE_APPLICATION_CREDENTIALS` was set.
        adc_published: bool,
    },
    /// Activation failed; no key file remains in ephemeral mode.
    CredentialActivationFailed {
        /// Activation id shared by events of one call.
        activation_id: Uuid,
        /// Secret the key was read from.
        secret_name: SecretName,
        /// Stable error code.
        code: String,
        /// Error message.
        message: String,
    },
    /// Ephemeral key file was deleted.
    CredentialFileRemoved {
        /// Activation id shared by events of one call.
        activation_id: Uuid,
        /// Deleted key file path.
        key_path: PathBuf,
    },
    /// Active `gcloud` project was set.
    ProjectConfigured {
        /// Activation id shared by events of one call.
        activation_id: Uuid,
        /// Project id.
        project_id: String,
    },
    /// Transfer command was assembled but not run.
    TransferPlanned {
        /// Effective strategy.
        strategy: TransferStrategy,
        /// Full command line.
        command: Vec<String>,
    },
    /// Transfer command completed successfully.
    TransferExecuted {
        /// Effective strategy.
        strategy: TransferStrategy,
        /// Full command line.
        command: Vec<String>,
    },
    /// Transfer command failed.
    TransferFailed {
        /// Effective strategy.
        strategy: TransferStrategy,
        /// Full command line.
        command: Vec<String>,
        /// Error message.
        message: String,
    },
    /// Secret Manager payload was read.
    SecretManagerAccessed {
        /// Full resource name of the version.
        resource: String,
    },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct AuditLine {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: AuditEvent,
}

/// JSONL append-only audit log writer.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Opens (creating if needed) an audit log at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();
        create_private_file_if_missing(&file_path)?;
        Ok(Self { path: file_path })
    }

    /// Appends one event as a JSON line.
    pub fn log(&self, event: AuditEvent) -> Result<()> {
        let line = AuditLine {
            timestamp: Utc::now(),
            event,
        };

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        serde_json::to_writer(&mut file, &line)?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Returns the audit file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Optional audit sink. Write failures are reported through `tracing` and never
/// fail the operation being audited.
#[derive(Debug, Clone, Default)]
pub struct AuditSink {
    log: Option<AuditLog>,
}

impl AuditSink {
    /// Sink that discards events.
    pub fn disabled() -> Self {
        Self { log: None }
    }

    /// Sink that appends to `log`.
    pub fn to_log(log: AuditLog) -> Self {
        Self { log: Some(log) }
    }

    /// Records one event when a log is configured.
    pub fn record(&self, event: AuditEvent) {
        let Some(log) = self.log.as_ref() else {
            return;
        };
        if let Err(error) = log.log(event) {
            tracing::warn!(path = %log.path().display(), %error, "failed to append audit event");
        }
    }
}
