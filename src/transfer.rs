//! `gsutil` command assembly for moving data between the notebook and Cloud Storage.

use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    audit::{AuditEvent, AuditSink},
    error::{Result, ValidationError},
    process::ProcessRunner,
};

/// URL scheme prefix of Cloud Storage object paths.
pub const REMOTE_SCHEME_PREFIX: &str = "gs://";
/// Default transfer binary.
pub const DEFAULT_GSUTIL_BINARY: &str = "gsutil";

/// Transfer strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferStrategy {
    /// Directory synchronisation (`gsutil rsync -r`).
    Sync,
    /// Single copy (`gsutil cp`).
    Copy,
}

impl TransferStrategy {
    /// Lowercase name as accepted on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Copy => "copy",
        }
    }
}

impl fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStrategy {
    type Err = ValidationError;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.to_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "copy" => Ok(Self::Copy),
            _ => Err(ValidationError::UnknownStrategy(raw.to_owned())),
        }
    }
}

/// Shape of one transfer endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Cloud Storage URL. Never probed.
    Remote,
    /// Existing local directory.
    LocalDir,
    /// Existing local non-directory.
    LocalFile,
    /// Local path that does not exist (yet).
    LocalMissing,
}

impl PathKind {
    /// Classifies `path` using the URL prefix and local filesystem only.
    pub fn classify(path: &str) -> Self {
        if path.starts_with(REMOTE_SCHEME_PREFIX) {
            return Self::Remote;
        }
        match std::fs::metadata(Path::new(path)) {
            Ok(metadata) if metadata.is_dir() => Self::LocalDir,
            Ok(_) => Self::LocalFile,
            Err(_) => Self::LocalMissing,
        }
    }
}

/// One transfer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Source path or `gs://` URL.
    pub source: String,
    /// Destination path or `gs://` URL.
    pub destination: String,
    /// Requested strategy, `sync` or `copy` in any case.
    pub strategy: String,
    /// Delete destination entries missing from the source (sync only).
    pub delete: bool,
    /// Compare checksums instead of mtimes (sync only).
    pub checksum: bool,
    /// Preserve POSIX attributes (copy only).
    pub preserve_posix: bool,
    /// Print the command instead of running it.
    pub dry_run: bool,
    /// Tokens appended verbatim.
    pub extra_args: Vec<String>,
}

impl TransferRequest {
    /// Creates a sync request with all flags off.
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            strategy: TransferStrategy::Sync.as_str().to_owned(),
            delete: false,
            checksum: false,
            preserve_posix: false,
            dry_run: false,
            extra_args: Vec::new(),
        }
    }
}

/// Fully resolved transfer command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    /// Strategy after the file-source downgrade.
    pub strategy: TransferStrategy,
    /// Exact argument vector, program first.
    pub argv: Vec<String>,
}

impl TransferPlan {
    /// Renders the command as a single shell-quoted line.
    pub fn command_line(&self) -> String {
        self.argv
            .iter()
            .map(|token| shell_quote(token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of [`TransferCommandBuilder::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Command was only assembled.
    DryRun(TransferPlan),
    /// Command ran to a zero exit status.
    Executed(TransferPlan),
}

/// Builds and runs `gsutil` transfer commands.
#[derive(Debug, Clone)]
pub struct TransferCommandBuilder {
    gsutil_binary: String,
    audit: AuditSink,
}

impl TransferCommandBuilder {
    /// Creates a builder using the `gsutil` binary on `PATH`.
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_GSUTIL_BINARY)
    }

    /// Creates a builder with a custom transfer binary.
    pub fn with_binary(gsutil_binary: impl Into<String>) -> Self {
        Self {
            gsutil_binary: gsutil_binary.into(),
            audit: AuditSink::disabled(),
        }
    }

    /// Records plans and executions to `audit`.
    pub fn with_audit(mut self, audit: AuditSink) -> Self {
        self.audit = audit;
        self
    }

    /// Resolves the strategy and assembles the argument vector.
    pub fn build(&self, request: &TransferRequest) -> Result<TransferPlan> {
        let requested = request.strategy.parse::<TransferStrategy>()?;
        if request.source.is_empty() {
            return Err(ValidationError::EmptyPath("source").into());
        }
        if request.destination.is_empty() {
            return Err(ValidationError::EmptyPath("destination").into());
        }

        let source_kind = PathKind::classify(&request.source);
        let destination_kind = PathKind::classify(&request.destination);

        let strategy = if requested == TransferStrategy::Sync && source_kind == PathKind::LocalFile
        {
            tracing::debug!(source = %request.source, "sync source is a file; using copy");
            TransferStrategy::Copy
        } else {
            requested
        };

        let mut argv = vec![self.gsutil_binary.clone(), "-m".to_owned()];
        match strategy {
            TransferStrategy::Sync => {
                argv.extend(["rsync".to_owned(), "-r".to_owned()]);
                if request.delete {
                    argv.push("-d".to_owned());
                }
                if request.checksum {
                    argv.push("-c".to_owned());
                }
            }
            TransferStrategy::Copy => {
                argv.push("cp".to_owned());
                if request.preserve_posix {
                    argv.push("-p".to_owned());
                }
                if source_kind == PathKind::LocalDir || destination_kind == PathKind::LocalDir {
                    argv.push("-r".to_owned());
                }
            }
        }
        argv.push(request.source.clone());
        argv.push(request.destination.clone());
        argv.extend(request.extra_args.iter().cloned());

        Ok(TransferPlan { strategy, argv })
    }

    /// Builds the command, then runs it unless the request is a dry run.
    pub fn run(
        &self,
        request: &TransferRequest,
        runner: &dyn ProcessRunner,
    ) -> Result<TransferOutcome> {
        let plan = self.build(request)?;
        if request.dry_run {
            self.audit.record(AuditEvent::TransferPlanned {
                strategy: plan.strategy,
                command: plan.argv.clone(),
            });
            return Ok(TransferOutcome::DryRun(plan));
        }

        tracing::info!(strategy = %plan.strategy, command = %plan.command_line(), "running transfer");
        match runner.run(&plan.argv) {
            Ok(()) => {
                self.audit.record(AuditEvent::TransferExecuted {
                    strategy: plan.strategy,
                    command: plan.argv.clone(),
                });
                Ok(TransferOutcome::Executed(plan))
            }
            Err(error) => {
                self.audit.record(AuditEvent::TransferFailed {
                    strategy: plan.strategy,
                    command: plan.argv.clone(),
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }
}

impl Default for TransferCommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn shell_quote(token: &str) -> String {
    let is_plain = !token.is_empty()
        && token
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || "-_./:=@%+,".contains(character));
    if is_plain {
        return token.to_owned();
    }
    format!("'{}'", token.replace('\'', r"'\''"))
}
