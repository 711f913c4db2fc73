mod commands;
mod output;
mod runtime;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::error::{classify_error_code, AuthError, Result};

const SECRET_NAME_ARG_HELP: &str =
    "Notebook secret holding the service account JSON (default: `personal_gcp_key`).";
const STRATEGY_ARG_HELP: &str =
    "Transfer strategy: `sync` (gsutil rsync -r) or `copy` (gsutil cp). Case-insensitive.";
const ERROR_CODE_ARG_HELP: &str = "Error code from CLI stderr (example: `E101`).";
const ERROR_FORMAT_ARG_HELP: &str = "Error output format (`text` or `json`).";
const CLI_AFTER_HELP: &str = r#"Examples:
  colab-gcp-auth connect
  colab-gcp-auth connect --secret personal_gcp_key --project my-project
  colab-gcp-auth connect --ephemeral
  colab-gcp-auth transfer ./outputs gs://my-bucket/outputs --delete
  colab-gcp-auth transfer gs://my-bucket/model.pt . --strategy copy --dry-run
  colab-gcp-auth secret get --project my-project --secret db-password
  colab-gcp-auth explain E101

More help:
  colab-gcp-auth help <command>
"#;
const CONNECT_COMMAND_AFTER_HELP: &str = r#"Examples:
  colab-gcp-auth connect
  colab-gcp-auth connect --project my-project
  colab-gcp-auth connect --ephemeral

Notes:
  - By default the key file is kept for the session and
    GOOGLE_APPLICATION_CREDENTIALS points at it. The printed path can be
    deleted when you are done; client libraries stop working afterwards.
  - `--ephemeral` deletes the key file before returning and only
    authenticates gcloud/gsutil.
  - `--keep` keeps the key file even when the config sets
    `activation.keep_credential_file = false`.
"#;
const TRANSFER_COMMAND_AFTER_HELP: &str = r#"Examples:
  colab-gcp-auth transfer ./data gs://bucket/data
  colab-gcp-auth transfer ./data gs://bucket/data --delete --checksum
  colab-gcp-auth transfer ./model.pt gs://bucket/models/ --strategy copy
  colab-gcp-auth transfer gs://bucket/data ./data --dry-run -- -x '\.tmp$'

Notes:
  - `sync` with a single local file source runs `gsutil cp` instead.
  - `cp -r` is added only when a local side is a directory.
  - Arguments after `--` are appended verbatim.
"#;
const SECRET_COMMAND_AFTER_HELP: &str = r#"Examples:
  colab-gcp-auth connect
  colab-gcp-auth secret get --project my-project --secret db-password
  colab-gcp-auth secret get --project my-project --secret db-password --version 3
"#;
const EXPLAIN_COMMAND_AFTER_HELP: &str = r#"Examples:
  colab-gcp-auth explain E101
  colab-gcp-auth explain e400

Tip:
  Error codes are shown in stderr output, for example `error[E101]: ...`.
"#;

/// Top-level command line parser.
#[derive(Debug, Parser)]
#[command(
    name = "colab-gcp-auth",
    version,
    about = "Activate a GCP service account from notebook secrets and drive gsutil transfers.",
    after_help = CLI_AFTER_HELP,
    infer_subcommands = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Config file override path.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Disable config loading and discovery.
    #[arg(long, global = true)]
    pub no_config: bool,
    /// Show debug diagnostics on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Error output format.
    #[arg(long, value_enum, global = true, default_value_t = ErrorFormatArg::Text, help = ERROR_FORMAT_ARG_HELP)]
    pub error_format: ErrorFormatArg,
    /// Subcommand.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Activates the service account stored in a notebook secret.
    #[command(after_help = CONNECT_COMMAND_AFTER_HELP)]
    Connect {
        /// Secret name.
        #[arg(long, help = SECRET_NAME_ARG_HELP)]
        secret: Option<String>,
        /// Project to select with `gcloud config set project`.
        #[arg(long)]
        project: Option<String>,
        /// Keep the key file even when the config disables it.
        #[arg(long, conflicts_with = "ephemeral")]
        keep: bool,
        /// Delete the key file before returning; implies `--no-adc`.
        #[arg(long)]
        ephemeral: bool,
        /// Do not set GOOGLE_APPLICATION_CREDENTIALS.
        #[arg(long)]
        no_adc: bool,
    },
    /// Copies or synchronises data with Cloud Storage through gsutil.
    #[command(after_help = TRANSFER_COMMAND_AFTER_HELP)]
    Transfer {
        /// Source path or `gs://` URL.
        source: String,
        /// Destination path or `gs://` URL.
        destination: String,
        /// Transfer strategy.
        #[arg(long, default_value = "sync", help = STRATEGY_ARG_HELP)]
        strategy: String,
        /// Delete destination objects missing from the source (sync).
        #[arg(long)]
        delete: bool,
        /// Compare checksums instead of modification times (sync).
        #[arg(long)]
        checksum: bool,
        /// Preserve POSIX attributes (copy).
        #[arg(long)]
        preserve_posix: bool,
        /// Print the gsutil command instead of running it.
        #[arg(long)]
        dry_run: bool,
        /// Extra gsutil arguments, appended verbatim.
        #[arg(last = true, allow_hyphen_values = true)]
        extra: Vec<String>,
    },
    /// Reads Google Secret Manager values with the activated account.
    #[command(after_help = SECRET_COMMAND_AFTER_HELP)]
    Secret {
        /// Secret operation.
        #[command(subcommand)]
        command: SecretCommand,
    },
    /// Explains a stable error code with recovery guidance.
    #[command(after_help = EXPLAIN_COMMAND_AFTER_HELP)]
    Explain {
        /// Error code from stderr (for example: `E101`).
        #[arg(help = ERROR_CODE_ARG_HELP)]
        code: String,
    },
    /// Prints version and runtime defaults.
    #[command(visible_alias = "ver")]
    Version {
        /// Print structured JSON output.
        #[arg(long)]
        json: bool,
    },
    /// Inspects loaded config state.
    Config {
        /// Config operation.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Supported Secret Manager subcommands.
#[derive(Debug, Subcommand)]
pub enum SecretCommand {
    /// Prints one secret version payload.
    Get {
        /// Project that owns the secret.
        #[arg(long)]
        project: String,
        /// Secret id.
        #[arg(long)]
        secret: String,
        /// Version number or alias.
        #[arg(long)]
        version: Option<String>,
    },
}

/// Supported config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Validates the effective config and prints it as JSON.
    Validate,
}

/// Error format argument.
#[derive(Debug, Clone, Copy, ValueEnum, Eq, PartialEq)]
pub enum ErrorFormatArg {
    /// Human-readable text diagnostics.
    Text,
    /// Machine-readable JSON diagnostics.
    Json,
}

/// Runs CLI and returns process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    commands::run(cli)
}

/// Renders a runtime error for stderr in the requested format.
pub fn render_error(error: &AuthError, format: ErrorFormatArg) -> String {
    let code = classify_error_code(error);
    match format {
        ErrorFormatArg::Text => format!(
            "error[{code}]: {error}\nhint: run `colab-gcp-auth explain {code}`"
        ),
        ErrorFormatArg::Json => serde_json::json!({
            "code": code,
            "message": error.to_string(),
        })
        .to_string(),
    }
}

/// Writes a rendered runtime error to stderr.
pub fn report_error(error: &AuthError, format: ErrorFormatArg) {
    let _ = output::stderr_diagnostic(&render_error(error, format));
}
