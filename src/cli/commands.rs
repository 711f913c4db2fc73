use zeroize::Zeroize;

use crate::{
    activation::CredentialActivator,
    audit::AuditEvent,
    error::{explain_error_code, known_error_codes, normalize_error_code, AuthError, Result},
    process::SystemProcessRunner,
    secrets::{SecretManagerClient, SecretVersionRef},
    transfer::{TransferCommandBuilder, TransferOutcome, TransferRequest},
};

use super::{
    output::{self, OutputStatus},
    runtime::{self, ConnectFlags, EffectiveCliState},
    Cli, Command, ConfigCommand, SecretCommand,
};

const ACTIVATED_MESSAGE: &str = "activated";

pub(crate) fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Explain { code } => return run_explain(&code),
        Command::Version { json } => return run_version(json),
        _ => {}
    }

    let state = runtime::load_effective_state(cli.config.as_deref(), cli.no_config)?;
    let code = match cli.command {
        Command::Connect {
            secret,
            project,
            keep,
            ephemeral,
            no_adc,
        } => run_connect(
            &state,
            ConnectFlags {
                secret,
                project,
                keep,
                ephemeral,
                no_adc,
            },
        )?,
        Command::Transfer {
            source,
            destination,
            strategy,
            delete,
            checksum,
            preserve_posix,
            dry_run,
            extra,
        } => run_transfer(
            &state,
            TransferRequest {
                source,
                destination,
                strategy,
                delete,
                checksum,
                preserve_posix,
                dry_run,
                extra_args: extra,
            },
        )?,
        Command::Secret { command } => match command {
            SecretCommand::Get {
                project,
                secret,
                version,
            } => run_secret_get(&state, SecretVersionRef::new(project, secret, version)?)?,
        },
        Command::Config { command } => match command {
            ConfigCommand::Validate => run_config_validate(&state)?,
        },
        Command::Explain { .. } | Command::Version { .. } => None,
    };
    Ok(code.unwrap_or(0))
}

fn run_connect(state: &EffectiveCliState, flags: ConnectFlags) -> Result<Option<i32>> {
    let config = &state.config;
    let options = runtime::activation_options_for(config, flags)?;
    let provider = runtime::secret_provider_for(&config.secrets);
    let runner = SystemProcessRunner::new();
    let activator = CredentialActivator::new(provider.as_ref(), &runner)?
        .with_gcloud_binary(config.gcloud_binary.clone())
        .with_audit(runtime::audit_sink_for(config)?);

    let context = activator.activate(&options)?;
    match context.credentials_file() {
        Some(path) => stdout_line_or_exit(&path.display().to_string()),
        None => stdout_line_or_exit(ACTIVATED_MESSAGE),
    }
}

fn run_transfer(state: &EffectiveCliState, request: TransferRequest) -> Result<Option<i32>> {
    let config = &state.config;
    let builder = TransferCommandBuilder::with_binary(config.gsutil_binary.clone())
        .with_audit(runtime::audit_sink_for(config)?);
    match builder.run(&request, &SystemProcessRunner::new())? {
        TransferOutcome::DryRun(plan) => stdout_line_or_exit(&plan.command_line()),
        TransferOutcome::Executed(_) => Ok(None),
    }
}

fn run_secret_get(state: &EffectiveCliState, reference: SecretVersionRef) -> Result<Option<i32>> {
    let config = &state.config;
    let client = SecretManagerClient::with_runner(
        config.gcloud_binary.clone(),
        Box::new(SystemProcessRunner::new()),
    );
    let secret = client.access(&reference)?;
    runtime::audit_sink_for(config)?.record(AuditEvent::SecretManagerAccessed {
        resource: reference.resource_name(),
    });

    let mut secret_bytes = secret.expose(|text| text.as_bytes().to_vec());
    let output_result = stdout_bytes_or_exit(&secret_bytes);
    secret_bytes.zeroize();
    output_result
}

fn run_config_validate(state: &EffectiveCliState) -> Result<Option<i32>> {
    let payload = serde_json::json!({
        "source": state.selection.source,
        "path": state.selection.path,
        "effective": state.config,
    });
    stdout_line_or_exit(&serde_json::to_string_pretty(&payload)?)
}

fn run_explain(raw: &str) -> Result<i32> {
    let code = normalize_error_code(raw);
    let Some(explanation) = explain_error_code(&code) else {
        return Err(AuthError::InvalidInput(format!(
            "unknown error code '{code}' (known: {})",
            known_error_codes().join(", ")
        )));
    };
    Ok(stdout_line_or_exit(explanation)?.unwrap_or(0))
}

fn run_version(json: bool) -> Result<i32> {
    let version = env!("CARGO_PKG_VERSION");
    let line = if json {
        serde_json::json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": version,
            "defaults": {
                "gcloud": crate::activation::DEFAULT_GCLOUD_BINARY,
                "gsutil": crate::transfer::DEFAULT_GSUTIL_BINARY,
                "secret_name": crate::types::DEFAULT_SECRET_NAME,
                "config_file": crate::config::CONFIG_FILE_NAME,
            },
        })
        .to_string()
    } else {
        format!("{} {version}", env!("CARGO_PKG_NAME"))
    };
    Ok(stdout_line_or_exit(&line)?.unwrap_or(0))
}

fn stdout_line_or_exit(line: &str) -> Result<Option<i32>> {
    match output::stdout_line(line) {
        Ok(OutputStatus::Written) => Ok(None),
        Ok(OutputStatus::BrokenPipe) => Ok(Some(0)),
        Err(error) => Err(AuthError::Io(error)),
    }
}

fn stdout_bytes_or_exit(bytes: &[u8]) -> Result<Option<i32>> {
    match output::stdout_bytes(bytes) {
        Ok(OutputStatus::Written) => Ok(None),
        Ok(OutputStatus::BrokenPipe) => Ok(Some(0)),
        Err(error) => Err(AuthError::Io(error)),
    }
}
