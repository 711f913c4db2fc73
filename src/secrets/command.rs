use crate::{
    error::{AuthError, Result},
    process::{is_binary_available, ProcessRunner, SystemProcessRunner},
    types::{SecretName, SecretValue},
};

use super::SecretProvider;

/// Exit status a helper uses to report an absent secret.
pub const ABSENT_EXIT_STATUS: i32 = 1;

/// Reads secrets by running a helper command with the secret name appended.
///
/// The helper prints the secret on stdout and exits 0. Exit status 1 with
/// no output means the entry does not exist; anything else is a failure.
pub struct CommandSecretProvider {
    command: Vec<String>,
    runner: Box<dyn ProcessRunner>,
}

impl CommandSecretProvider {
    /// Creates a provider that spawns `command` directly.
    pub fn new(command: Vec<String>) -> Self {
        Self::with_runner(command, Box::new(SystemProcessRunner::new()))
    }

    /// Creates a provider with a custom runner, useful for tests.
    pub fn with_runner(command: Vec<String>, runner: Box<dyn ProcessRunner>) -> Self {
        Self { command, runner }
    }
}

impl SecretProvider for CommandSecretProvider {
    fn probe(&self) -> Result<()> {
        let Some(program) = self.command.first() else {
            return Err(AuthError::Configuration(
                "secret helper command is empty".to_owned(),
            ));
        };
        if is_binary_available(program) {
            return Ok(());
        }
        Err(AuthError::Configuration(format!(
            "secret helper is not available in this runtime: {program}"
        )))
    }

    fn get(&self, name: &SecretName) -> Result<Option<SecretValue>> {
        let mut argv = self.command.clone();
        argv.push(name.as_str().to_owned());
        let output = self.runner.capture(&argv)?;
        if output.status_code == 0 {
            let text = output
                .stdout
                .strip_suffix('\n')
                .map(|trimmed| trimmed.strip_suffix('\r').unwrap_or(trimmed))
                .unwrap_or(output.stdout.as_str())
                .to_owned();
            return Ok(Some(SecretValue::new(text)));
        }
        if output.status_code == ABSENT_EXIT_STATUS && output.stdout.is_empty() {
            return Ok(None);
        }
        Err(AuthError::ExternalTool {
            program: argv[0].clone(),
            status: output.status_code,
            stderr: output.stderr,
        })
    }
}
