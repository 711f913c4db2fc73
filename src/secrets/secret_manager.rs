use crate::{
    activation::DEFAULT_GCLOUD_BINARY,
    error::{AuthError, Result},
    process::{ProcessRunner, SystemProcessRunner},
    types::SecretValue,
};

/// Version alias resolved by Secret Manager to the newest enabled version.
pub const LATEST_VERSION: &str = "latest";

/// One addressable Secret Manager secret version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretVersionRef {
    /// Project that owns the secret.
    pub project_id: String,
    /// Secret id inside the project.
    pub secret_id: String,
    /// Version number or alias.
    pub version_id: String,
}

impl SecretVersionRef {
    /// Creates a reference, defaulting the version to [`LATEST_VERSION`].
    pub fn new(
        project_id: impl Into<String>,
        secret_id: impl Into<String>,
        version_id: Option<String>,
    ) -> Result<Self> {
        let reference = Self {
            project_id: project_id.into().trim().to_owned(),
            secret_id: secret_id.into().trim().to_owned(),
            version_id: version_id
                .map(|version| version.trim().to_owned())
                .unwrap_or_else(|| LATEST_VERSION.to_owned()),
        };
        for (label, value) in [
            ("project id", &reference.project_id),
            ("secret id", &reference.secret_id),
            ("version id", &reference.version_id),
        ] {
            if value.is_empty() {
                return Err(AuthError::InvalidInput(format!("{label} must not be empty")));
            }
        }
        Ok(reference)
    }

    /// Full resource name, `projects/<p>/secrets/<s>/versions/<v>`.
    pub fn resource_name(&self) -> String {
        format!(
            "projects/{}/secrets/{}/versions/{}",
            self.project_id, self.secret_id, self.version_id
        )
    }
}

/// Reads Secret Manager payloads with the credentials `gcloud` is logged in with.
pub struct SecretManagerClient {
    gcloud_binary: String,
    runner: Box<dyn ProcessRunner>,
}

impl SecretManagerClient {
    /// Creates a client using [`DEFAULT_GCLOUD_BINARY`] from `PATH`.
    pub fn new() -> Self {
        Self::with_runner(DEFAULT_GCLOUD_BINARY, Box::new(SystemProcessRunner::new()))
    }

    /// Creates a client with a custom binary and runner.
    pub fn with_runner(gcloud_binary: impl Into<String>, runner: Box<dyn ProcessRunner>) -> Self {
        Self {
            gcloud_binary: gcloud_binary.into(),
            runner,
        }
    }

    /// Argument vector used to read one version.
    pub fn access_command(&self, reference: &SecretVersionRef) -> Vec<String> {
        vec![
            self.gcloud_binary.clone(),
            "secrets".to_owned(),
            "versions".to_owned(),
            "access".to_owned(),
            reference.version_id.clone(),
            "--secret".to_owned(),
            reference.secret_id.clone(),
            "--project".to_owned(),
            reference.project_id.clone(),
        ]
    }

    /// Reads one secret payload.
    pub fn access(&self, reference: &SecretVersionRef) -> Result<SecretValue> {
        let argv = self.access_command(reference);
        tracing::debug!(resource = %reference.resource_name(), "reading secret manager version");
        let output = self.runner.capture(&argv)?;
        if output.status_code == 0 {
            return Ok(SecretValue::new(output.stdout));
        }
        Err(AuthError::ExternalTool {
            program: self.gcloud_binary.clone(),
            status: output.status_code,
            stderr: output.stderr,
        })
    }
}

impl Default for SecretManagerClient {
    fn default() -> Self {
        Self::new()
    }
}
