use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use colab_gcp_auth::{
    activation::{ActivationOptions, CredentialActivator, ADC_ENV_VAR},
    audit::{AuditLog, AuditSink},
    error::{classify_error_code, AuthError, Result, ValidationError},
    process::{CapturedOutput, ProcessRunner},
    secrets::{provider::DEFAULT_HOST_MARKER_VAR, EnvSecretProvider, StaticSecretProvider},
    types::SecretName,
};

const KEY_JSON: &str = r#"{"type":"service_account","project_id":"demo","client_email":"sa@demo.iam.gserviceaccount.com"}"#;
static ADC_ENV_LOCK: Mutex<()> = Mutex::new(());

fn adc_env_guard() -> MutexGuard<'static, ()> {
    match ADC_ENV_LOCK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Records every command and what the key file looked like while it ran.
#[derive(Clone, Default)]
struct RecordingRunner {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    key_snapshots: Arc<Mutex<Vec<Option<String>>>>,
    fail_status: Option<i32>,
    unlink_key: bool,
}

impl RecordingRunner {
    fn failing(status: i32) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn key_snapshots(&self) -> Vec<Option<String>> {
        self.key_snapshots.lock().unwrap().clone()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, argv: &[String]) -> Result<()> {
        self.calls.lock().unwrap().push(argv.to_vec());
        if argv.get(2).map(String::as_str) == Some("activate-service-account") {
            let snapshot = fs::read_to_string(&argv[4]).ok();
            self.key_snapshots.lock().unwrap().push(snapshot);
            if self.unlink_key {
                fs::remove_file(&argv[4]).unwrap();
            }
        }
        match self.fail_status {
            Some(status) => Err(AuthError::ExternalTool {
                program: argv[0].clone(),
                status,
                stderr: String::new(),
            }),
            None => Ok(()),
        }
    }

    fn capture(&self, _argv: &[String]) -> Result<CapturedOutput> {
        panic!("activation must not capture output");
    }
}

fn options_in(key_dir: &Path) -> ActivationOptions {
    ActivationOptions {
        key_dir: Some(key_dir.to_path_buf()),
        ..ActivationOptions::default()
    }
}

fn ephemeral_options_in(key_dir: &Path) -> ActivationOptions {
    ActivationOptions {
        keep_credential_file: false,
        publish_adc_env: false,
        ..options_in(key_dir)
    }
}

fn dir_entries(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

fn provider_with_key() -> StaticSecretProvider {
    StaticSecretProvider::new().with_secret("personal_gcp_key", KEY_JSON)
}

fn audit_events(audit_log: &AuditLog) -> Vec<serde_json::Value> {
    fs::read_to_string(audit_log.path())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
        .collect()
}

#[test]
fn missing_secret_is_rejected_without_leaving_a_file() {
    let key_dir = tempfile::tempdir().unwrap();
    let provider = StaticSecretProvider::new();
    let runner = RecordingRunner::default();
    let activator = CredentialActivator::new(&provider, &runner).unwrap();

    let error = activator.activate(&options_in(key_dir.path())).unwrap_err();

    assert!(matches!(
        error,
        AuthError::Validation(ValidationError::MissingSecret(ref name)) if name == "personal_gcp_key"
    ));
    assert_eq!(dir_entries(key_dir.path()), 0);
    assert!(runner.calls().is_empty());
}

#[test]
fn empty_secret_is_rejected() {
    let key_dir = tempfile::tempdir().unwrap();
    let provider = StaticSecretProvider::new().with_secret("personal_gcp_key", "");
    let runner = RecordingRunner::default();
    let activator = CredentialActivator::new(&provider, &runner).unwrap();

    let error = activator.activate(&options_in(key_dir.path())).unwrap_err();

    assert!(matches!(
        error,
        AuthError::Validation(ValidationError::EmptySecret(_))
    ));
    assert_eq!(dir_entries(key_dir.path()), 0);
}

#[test]
fn non_json_secret_spawns_no_process() {
    let key_dir = tempfile::tempdir().unwrap();
    let provider =
        StaticSecretProvider::new().with_secret("personal_gcp_key", "/content/key.json");
    let runner = RecordingRunner::default();
    let activator = CredentialActivator::new(&provider, &runner).unwrap();

    let error = activator.activate(&options_in(key_dir.path())).unwrap_err();

    assert!(matches!(
        error,
        AuthError::Validation(ValidationError::MalformedSecret(_))
    ));
    assert!(runner.calls().is_empty());
    assert_eq!(dir_entries(key_dir.path()), 0);
}

#[test]
fn unavailable_provider_fails_before_activation() {
    let provider = StaticSecretProvider::unavailable();
    let runner = RecordingRunner::default();

    let result = CredentialActivator::new(&provider, &runner);

    assert!(matches!(result, Err(AuthError::Configuration(_))));
    assert!(runner.calls().is_empty());
}

#[test]
fn default_env_provider_outside_notebook_host_is_a_configuration_error() {
    let _guard = adc_env_guard();
    let saved_marker = std::env::var_os(DEFAULT_HOST_MARKER_VAR);
    std::env::remove_var(DEFAULT_HOST_MARKER_VAR);
    std::env::set_var("COLAB_SECRET_PERSONAL_GCP_KEY", KEY_JSON);

    let provider = EnvSecretProvider::new();
    let runner = RecordingRunner::default();
    let result = CredentialActivator::new(&provider, &runner).map(drop);

    std::env::remove_var("COLAB_SECRET_PERSONAL_GCP_KEY");
    if let Some(marker) = saved_marker {
        std::env::set_var(DEFAULT_HOST_MARKER_VAR, marker);
    }

    let error = result.unwrap_err();
    assert!(matches!(error, AuthError::Configuration(_)));
    assert_eq!(classify_error_code(&error), "E103");
    assert!(runner.calls().is_empty());
}

#[test]
fn keep_mode_writes_private_key_and_publishes_adc() {
    let _guard = adc_env_guard();
    let key_dir = tempfile::tempdir().unwrap();
    let provider = provider_with_key();
    let runner = RecordingRunner::default();
    let activator = CredentialActivator::new(&provider, &runner).unwrap();

    let context = activator.activate(&options_in(key_dir.path())).unwrap();

    assert!(context.kept);
    assert!(context.adc_published);
    assert!(context.key_path.is_absolute());
    assert_eq!(context.credentials_file(), Some(context.key_path.as_path()));
    assert_eq!(fs::read_to_string(&context.key_path).unwrap(), KEY_JSON);
    let file_name = context.key_path.file_name().unwrap().to_str().unwrap();
    assert!(file_name.starts_with("gcp-sa-"));
    assert!(file_name.ends_with(".json"));
    assert_eq!(
        std::env::var_os(ADC_ENV_VAR).as_deref(),
        Some(context.key_path.as_os_str())
    );
    assert_eq!(
        runner.calls(),
        vec![vec![
            "gcloud".to_owned(),
            "auth".to_owned(),
            "activate-service-account".to_owned(),
            "--key-file".to_owned(),
            context.key_path.to_string_lossy().into_owned(),
        ]]
    );

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&context.key_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    std::env::remove_var(ADC_ENV_VAR);
}

#[test]
fn keep_mode_without_publication_leaves_environment_alone() {
    let _guard = adc_env_guard();
    std::env::remove_var(ADC_ENV_VAR);
    let key_dir = tempfile::tempdir().unwrap();
    let provider = provider_with_key();
    let runner = RecordingRunner::default();
    let activator = CredentialActivator::new(&provider, &runner).unwrap();

    let context = activator
        .activate(&ActivationOptions {
            publish_adc_env: false,
            ..options_in(key_dir.path())
        })
        .unwrap();

    assert!(context.kept);
    assert!(!context.adc_published);
    assert!(context.key_path.exists());
    assert!(std::env::var_os(ADC_ENV_VAR).is_none());
}

#[test]
fn keep_mode_failure_leaves_key_file_in_place() {
    let _guard = adc_env_guard();
    let key_dir = tempfile::tempdir().unwrap();
    let provider = provider_with_key();
    let runner = RecordingRunner::failing(1);
    let activator = CredentialActivator::new(&provider, &runner).unwrap();

    let error = activator.activate(&options_in(key_dir.path())).unwrap_err();

    assert!(matches!(error, AuthError::ExternalTool { status: 1, .. }));
    assert_eq!(dir_entries(key_dir.path()), 1);
    std::env::remove_var(ADC_ENV_VAR);
}

#[test]
fn project_step_runs_after_activation() {
    let key_dir = tempfile::tempdir().unwrap();
    let provider = provider_with_key();
    let runner = RecordingRunner::default();
    let activator = CredentialActivator::new(&provider, &runner)
        .unwrap()
        .with_gcloud_binary("/sdk/bin/gcloud");

    let context = activator
        .activate(&ActivationOptions {
            project_id: Some("demo-project".to_owned()),
            ..ephemeral_options_in(key_dir.path())
        })
        .unwrap();

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0][..3], ["/sdk/bin/gcloud", "auth", "activate-service-account"]);
    assert_eq!(
        calls[1],
        vec!["/sdk/bin/gcloud", "config", "set", "project", "demo-project"]
    );
    assert_eq!(context.project_id.as_deref(), Some("demo-project"));
}

#[test]
fn ephemeral_mode_removes_key_after_success() {
    let key_dir = tempfile::tempdir().unwrap();
    let provider = provider_with_key();
    let runner = RecordingRunner::default();
    let activator = CredentialActivator::new(&provider, &runner).unwrap();

    let context = activator
        .activate(&ephemeral_options_in(key_dir.path()))
        .unwrap();

    assert!(!context.kept);
    assert!(!context.adc_published);
    assert!(context.credentials_file().is_none());
    assert!(!context.key_path.exists());
    assert_eq!(runner.key_snapshots(), vec![Some(KEY_JSON.to_owned())]);
    assert_eq!(dir_entries(key_dir.path()), 0);
}

#[test]
fn ephemeral_mode_removes_key_after_tool_failure() {
    let key_dir = tempfile::tempdir().unwrap();
    let provider = provider_with_key();
    let runner = RecordingRunner::failing(2);
    let activator = CredentialActivator::new(&provider, &runner).unwrap();

    let error = activator
        .activate(&ephemeral_options_in(key_dir.path()))
        .unwrap_err();

    assert!(matches!(error, AuthError::ExternalTool { status: 2, .. }));
    assert_eq!(runner.key_snapshots(), vec![Some(KEY_JSON.to_owned())]);
    assert_eq!(dir_entries(key_dir.path()), 0);
}

#[test]
fn ephemeral_tool_failure_outranks_key_removal_failure() {
    let key_dir = tempfile::tempdir().unwrap();
    let audit_dir = tempfile::tempdir().unwrap();
    let audit_log = AuditLog::new(audit_dir.path().join("audit.jsonl")).unwrap();
    let provider = provider_with_key();
    let runner = RecordingRunner {
        unlink_key: true,
        ..RecordingRunner::failing(2)
    };
    let activator = CredentialActivator::new(&provider, &runner)
        .unwrap()
        .with_audit(AuditSink::to_log(audit_log.clone()));

    let error = activator
        .activate(&ephemeral_options_in(key_dir.path()))
        .unwrap_err();

    assert!(matches!(error, AuthError::ExternalTool { status: 2, .. }));
    let events = audit_events(&audit_log);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "credential_activation_failed");
    assert_eq!(events[0]["code"], "E400");
}

#[test]
fn ephemeral_key_removal_failure_is_not_recorded_as_removed() {
    let key_dir = tempfile::tempdir().unwrap();
    let audit_dir = tempfile::tempdir().unwrap();
    let audit_log = AuditLog::new(audit_dir.path().join("audit.jsonl")).unwrap();
    let provider = provider_with_key();
    let runner = RecordingRunner {
        unlink_key: true,
        ..RecordingRunner::default()
    };
    let activator = CredentialActivator::new(&provider, &runner)
        .unwrap()
        .with_audit(AuditSink::to_log(audit_log.clone()));

    let error = activator
        .activate(&ephemeral_options_in(key_dir.path()))
        .unwrap_err();

    assert!(matches!(error, AuthError::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound));
    let events = audit_events(&audit_log)
        .into_iter()
        .map(|event| event["event"].clone())
        .collect::<Vec<_>>();
    assert_eq!(events, vec!["credential_activation_failed"]);
}

#[test]
fn custom_secret_name_is_read() {
    let key_dir = tempfile::tempdir().unwrap();
    let provider = StaticSecretProvider::new().with_secret("team_key", KEY_JSON);
    let runner = RecordingRunner::default();
    let activator = CredentialActivator::new(&provider, &runner).unwrap();

    activator
        .activate(&ActivationOptions {
            secret_name: SecretName::new("team_key").unwrap(),
            ..ephemeral_options_in(key_dir.path())
        })
        .unwrap();

    assert_eq!(runner.calls().len(), 1);
}

#[test]
fn audit_log_records_activation_without_secret_text() {
    let key_dir = tempfile::tempdir().unwrap();
    let audit_dir = tempfile::tempdir().unwrap();
    let audit_log = AuditLog::new(audit_dir.path().join("audit.jsonl")).unwrap();
    let provider = provider_with_key();
    let runner = RecordingRunner::default();
    let activator = CredentialActivator::new(&provider, &runner)
        .unwrap()
        .with_audit(AuditSink::to_log(audit_log.clone()));

    activator
        .activate(&ActivationOptions {
            project_id: Some("demo-project".to_owned()),
            ..ephemeral_options_in(key_dir.path())
        })
        .unwrap();

    let raw = fs::read_to_string(audit_log.path()).unwrap();
    assert!(!raw.contains("client_email"));
    let events = raw
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["event"].clone())
        .collect::<Vec<_>>();
    assert_eq!(
        events,
        vec![
            "project_configured",
            "credential_file_removed",
            "credential_activated"
        ]
    );
}

#[test]
fn audit_log_records_activation_failure() {
    let key_dir = tempfile::tempdir().unwrap();
    let audit_dir = tempfile::tempdir().unwrap();
    let audit_log = AuditLog::new(audit_dir.path().join("audit.jsonl")).unwrap();
    let provider = provider_with_key();
    let runner = RecordingRunner::failing(1);
    let activator = CredentialActivator::new(&provider, &runner)
        .unwrap()
        .with_audit(AuditSink::to_log(audit_log.clone()));

    activator
        .activate(&ephemeral_options_in(key_dir.path()))
        .unwrap_err();

    let raw = fs::read_to_string(audit_log.path()).unwrap();
    let last: serde_json::Value = serde_json::from_str(raw.lines().last().unwrap()).unwrap();
    assert_eq!(last["event"], "credential_activation_failed");
    assert_eq!(last["code"], "E400");
}
