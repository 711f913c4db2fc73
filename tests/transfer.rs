use std::{
    fs,
    sync::{Arc, Mutex},
};

use colab_gcp_auth::{
    error::{AuthError, Result, ValidationError},
    process::{CapturedOutput, ProcessRunner},
    transfer::{TransferCommandBuilder, TransferOutcome, TransferRequest, TransferStrategy},
};

#[derive(Clone, Default)]
struct RecordingRunner {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    fail_status: Option<i32>,
}

impl RecordingRunner {
    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, argv: &[String]) -> Result<()> {
        self.calls.lock().unwrap().push(argv.to_vec());
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
        panic!("transfers never capture output");
    }
}

fn strings(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|token| (*token).to_owned()).collect()
}

#[test]
fn sync_between_remote_paths_uses_rsync_with_flags_in_order() {
    let builder = TransferCommandBuilder::new();
    let request = TransferRequest {
        delete: true,
        checksum: true,
        ..TransferRequest::new("gs://src-bucket/data", "gs://dst-bucket/data")
    };

    let plan = builder.build(&request).unwrap();

    assert_eq!(plan.strategy, TransferStrategy::Sync);
    assert_eq!(
        plan.argv,
        strings(&[
            "gsutil",
            "-m",
            "rsync",
            "-r",
            "-d",
            "-c",
            "gs://src-bucket/data",
            "gs://dst-bucket/data"
        ])
    );
}

#[test]
fn sync_of_single_local_file_becomes_copy() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file = temp_dir.path().join("model.pt");
    fs::write(&file, b"weights").unwrap();
    let source = file.to_str().unwrap();

    let plan = TransferCommandBuilder::new()
        .build(&TransferRequest {
            delete: true,
            ..TransferRequest::new(source, "gs://bucket/models/")
        })
        .unwrap();

    assert_eq!(plan.strategy, TransferStrategy::Copy);
    assert_eq!(
        plan.argv,
        strings(&["gsutil", "-m", "cp", source, "gs://bucket/models/"])
    );
}

#[test]
fn copy_of_local_directory_is_recursive() {
    let temp_dir = tempfile::tempdir().unwrap();
    let source = temp_dir.path().to_str().unwrap();

    let plan = TransferCommandBuilder::new()
        .build(&TransferRequest {
            strategy: "COPY".to_owned(),
            ..TransferRequest::new(source, "gs://bucket/outputs")
        })
        .unwrap();

    assert_eq!(
        plan.argv,
        strings(&["gsutil", "-m", "cp", "-r", source, "gs://bucket/outputs"])
    );
}

#[test]
fn copy_into_local_directory_preserves_posix_before_recursion() {
    let temp_dir = tempfile::tempdir().unwrap();
    let destination = temp_dir.path().to_str().unwrap();

    let plan = TransferCommandBuilder::new()
        .build(&TransferRequest {
            strategy: "copy".to_owned(),
            preserve_posix: true,
            ..TransferRequest::new("gs://bucket/outputs", destination)
        })
        .unwrap();

    assert_eq!(
        plan.argv,
        strings(&[
            "gsutil",
            "-m",
            "cp",
            "-p",
            "-r",
            "gs://bucket/outputs",
            destination
        ])
    );
}

#[test]
fn copy_between_remote_paths_is_not_recursive() {
    let plan = TransferCommandBuilder::new()
        .build(&TransferRequest {
            strategy: "copy".to_owned(),
            ..TransferRequest::new("gs://a/object", "gs://b/object")
        })
        .unwrap();

    assert!(!plan.argv.contains(&"-r".to_owned()));
}

#[test]
fn sync_ignores_copy_only_flags() {
    let plan = TransferCommandBuilder::new()
        .build(&TransferRequest {
            preserve_posix: true,
            ..TransferRequest::new("gs://a/dir", "gs://b/dir")
        })
        .unwrap();

    assert!(!plan.argv.contains(&"-p".to_owned()));
}

#[test]
fn extra_arguments_are_appended_verbatim() {
    let plan = TransferCommandBuilder::with_binary("/sdk/bin/gsutil")
        .build(&TransferRequest {
            extra_args: strings(&["-x", ".*\\.tmp$"]),
            ..TransferRequest::new("gs://a/dir", "gs://b/dir")
        })
        .unwrap();

    assert_eq!(plan.argv[0], "/sdk/bin/gsutil");
    assert_eq!(plan.argv[plan.argv.len() - 2..], ["-x", ".*\\.tmp$"]);
}

#[test]
fn dry_run_spawns_nothing() {
    let runner = RecordingRunner::default();
    let request = TransferRequest {
        dry_run: true,
        ..TransferRequest::new("gs://a/dir", "gs://b/dir")
    };

    let outcome = TransferCommandBuilder::new().run(&request, &runner).unwrap();

    match outcome {
        TransferOutcome::DryRun(plan) => {
            assert_eq!(plan.command_line(), "gsutil -m rsync -r gs://a/dir gs://b/dir");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(runner.calls().is_empty());
}

#[test]
fn execution_runs_the_planned_command_once() {
    let runner = RecordingRunner::default();

    let outcome = TransferCommandBuilder::new()
        .run(&TransferRequest::new("gs://a/dir", "gs://b/dir"), &runner)
        .unwrap();

    let TransferOutcome::Executed(plan) = outcome else {
        panic!("transfer was not executed");
    };
    assert_eq!(runner.calls(), vec![plan.argv]);
}

#[test]
fn unknown_strategy_is_rejected_without_processes() {
    let runner = RecordingRunner::default();
    let request = TransferRequest {
        strategy: "mirror".to_owned(),
        ..TransferRequest::new("gs://a/dir", "gs://b/dir")
    };

    let error = TransferCommandBuilder::new()
        .run(&request, &runner)
        .unwrap_err();

    assert!(matches!(
        error,
        AuthError::Validation(ValidationError::UnknownStrategy(ref value)) if value == "mirror"
    ));
    assert!(runner.calls().is_empty());
}

#[test]
fn empty_paths_are_rejected() {
    let error = TransferCommandBuilder::new()
        .build(&TransferRequest::new("", "gs://b/dir"))
        .unwrap_err();

    assert!(matches!(
        error,
        AuthError::Validation(ValidationError::EmptyPath("source"))
    ));
}

#[test]
fn tool_failure_is_surfaced() {
    let runner = RecordingRunner {
        fail_status: Some(1),
        ..RecordingRunner::default()
    };

    let error = TransferCommandBuilder::new()
        .run(&TransferRequest::new("gs://a/dir", "gs://b/dir"), &runner)
        .unwrap_err();

    assert!(matches!(error, AuthError::ExternalTool { status: 1, .. }));
    assert_eq!(runner.calls().len(), 1);
}
