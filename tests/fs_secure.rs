use colab_gcp_auth::fs_secure::{
    create_private_file_if_missing, persist_temp_file, write_private_temp_file,
};

#[test]
fn create_private_file_if_missing_does_not_truncate() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file_path = temp_dir.path().join("logs/audit.jsonl");

    create_private_file_if_missing(&file_path).unwrap();
    std::fs::write(&file_path, b"line\n").unwrap();
    create_private_file_if_missing(&file_path).unwrap();

    assert_eq!(std::fs::read(&file_path).unwrap(), b"line\n");
}

#[test]
fn temp_key_files_have_unique_names() {
    let temp_dir = tempfile::tempdir().unwrap();

    let first = write_private_temp_file(temp_dir.path(), "{}").unwrap();
    let second = write_private_temp_file(temp_dir.path(), "{}").unwrap();

    assert_ne!(first.path(), second.path());
}

#[test]
fn dropped_temp_key_file_is_removed() {
    let temp_dir = tempfile::tempdir().unwrap();

    let file = write_private_temp_file(temp_dir.path(), "{}").unwrap();
    let path = file.path().to_path_buf();
    assert!(path.exists());
    drop(file);

    assert!(!path.exists());
}

#[test]
fn persisted_temp_key_file_survives() {
    let temp_dir = tempfile::tempdir().unwrap();

    let file = write_private_temp_file(temp_dir.path(), r#"{"type":"service_account"}"#).unwrap();
    let path = persist_temp_file(file).unwrap();

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        r#"{"type":"service_account"}"#
    );
}

#[cfg(unix)]
#[test]
fn private_permissions_are_restricted() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = tempfile::tempdir().unwrap();
    let key_file = write_private_temp_file(temp_dir.path(), "{}").unwrap();
    let audit_path = temp_dir.path().join("audit.jsonl");
    create_private_file_if_missing(&audit_path).unwrap();

    let key_mode = std::fs::metadata(key_file.path())
        .unwrap()
        .permissions()
        .mode()
        & 0o777;
    let audit_mode = std::fs::metadata(&audit_path).unwrap().permissions().mode() & 0o777;

    assert_eq!(key_mode, 0o600);
    assert_eq!(audit_mode, 0o600);
}
