use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::{Builder, NamedTempFile};

use crate::error::Result;

/// Default Unix mode for private files.
pub const PRIVATE_FILE_MODE: u32 = 0o600;
/// File name prefix for materialized service account keys.
pub const KEY_FILE_PREFIX: &str = "gcp-sa-";
/// File name suffix for materialized service account keys.
pub const KEY_FILE_SUFFIX: &str = ".json";

/// Creates a uniquely named private key file in `dir` and writes `text` into it.
///
/// The file is opened with mode `0600` at creation, so the content is never
/// visible to other users. The returned handle deletes the file on drop
/// unless it is persisted with [`NamedTempFile::keep`].
pub fn write_private_temp_file(dir: &Path, text: &str) -> Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(KEY_FILE_PREFIX).suffix(KEY_FILE_SUFFIX);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(PRIVATE_FILE_MODE));
    }

    let mut file = builder.tempfile_in(dir)?;
    set_permissions(file.path(), PRIVATE_FILE_MODE)?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Detaches a temp file from drop-cleanup and returns its path.
pub fn persist_temp_file(file: NamedTempFile) -> Result<PathBuf> {
    let (_, path) = file.keep().map_err(|error| error.error)?;
    Ok(path)
}

/// Creates a private file only if it does not exist.
pub fn create_private_file_if_missing(path: &Path) -> Result<()> {
    if !path.exists() {
        create_parent_dir(path)?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
    }
    set_permissions(path, PRIVATE_FILE_MODE)
}

/// Applies Unix permissions when supported.
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

fn create_parent_dir(path: &Path) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
