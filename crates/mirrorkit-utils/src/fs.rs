use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::{FileSystemError, FileSystemResult};

/// Creates a directory structure if it doesn't exist.
///
/// # Errors
///
/// * [`FileSystemError::Directory`] if the directory could not be created.
/// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| {
            FileSystemError::Directory {
                path: path.to_path_buf(),
                action: "create",
                source: err,
            }
        })?;
    } else if !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

/// Writes `data` to `path` through a sibling `.part` file and a rename.
///
/// Readers never observe a half-written file at `path`.
pub fn write_atomic<P: AsRef<Path>>(path: P, data: &[u8]) -> FileSystemResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        ensure_dir_exists(parent)?;
    }

    let part = part_path(path);
    let file_err = |action: &'static str, target: &Path| {
        let target = target.to_path_buf();
        move |err| {
            FileSystemError::File {
                path: target,
                action,
                source: err,
            }
        }
    };

    let mut file = fs::File::create(&part).map_err(file_err("create", &part))?;
    file.write_all(data).map_err(file_err("write", &part))?;
    file.sync_all().map_err(file_err("sync", &part))?;
    fs::rename(&part, path).map_err(file_err("rename", path))?;
    Ok(())
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
