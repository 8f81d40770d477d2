use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use uuid::Uuid;

use crate::error::Result;

/// Default Unix mode for private directories.
pub const PRIVATE_DIR_MODE: u32 = 0o700;
/// Default Unix mode for private files.
pub const PRIVATE_FILE_MODE: u32 = 0o600;
/// Default Unix mode for hook scripts.
pub const EXECUTABLE_FILE_MODE: u32 = 0o755;

/// Ensures a directory exists and applies restricted permissions.
pub fn ensure_private_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    set_permissions(path, PRIVATE_DIR_MODE)
}

/// Writes a file atomically with restricted permissions.
///
/// On platforms without Unix permission bits the file is marked hidden and
/// read-only instead.
pub fn write_private_file_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    create_parent_dir(path)?;

    let temp_path = temp_path_for(path);
    fs::write(&temp_path, bytes)?;
    set_permissions(&temp_path, PRIVATE_FILE_MODE)?;
    if let Err(error) = replace_file(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }
    set_permissions(path, PRIVATE_FILE_MODE)?;
    restrict_without_mode_bits(path)
}

/// Writes a shared (non-secret) file atomically.
///
/// Readers observe either the previous content or the new content, never a
/// truncated file.
pub fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    create_parent_dir(path)?;

    let temp_path = temp_path_for(path);
    fs::write(&temp_path, bytes)?;
    if let Err(error) = replace_file(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }
    Ok(())
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

/// Marks a script executable when supported.
pub fn set_executable(path: &Path) -> Result<()> {
    set_permissions(path, EXECUTABLE_FILE_MODE)
}

#[cfg(unix)]
fn restrict_without_mode_bits(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn restrict_without_mode_bits(path: &Path) -> Result<()> {
    #[cfg(windows)]
    {
        use std::process::Command;
        let _ = Command::new("attrib").arg("+h").arg(path).status();
    }
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(true);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(unix)]
fn replace_file(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to)?;
    Ok(())
}

#[cfg(not(unix))]
fn replace_file(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        let mut permissions = fs::metadata(to)?.permissions();
        if permissions.readonly() {
            permissions.set_readonly(false);
            fs::set_permissions(to, permissions)?;
        }
    }
    fs::rename(from, to)?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let suffix = Uuid::new_v4();
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("tmp");
    let temp_name = format!(".{file_name}.{suffix}.tmp");
    path.with_file_name(temp_name)
}

fn create_parent_dir(path: &Path) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;
    Ok(())
}

/// Exclusive advisory lock over the vault's read-modify-write cycle.
///
/// The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct VaultLock {
    file: File,
    path: PathBuf,
}

impl VaultLock {
    /// Blocks until the exclusive lock at `path` is acquired.
    pub fn acquire(path: &Path) -> Result<Self> {
        create_parent_dir(path)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Attempts to take the lock without blocking.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        create_parent_dir(path)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(error) if error.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for VaultLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
