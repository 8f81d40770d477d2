//! Repository-relative path identity.
//!
//! Every managed path is keyed by a short SHA-256 prefix of its canonical,
//! `/`-separated, repo-relative form. Directories carry a trailing `/` so a
//! directory and a same-named file never share an identity.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use sha2::{Digest, Sha256};

use crate::{
    error::{Result, VaultError},
    paths::VAULT_DIR_NAME,
};

/// Length of the hex hash used as the manifest key.
pub const PATH_HASH_LENGTH: usize = 8;
/// Separator substituted for `/` in flattened storage names.
pub const STORAGE_NAME_SEPARATOR: char = '_';

/// Canonicalizes `raw` relative to `repo_root`.
///
/// Relative inputs are resolved against `cwd`. Symlinks are resolved on both
/// sides before comparison, so a root reached through a symlinked mount still
/// matches.
pub fn canonicalize(raw: &Path, repo_root: &Path, cwd: &Path) -> Result<String> {
    let candidate = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        cwd.join(raw)
    };
    let resolved = fs::canonicalize(&candidate).map_err(|error| {
        if error.kind() == std::io::ErrorKind::NotFound {
            VaultError::InvalidInput(format!("path does not exist: {}", raw.display()))
        } else {
            VaultError::Io(error)
        }
    })?;
    let root = fs::canonicalize(repo_root)?;

    let relative = resolved
        .strip_prefix(&root)
        .map_err(|_| VaultError::OutsideRepository(raw.display().to_string()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    VaultError::InvalidInput(format!(
                        "path is not valid UTF-8: {}",
                        raw.display()
                    ))
                })?;
                parts.push(part.to_owned());
            }
            _ => return Err(VaultError::OutsideRepository(raw.display().to_string())),
        }
    }

    let Some(first) = parts.first() else {
        return Err(VaultError::InvalidInput(
            "the repository root itself cannot be managed".to_owned(),
        ));
    };
    if first == VAULT_DIR_NAME || first == ".git" {
        return Err(VaultError::InvalidInput(format!(
            "`{first}` is reserved and cannot be managed"
        )));
    }

    let mut canonical = parts.join("/");
    if resolved.is_dir() {
        canonical.push('/');
    }
    Ok(canonical)
}

/// Normalizes a repo-relative path literal to `/`-separated form.
///
/// Backslashes become `/`, `.` segments and repeated separators are dropped,
/// and a trailing separator is preserved.
pub fn normalize(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let is_dir = unified.ends_with('/');
    let mut normalized = unified
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/");
    if is_dir && !normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// Short, stable hash of a canonical relative path.
pub fn path_hash(relative: &str) -> String {
    let digest = Sha256::digest(normalize(relative).as_bytes());
    let mut encoded = format!("{digest:x}");
    encoded.truncate(PATH_HASH_LENGTH);
    encoded
}

/// Returns `true` when `value` has the shape of a path hash.
pub fn is_path_hash(value: &str) -> bool {
    value.len() == PATH_HASH_LENGTH
        && value
            .chars()
            .all(|character| matches!(character, '0'..='9' | 'a'..='f'))
}

/// Flattens a managed path into a single file-name component.
pub fn storage_name(relative: &str) -> String {
    normalize(relative)
        .trim_end_matches('/')
        .replace('/', &STORAGE_NAME_SEPARATOR.to_string())
}

/// Joins a `/`-separated relative path onto `base` using native separators.
pub fn join_relative(base: &Path, relative: &str) -> PathBuf {
    let mut joined = base.to_path_buf();
    for part in normalize(relative).split('/').filter(|part| !part.is_empty()) {
        joined.push(part);
    }
    joined
}

/// Returns `true` when a normalized path literal escapes its root.
pub fn escapes_root(relative: &str) -> bool {
    let unified = relative.replace('\\', "/");
    let has_drive = unified.as_bytes().get(1) == Some(&b':');
    let normalized = normalize(relative);
    unified.starts_with('/')
        || has_drive
        || Path::new(relative).is_absolute()
        || normalized.is_empty()
        || normalized.split('/').any(|part| part == "..")
}
