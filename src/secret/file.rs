use std::{fs, io, path::Path};

use chrono::Utc;
use zeroize::Zeroize;

use crate::{
    error::{Result, VaultError},
    fs_secure::{ensure_private_dir, write_private_file_atomic},
    identity::is_path_hash,
    paths::{VaultPaths, PASSWORD_FILE_SUFFIX, REMOVED_SUFFIX},
    types::{Passphrase, SecretMetadata},
};

use super::{BackendKind, SecretBackend};

/// Stores each passphrase in `.vault/secrets/<hash>.pw` with owner-only access.
#[derive(Debug, Clone)]
pub struct FileBackend {
    paths: VaultPaths,
}

impl FileBackend {
    /// Creates a backend for one repository layout.
    pub fn new(paths: VaultPaths) -> Self {
        Self { paths }
    }

    /// Hashes with an active passphrase file.
    pub fn recorded_hashes(&self) -> Result<Vec<String>> {
        list_hashes_with_suffix(&self.paths.secrets_dir(), PASSWORD_FILE_SUFFIX)
    }
}

impl SecretBackend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    fn has_record(&self, hash: &str) -> bool {
        self.paths.password_file(hash).exists()
    }

    fn store(&self, hash: &str, passphrase: &Passphrase, _metadata: &SecretMetadata) -> Result<()> {
        let path = self.paths.password_file(hash);
        if path.exists() {
            return Err(VaultError::InvalidInput(format!(
                "secret record already exists for hash {hash}"
            )));
        }
        ensure_private_dir(&self.paths.secrets_dir())?;
        passphrase.expose(|value| write_private_file_atomic(&path, value.as_bytes()))
    }

    fn retrieve(&self, hash: &str) -> Result<Passphrase> {
        let path = self.paths.password_file(hash);
        let mut raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(VaultError::MissingSecretRecord(hash.to_owned()));
            }
            Err(error) => return Err(error.into()),
        };
        let trimmed = raw.trim_end_matches(['\n', '\r']).to_owned();
        raw.zeroize();
        Passphrase::new(trimmed)
    }

    fn mark_removed(&self, hash: &str) -> Result<()> {
        let path = self.paths.password_file(hash);
        if !path.exists() {
            return Err(VaultError::MissingSecretRecord(hash.to_owned()));
        }
        soft_delete(&path)
    }

    fn discard(&self, hash: &str) -> Result<()> {
        let path = self.paths.password_file(hash);
        match remove_private_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// Renames `path` with a `.removed` suffix, never overwriting an earlier one.
pub(crate) fn soft_delete(path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| VaultError::InvalidInput(format!("invalid path: {}", path.display())))?;
    let mut target = path.with_file_name(format!("{file_name}{REMOVED_SUFFIX}"));
    if target.exists() {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        target = path.with_file_name(format!("{file_name}{REMOVED_SUFFIX}.{stamp}"));
    }
    fs::rename(path, target)?;
    Ok(())
}

/// Lists `<hash><suffix>` files in `directory`.
pub(crate) fn list_hashes_with_suffix(directory: &Path, suffix: &str) -> Result<Vec<String>> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error.into()),
    };

    let mut hashes = Vec::new();
    for entry in entries {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(hash) = name.strip_suffix(suffix) {
            if is_path_hash(hash) {
                hashes.push(hash.to_owned());
            }
        }
    }
    hashes.sort();
    Ok(hashes)
}

fn remove_private_file(path: &Path) -> io::Result<()> {
    #[cfg(not(unix))]
    {
        if let Ok(metadata) = fs::metadata(path) {
            let mut permissions = metadata.permissions();
            permissions.set_readonly(false);
            fs::set_permissions(path, permissions)?;
        }
    }
    fs::remove_file(path)
}
