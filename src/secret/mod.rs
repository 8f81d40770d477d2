//! Passphrase storage backends.
//!
//! A record lives either in a local `0600` file or in an external secret
//! manager. The zero-byte marker next to the would-be passphrase file is the
//! only routing information: the manifest never records which backend owns a
//! hash.

/// 1Password (`op`) backend.
pub mod external;
/// Local passphrase file backend.
pub mod file;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, VaultError},
    paths::VaultPaths,
    types::{Passphrase, SecretMetadata},
};

pub use external::{ExternalBackend, OpExecutor, SystemOpExecutor};
pub use file::FileBackend;

/// Backend variant that owns a secret record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local passphrase file.
    #[default]
    File,
    /// External secret manager.
    External,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::File => f.write_str("file"),
            BackendKind::External => f.write_str("external"),
        }
    }
}

/// Shared capability set of every secret backend.
pub trait SecretBackend {
    /// Variant tag.
    fn kind(&self) -> BackendKind;
    /// Returns `Ok` when the backend can serve requests right now.
    fn ensure_ready(&self) -> Result<()>;
    /// Returns `true` when the backend can serve requests right now.
    fn is_available(&self) -> bool {
        self.ensure_ready().is_ok()
    }
    /// Returns `true` when a local trace of an active record exists.
    fn has_record(&self, hash: &str) -> bool;
    /// Stores a new record.
    fn store(&self, hash: &str, passphrase: &Passphrase, metadata: &SecretMetadata) -> Result<()>;
    /// Reads the passphrase for a hash.
    fn retrieve(&self, hash: &str) -> Result<Passphrase>;
    /// Soft-deletes a record.
    fn mark_removed(&self, hash: &str) -> Result<()>;
    /// Undoes a record created by an aborted add.
    fn discard(&self, hash: &str) -> Result<()>;
}

/// Routes per-hash requests to the backend that owns the record.
pub struct SecretRouter {
    paths: VaultPaths,
    file: FileBackend,
    external: ExternalBackend,
}

impl SecretRouter {
    /// Creates a router over both backends.
    pub fn new(paths: VaultPaths, file: FileBackend, external: ExternalBackend) -> Self {
        Self {
            paths,
            file,
            external,
        }
    }

    /// Backend for a variant tag.
    pub fn backend(&self, kind: BackendKind) -> &dyn SecretBackend {
        match kind {
            BackendKind::File => &self.file,
            BackendKind::External => &self.external,
        }
    }

    /// Variant that currently owns `hash`, if any.
    pub fn owner_of(&self, hash: &str) -> Option<BackendKind> {
        if self.paths.external_marker_file(hash).exists() {
            return Some(BackendKind::External);
        }
        if self.paths.password_file(hash).exists() {
            return Some(BackendKind::File);
        }
        None
    }

    /// Backend that owns `hash`, or `MissingSecretRecord`.
    pub fn backend_for(&self, hash: &str) -> Result<&dyn SecretBackend> {
        self.owner_of(hash)
            .map(|kind| self.backend(kind))
            .ok_or_else(|| VaultError::MissingSecretRecord(hash.to_owned()))
    }

    /// Reads the passphrase for `hash` from whichever backend owns it.
    pub fn retrieve(&self, hash: &str) -> Result<Passphrase> {
        self.backend_for(hash)?.retrieve(hash)
    }

    /// Hashes that have a local secret artifact (passphrase file or marker).
    pub fn recorded_hashes(&self) -> Result<Vec<String>> {
        let mut hashes = self.file.recorded_hashes()?;
        for hash in self.external.recorded_hashes()? {
            if !hashes.contains(&hash) {
                hashes.push(hash);
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}
