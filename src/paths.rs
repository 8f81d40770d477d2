use std::path::{Path, PathBuf};

use crate::identity::join_relative;

/// Directory holding all vault state, relative to the repository root.
pub const VAULT_DIR_NAME: &str = ".vault";
/// Suffix of encrypted archive files.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz.gpg";
/// Suffix of local passphrase files.
pub const PASSWORD_FILE_SUFFIX: &str = ".pw";
/// Suffix appended to a passphrase file name for the external-manager marker.
pub const EXTERNAL_MARKER_SUFFIX: &str = ".1pass";
/// Suffix appended to soft-deleted secret artifacts.
pub const REMOVED_SUFFIX: &str = ".removed";

/// Canonical path layout for one repository's vault files.
#[derive(Debug, Clone)]
pub struct VaultPaths {
    root: PathBuf,
}

impl VaultPaths {
    /// Creates a path layout for the repository rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `.vault` directory.
    pub fn vault_dir(&self) -> PathBuf {
        self.root.join(VAULT_DIR_NAME)
    }

    /// Vault config document.
    pub fn config_file(&self) -> PathBuf {
        self.vault_dir().join("config.toml")
    }

    /// Advisory lock file.
    pub fn lock_file(&self) -> PathBuf {
        self.vault_dir().join(".lock")
    }

    /// Encrypted archive directory.
    pub fn storage_dir(&self) -> PathBuf {
        self.vault_dir().join("storage")
    }

    /// Local secret artifact directory (never committed).
    pub fn secrets_dir(&self) -> PathBuf {
        self.vault_dir().join("secrets")
    }

    /// Encrypted archive for one flattened storage name.
    pub fn archive_file(&self, storage_name: &str) -> PathBuf {
        self.storage_dir()
            .join(format!("{storage_name}{ARCHIVE_SUFFIX}"))
    }

    /// Repo-relative POSIX path of an archive, as Git sees it.
    pub fn archive_relative(&self, storage_name: &str) -> String {
        format!("{VAULT_DIR_NAME}/storage/{storage_name}{ARCHIVE_SUFFIX}")
    }

    /// Glob matching every archive in the storage directory.
    pub fn archive_glob(&self) -> String {
        format!("{VAULT_DIR_NAME}/storage/*{ARCHIVE_SUFFIX}")
    }

    /// Local passphrase file for one hash.
    pub fn password_file(&self, hash: &str) -> PathBuf {
        self.secrets_dir()
            .join(format!("{hash}{PASSWORD_FILE_SUFFIX}"))
    }

    /// Zero-byte marker recording that a hash lives in the external manager.
    pub fn external_marker_file(&self, hash: &str) -> PathBuf {
        self.secrets_dir().join(format!(
            "{hash}{PASSWORD_FILE_SUFFIX}{EXTERNAL_MARKER_SUFFIX}"
        ))
    }

    /// Repository `.gitignore`.
    pub fn gitignore_file(&self) -> PathBuf {
        self.root.join(".gitignore")
    }

    /// Repository `.gitattributes`.
    pub fn gitattributes_file(&self) -> PathBuf {
        self.root.join(".gitattributes")
    }

    /// Resolves a repo-relative POSIX path to an absolute path.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        join_relative(&self.root, relative)
    }

    /// Name of the project used to namespace external-manager items.
    pub fn project_name(&self) -> String {
        self.root
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("repository")
            .to_owned()
    }
}

#[cfg(test)]
mod unit_tests {
    use super::VaultPaths;

    #[test]
    fn resolve_drops_trailing_separator() {
        let paths = VaultPaths::new("/repo");
        assert_eq!(
            paths.resolve("secrets/dir/"),
            std::path::PathBuf::from("/repo/secrets/dir")
        );
    }

    #[test]
    fn marker_extends_password_file_name() {
        let paths = VaultPaths::new("/repo");
        let marker = paths.external_marker_file("0a1b2c3d");
        assert!(marker.ends_with(".vault/secrets/0a1b2c3d.pw.1pass"));
    }

    #[test]
    fn archive_glob_matches_archive_relative_layout() {
        let paths = VaultPaths::new("/repo");
        assert_eq!(paths.archive_glob(), ".vault/storage/*.tar.gz.gpg");
        assert_eq!(
            paths.archive_relative("secrets_key.txt"),
            ".vault/storage/secrets_key.txt.tar.gz.gpg"
        );
    }
}
