use std::{collections::HashSet, fs};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, VaultError},
    fs_secure::write_file_atomic,
    identity::{escapes_root, is_path_hash, normalize, path_hash, storage_name},
    paths::VaultPaths,
    secret::BackendKind,
};

/// Current config schema version.
pub const SCHEMA_VERSION: u32 = 1;
/// Archives above this size (MB) are tiered to Git LFS by default.
pub const DEFAULT_LARGE_OBJECT_THRESHOLD_MB: u64 = 5;
/// Default 1Password vault for external secret records.
pub const DEFAULT_EXTERNAL_VAULT_NAME: &str = "Git-Vault";

/// Reference to a config file that points at a managed path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LinkedConfigFile {
    /// Repo-relative file path.
    pub file: String,
}

/// One vaulted path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ManagedPathEntry {
    /// Short hash of `path`.
    pub hash: String,
    /// Repo-relative POSIX path; directories end with `/`.
    pub path: String,
    /// Optional linked config references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_config_files: Vec<LinkedConfigFile>,
}

impl ManagedPathEntry {
    /// Builds an entry for a canonical relative path.
    pub fn new(path: &str, linked_config_files: Vec<LinkedConfigFile>) -> Self {
        let path = normalize(path);
        Self {
            hash: path_hash(&path),
            path,
            linked_config_files,
        }
    }

    /// Returns `true` for directory entries.
    pub fn is_directory(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Flattened storage name of the entry's archive.
    pub fn storage_name(&self) -> String {
        storage_name(&self.path)
    }

    /// Ignore rule that keeps the plaintext out of version control.
    pub fn ignore_rule(&self) -> String {
        format!("/{}", self.path)
    }
}

/// Repository-scoped vault configuration, including the manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Config schema version.
    pub schema_version: u32,
    /// Backend that stores new secret records.
    pub secret_backend: BackendKind,
    /// Archive size (MB) above which archives are tiered to Git LFS; 0 disables.
    pub large_object_threshold_mb: u64,
    /// External-manager vault name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_vault_name: Option<String>,
    /// Managed path manifest, in insertion order.
    #[serde(default)]
    pub managed_paths: Vec<ManagedPathEntry>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self::new(BackendKind::File, DEFAULT_LARGE_OBJECT_THRESHOLD_MB, None)
    }
}

impl VaultConfig {
    /// Constructs an empty config.
    pub fn new(
        secret_backend: BackendKind,
        large_object_threshold_mb: u64,
        external_vault_name: Option<String>,
    ) -> Self {
        let external_vault_name = match secret_backend {
            BackendKind::External => {
                Some(external_vault_name.unwrap_or_else(|| DEFAULT_EXTERNAL_VAULT_NAME.to_owned()))
            }
            BackendKind::File => external_vault_name,
        };
        Self {
            schema_version: SCHEMA_VERSION,
            secret_backend,
            large_object_threshold_mb,
            external_vault_name,
            managed_paths: Vec::new(),
        }
    }

    /// Effective external vault name.
    pub fn vault_name(&self) -> &str {
        self.external_vault_name
            .as_deref()
            .unwrap_or(DEFAULT_EXTERNAL_VAULT_NAME)
    }

    /// Finds an entry by hash.
    pub fn find(&self, hash: &str) -> Option<&ManagedPathEntry> {
        self.managed_paths.iter().find(|entry| entry.hash == hash)
    }

    /// Finds an entry by canonical path.
    pub fn find_path(&self, path: &str) -> Option<&ManagedPathEntry> {
        let normalized = normalize(path);
        self.managed_paths
            .iter()
            .find(|entry| entry.path == normalized)
    }

    /// Inserts a new entry, refusing duplicates and hash collisions.
    pub fn insert(&mut self, entry: ManagedPathEntry) -> Result<()> {
        if let Some(existing) = self.find(&entry.hash) {
            if existing.path == entry.path {
                return Err(VaultError::AlreadyManaged(entry.path));
            }
            return Err(VaultError::HashCollision {
                hash: entry.hash,
                existing: existing.path.clone(),
                requested: entry.path,
            });
        }
        self.managed_paths.push(entry);
        Ok(())
    }

    /// Removes an entry by hash.
    pub fn remove(&mut self, hash: &str) -> Result<ManagedPathEntry> {
        let index = self
            .managed_paths
            .iter()
            .position(|entry| entry.hash == hash)
            .ok_or_else(|| VaultError::NotManaged(hash.to_owned()))?;
        Ok(self.managed_paths.remove(index))
    }

    /// Checks document-level invariants.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(VaultError::InvalidInput(format!(
                "unsupported config schema_version {} (expected {SCHEMA_VERSION})",
                self.schema_version
            )));
        }
        if matches!(self.external_vault_name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(VaultError::InvalidInput(
                "external_vault_name cannot be empty".to_owned(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.managed_paths {
            if escapes_root(&entry.path) {
                return Err(VaultError::OutsideRepository(entry.path.clone()));
            }
            if !is_path_hash(&entry.hash) {
                return Err(VaultError::InvalidInput(format!(
                    "malformed hash `{}` for {}",
                    entry.hash, entry.path
                )));
            }
            if entry.hash != path_hash(&entry.path) {
                return Err(VaultError::InvalidInput(format!(
                    "hash {} does not match path {}",
                    entry.hash, entry.path
                )));
            }
            if !seen.insert(entry.hash.as_str()) {
                return Err(VaultError::InvalidInput(format!(
                    "duplicate manifest entry for hash {}",
                    entry.hash
                )));
            }
        }
        Ok(())
    }
}

/// Loads the vault config; `None` when the repository has not been initialized.
pub fn load(paths: &VaultPaths) -> Result<Option<VaultConfig>> {
    let path = paths.config_file();
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)?;
    let config = toml::from_str::<VaultConfig>(&raw)
        .map_err(|error| VaultError::InvalidInput(format!("invalid vault config: {error}")))?;
    config.validate()?;
    Ok(Some(config))
}

/// Persists the vault config with write-then-rename.
pub fn save(paths: &VaultPaths, config: &VaultConfig) -> Result<()> {
    config.validate()?;
    let encoded = toml::to_string_pretty(config).map_err(|error| {
        VaultError::InvalidInput(format!("failed to serialize vault config: {error}"))
    })?;
    write_file_atomic(&paths.config_file(), encoded.as_bytes())
}
