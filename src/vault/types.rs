use serde::Serialize;

use crate::{
    error::{classify_error_code, Result, VaultError},
    lfs::TierOutcome,
    manifest::ManagedPathEntry,
    secret::BackendKind,
    types::Passphrase,
};

/// A new passphrase as entered, plus its confirmation.
pub struct PassphrasePair {
    /// First entry.
    pub entered: Passphrase,
    /// Confirmation entry.
    pub confirmed: Passphrase,
}

/// Supplies passphrases to vault operations.
pub trait PassphraseSource {
    /// Collects a new passphrase for `path` together with its confirmation.
    fn new_passphrase(&self, path: &str) -> Result<PassphrasePair>;
    /// Collects the passphrase protecting an already managed `path`.
    fn existing_passphrase(&self, path: &str) -> Result<Passphrase>;
}

/// Passphrase known up front, e.g. from `--password` or a test.
pub struct FixedPassphrase {
    passphrase: Passphrase,
    confirmation: Passphrase,
}

impl FixedPassphrase {
    /// Uses `passphrase` for both entry and confirmation.
    pub fn new(passphrase: Passphrase) -> Self {
        let confirmation = passphrase.clone();
        Self {
            passphrase,
            confirmation,
        }
    }

    /// Uses distinct entry and confirmation values.
    pub fn with_confirmation(passphrase: Passphrase, confirmation: Passphrase) -> Self {
        Self {
            passphrase,
            confirmation,
        }
    }
}

impl PassphraseSource for FixedPassphrase {
    fn new_passphrase(&self, _path: &str) -> Result<PassphrasePair> {
        Ok(PassphrasePair {
            entered: self.passphrase.clone(),
            confirmed: self.confirmation.clone(),
        })
    }

    fn existing_passphrase(&self, _path: &str) -> Result<Passphrase> {
        Ok(self.passphrase.clone())
    }
}

/// Random passphrase that is never shown; it lives only in the secret backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeneratedPassphrase;

impl PassphraseSource for GeneratedPassphrase {
    fn new_passphrase(&self, _path: &str) -> Result<PassphrasePair> {
        let entered = Passphrase::generate();
        let confirmed = entered.clone();
        Ok(PassphrasePair { entered, confirmed })
    }

    fn existing_passphrase(&self, path: &str) -> Result<Passphrase> {
        Err(VaultError::InvalidInput(format!(
            "a generated passphrase cannot verify existing path {path}"
        )))
    }
}

/// Settings applied by `init`; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Backend for new secret records.
    pub backend: Option<BackendKind>,
    /// External-manager vault name.
    pub vault_name: Option<String>,
    /// Large-object threshold in MB.
    pub large_object_threshold_mb: Option<u64>,
}

/// Result of `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// `true` when the config did not exist before.
    pub created: bool,
    /// Effective backend.
    pub backend: BackendKind,
    /// Effective threshold in MB.
    pub large_object_threshold_mb: u64,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

/// Result of a successful add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddReport {
    /// Newly managed entry.
    pub entry: ManagedPathEntry,
    /// Backend holding the record.
    pub backend: BackendKind,
    /// `true` when an orphaned record with the same passphrase was reused.
    pub reused_record: bool,
    /// Large-object tiering result.
    pub tier: TierOutcome,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

/// Result of a successful remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveReport {
    /// Entry no longer managed.
    pub entry: ManagedPathEntry,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

/// One failed entry in a bulk run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BulkFailure {
    /// Managed path.
    pub path: String,
    /// Stable error code.
    pub code: &'static str,
    /// Error message.
    pub message: String,
}

impl BulkFailure {
    pub(super) fn new(path: &str, error: &VaultError) -> Self {
        Self {
            path: path.to_owned(),
            code: classify_error_code(error),
            message: error.to_string(),
        }
    }
}

/// Per-entry results of encrypt-all or decrypt-all.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BulkReport {
    /// Entries handled successfully, changed or not.
    pub processed: Vec<String>,
    /// Entries whose archive or plaintext was written.
    pub changed: Vec<String>,
    /// Entries not attempted.
    pub skipped: Vec<String>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
    /// Entries that failed.
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    /// Number of entries that were attempted.
    pub fn attempted(&self) -> usize {
        self.processed.len() + self.failures.len()
    }

    pub(super) fn skip(&mut self, path: &str, reason: impl Into<String>) {
        self.skipped.push(path.to_owned());
        self.warnings.push(reason.into());
    }
}

/// One row of `list`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ListEntry {
    /// Short path hash.
    pub hash: String,
    /// Managed path.
    pub path: String,
    /// `file` or `directory`.
    pub kind: &'static str,
    /// Backend owning the record, if one exists.
    pub backend: Option<BackendKind>,
    /// Encrypted archive exists.
    pub archive_present: bool,
    /// Plaintext exists in the working tree.
    pub plaintext_present: bool,
    /// Linked config files.
    pub linked_config_files: Vec<String>,
}

/// Category of a consistency problem.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Secret record with no manifest entry.
    OrphanRecord,
    /// Manifest entry with no passphrase file or external marker.
    MissingRecord,
    /// Manifest entry with no encrypted archive.
    MissingArchive,
    /// Archive with no manifest entry.
    StrayArchive,
    /// Record lives in a backend other than the configured one.
    BackendMismatch,
    /// Managed path whose plaintext is not ignored by `.gitignore`.
    MissingIgnoreRule,
}

/// One consistency problem.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckIssue {
    /// Category.
    pub kind: IssueKind,
    /// Hash, when known.
    pub hash: Option<String>,
    /// Managed path or file involved.
    pub path: Option<String>,
    /// Human-readable description.
    pub detail: String,
}

/// Result of `check`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CheckReport {
    /// Number of manifest entries inspected.
    pub entries: usize,
    /// Problems found.
    pub issues: Vec<CheckIssue>,
}

impl CheckReport {
    /// Returns `true` when no problems were found.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}
