//! Vault orchestration: add, remove, bulk encrypt/decrypt, and consistency checks.

mod manager;
mod types;

pub use manager::VaultManager;
pub use types::{
    AddReport, BulkFailure, BulkReport, CheckIssue, CheckReport, FixedPassphrase,
    GeneratedPassphrase, InitOptions, InitReport, IssueKind, ListEntry, PassphrasePair,
    PassphraseSource, RemoveReport,
};
