#![deny(missing_docs)]
//! git-vault keeps selected paths of a Git repository encrypted at rest.
//!
//! Plaintext stays in the working tree and is ignored by Git; a
//! passphrase-encrypted archive of each managed path is committed instead.

/// Archive packaging and the cipher pipeline.
pub mod archive;
/// Command-line interface.
pub mod cli;
/// Error types and stable error codes.
pub mod error;
/// Secure filesystem helpers.
pub mod fs_secure;
/// Git plumbing.
pub mod git;
/// Lifecycle hook installation.
pub mod hooks;
/// Path canonicalization and hashing.
pub mod identity;
/// `.gitignore` rule maintenance.
pub mod ignore;
/// Git LFS tiering for large archives.
pub mod lfs;
/// Vault config and managed-path manifest.
pub mod manifest;
/// Repository-relative layout of `.vault/`.
pub mod paths;
/// External process helpers.
pub mod process;
/// Passphrase storage backends.
pub mod secret;
/// Shared types.
pub mod types;
/// Vault orchestration.
pub mod vault;
