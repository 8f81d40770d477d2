use std::io;

use thiserror::Error;

/// Top-level application errors.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Path resolves outside the repository root.
    #[error("path is outside the repository: {0}")]
    OutsideRepository(String),
    /// Two distinct paths share one short hash.
    #[error("hash collision: `{requested}` hashes to {hash}, already used by `{existing}`")]
    HashCollision {
        /// Colliding hash.
        hash: String,
        /// Path already registered under the hash.
        existing: String,
        /// Path that was being added.
        requested: String,
    },
    /// Path is already in the manifest.
    #[error("path is already managed: {0}")]
    AlreadyManaged(String),
    /// Path is not in the manifest.
    #[error("path is not managed: {0}")]
    NotManaged(String),
    /// Passphrase confirmation did not match.
    #[error("passphrases do not match")]
    PasswordMismatch,
    /// Passphrase failed to decrypt the existing archive.
    #[error("passphrase verification failed for {0}")]
    PasswordVerificationFailed(String),
    /// Secret backend is not installed or unreachable.
    #[error("secret backend unavailable: {0}")]
    BackendUnavailable(String),
    /// Secret backend requires a signed-in session.
    #[error("secret backend requires authentication: {0}")]
    AuthRequired(String),
    /// No secret record exists for a hash.
    #[error("missing secret record for hash {0}")]
    MissingSecretRecord(String),
    /// Encrypted archive for a managed path is missing.
    #[error("missing encrypted archive for {0}")]
    MissingArchive(String),
    /// Cipher tool or archive build failed.
    #[error("encryption failed for {path}: {detail}")]
    EncryptionFailed {
        /// Path involved in the failure.
        path: String,
        /// Tool output or reason.
        detail: String,
    },
    /// Archive extraction failed.
    #[error("extraction failed for {path}: {detail}")]
    ExtractionFailed {
        /// Path involved in the failure.
        path: String,
        /// Tool output or reason.
        detail: String,
    },
    /// Hook contains this tool's marker with a different invocation line.
    #[error("hook `{0}` was edited by hand; leaving it untouched")]
    HookDivergent(String),
    /// Working directory is not inside a Git repository.
    #[error("not a git repository: {0}")]
    NotARepository(String),
    /// Input was syntactically valid but semantically unsupported.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// JSON serialization error.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// UTF-8 conversion error.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A typed result used across the crate.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Generic invalid-input error.
pub const ERROR_CODE_INVALID_INPUT: &str = "E100";
/// Path escapes the repository root.
pub const ERROR_CODE_OUTSIDE_REPOSITORY: &str = "E101";
/// Path is already managed or collides with a managed path.
pub const ERROR_CODE_ALREADY_MANAGED: &str = "E102";
/// Path is not managed.
pub const ERROR_CODE_NOT_MANAGED: &str = "E103";
/// Missing repository or runtime dependency.
pub const ERROR_CODE_MISSING_RUNTIME: &str = "E104";
/// Passphrase confirmation mismatch.
pub const ERROR_CODE_PASSWORD_MISMATCH: &str = "E200";
/// Passphrase failed verification.
pub const ERROR_CODE_PASSWORD_VERIFICATION: &str = "E201";
/// Secret backend unavailable or unauthenticated.
pub const ERROR_CODE_BACKEND: &str = "E300";
/// Secret record missing.
pub const ERROR_CODE_MISSING_SECRET: &str = "E301";
/// Encrypted archive missing.
pub const ERROR_CODE_MISSING_ARCHIVE: &str = "E400";
/// Encrypt, decrypt or extract step failed.
pub const ERROR_CODE_PIPELINE: &str = "E401";
/// Hook diverged from the recorded invocation line.
pub const ERROR_CODE_HOOK_DIVERGENT: &str = "E500";
/// Filesystem or stream I/O failed.
pub const ERROR_CODE_IO: &str = "E900";
/// Internal serialization/encoding failure.
pub const ERROR_CODE_INTERNAL: &str = "E999";

const ERROR_EXPLANATION_E100: &str = r#"E100 invalid input

The command arguments or the vault config are not usable as given.

Common fixes:
  - Run `git-vault help <command>` for exact argument usage.
  - Check `.vault/config.toml` for typos or an unsupported schema_version."#;
const ERROR_EXPLANATION_E101: &str = r#"E101 path outside repository

Managed paths must resolve (after following symlinks) inside the repository
root selected with `--workspace` or the current directory.

Recovery:
  - Move the file into the repository, or
  - Run the command from the repository that owns the path."#;
const ERROR_EXPLANATION_E102: &str = r#"E102 path already managed

The path (or another path with the same short hash or storage name) is
already in the manifest.

Recovery:
  git-vault list
  git-vault remove <path>   # then add again"#;
const ERROR_EXPLANATION_E103: &str = r#"E103 path not managed

The path has no manifest entry. Paths are compared after canonicalization,
with a trailing `/` for directories.

Recovery:
  git-vault list"#;
const ERROR_EXPLANATION_E104: &str = r#"E104 missing repository or runtime dependency

The command needs a Git work tree and the `git` and `gpg` binaries in PATH.

Recovery:
  - Run inside a Git repository or pass `--workspace <dir>`.
  - Install the missing binary and retry."#;
const ERROR_EXPLANATION_E200: &str = r#"E200 passphrase mismatch

The confirmation did not match the first entry. Nothing was written.

Recovery:
  - Re-run `git-vault add <path>` and type the same passphrase twice."#;
const ERROR_EXPLANATION_E201: &str = r#"E201 passphrase verification failed

The passphrase could not decrypt the stored archive. Nothing was changed.

Recovery:
  - Retry with the passphrase used when the path was added."#;
const ERROR_EXPLANATION_E300: &str = r#"E300 secret backend unavailable

The configured secret manager is not installed, not reachable, or not
signed in.

Recovery:
  - For 1Password, install `op` and run `op signin`.
  - Run `git-vault check` to see which hashes are affected."#;
const ERROR_EXPLANATION_E301: &str = r#"E301 missing secret record

No passphrase file or external-manager marker exists for the hash.

Recovery:
  git-vault check
  - Restore `.vault/secrets/<hash>.pw` from a backup or a teammate."#;
const ERROR_EXPLANATION_E400: &str = r#"E400 missing encrypted archive

The managed path has no archive under `.vault/storage/`.

Recovery:
  - Pull the latest commit, or run `git-vault encrypt <path>`."#;
const ERROR_EXPLANATION_E401: &str = r#"E401 archive pipeline failure

Packing, encrypting, decrypting or extracting failed.

Recovery:
  - Verify `gpg --version` works in this shell.
  - Re-run with `GIT_VAULT_LOG=debug` for tool output."#;
const ERROR_EXPLANATION_E500: &str = r#"E500 hook diverged

A hook carries the git-vault marker but a different invocation line. It was
left untouched.

Recovery:
  - Edit the hook by hand, or delete it and run `git-vault install-hooks`."#;
const ERROR_EXPLANATION_E900: &str = r#"E900 I/O failure

Filesystem or stream operations failed.

Recovery:
  - Check permissions on `.vault/` and available disk space."#;
const ERROR_EXPLANATION_E999: &str = r#"E999 internal runtime failure

An internal serialization or decoding error occurred.

Recovery:
  - Retry once with the same inputs.
  - If it persists, collect the command and stderr for diagnosis."#;

const KNOWN_ERROR_CODES: [&str; 14] = [
    ERROR_CODE_INVALID_INPUT,
    ERROR_CODE_OUTSIDE_REPOSITORY,
    ERROR_CODE_ALREADY_MANAGED,
    ERROR_CODE_NOT_MANAGED,
    ERROR_CODE_MISSING_RUNTIME,
    ERROR_CODE_PASSWORD_MISMATCH,
    ERROR_CODE_PASSWORD_VERIFICATION,
    ERROR_CODE_BACKEND,
    ERROR_CODE_MISSING_SECRET,
    ERROR_CODE_MISSING_ARCHIVE,
    ERROR_CODE_PIPELINE,
    ERROR_CODE_HOOK_DIVERGENT,
    ERROR_CODE_IO,
    ERROR_CODE_INTERNAL,
];

/// Returns the stable error code for a runtime error.
pub fn classify_error_code(error: &VaultError) -> &'static str {
    match error {
        VaultError::InvalidInput(message) => classify_invalid_input_code(message),
        VaultError::OutsideRepository(_) => ERROR_CODE_OUTSIDE_REPOSITORY,
        VaultError::HashCollision { .. } | VaultError::AlreadyManaged(_) => {
            ERROR_CODE_ALREADY_MANAGED
        }
        VaultError::NotManaged(_) => ERROR_CODE_NOT_MANAGED,
        VaultError::NotARepository(_) => ERROR_CODE_MISSING_RUNTIME,
        VaultError::PasswordMismatch => ERROR_CODE_PASSWORD_MISMATCH,
        VaultError::PasswordVerificationFailed(_) => ERROR_CODE_PASSWORD_VERIFICATION,
        VaultError::BackendUnavailable(_) | VaultError::AuthRequired(_) => ERROR_CODE_BACKEND,
        VaultError::MissingSecretRecord(_) => ERROR_CODE_MISSING_SECRET,
        VaultError::MissingArchive(_) => ERROR_CODE_MISSING_ARCHIVE,
        VaultError::EncryptionFailed { detail, .. } | VaultError::ExtractionFailed { detail, .. } => {
            if detail.contains("required binary not found") {
                ERROR_CODE_MISSING_RUNTIME
            } else {
                ERROR_CODE_PIPELINE
            }
        }
        VaultError::HookDivergent(_) => ERROR_CODE_HOOK_DIVERGENT,
        VaultError::Io(_) => ERROR_CODE_IO,
        VaultError::Serde(_) | VaultError::Utf8(_) => ERROR_CODE_INTERNAL,
    }
}

fn classify_invalid_input_code(message: &str) -> &'static str {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("required binary not found") {
        return ERROR_CODE_MISSING_RUNTIME;
    }
    if lowered.contains("storage name") {
        return ERROR_CODE_ALREADY_MANAGED;
    }
    ERROR_CODE_INVALID_INPUT
}

/// Normalizes a user-provided error code for lookups.
pub fn normalize_error_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Returns an explanation block for a known error code.
pub fn explain_error_code(raw: &str) -> Option<&'static str> {
    let normalized = normalize_error_code(raw);
    match normalized.as_str() {
        ERROR_CODE_INVALID_INPUT => Some(ERROR_EXPLANATION_E100),
        ERROR_CODE_OUTSIDE_REPOSITORY => Some(ERROR_EXPLANATION_E101),
        ERROR_CODE_ALREADY_MANAGED => Some(ERROR_EXPLANATION_E102),
        ERROR_CODE_NOT_MANAGED => Some(ERROR_EXPLANATION_E103),
        ERROR_CODE_MISSING_RUNTIME => Some(ERROR_EXPLANATION_E104),
        ERROR_CODE_PASSWORD_MISMATCH => Some(ERROR_EXPLANATION_E200),
        ERROR_CODE_PASSWORD_VERIFICATION => Some(ERROR_EXPLANATION_E201),
        ERROR_CODE_BACKEND => Some(ERROR_EXPLANATION_E300),
        ERROR_CODE_MISSING_SECRET => Some(ERROR_EXPLANATION_E301),
        ERROR_CODE_MISSING_ARCHIVE => Some(ERROR_EXPLANATION_E400),
        ERROR_CODE_PIPELINE => Some(ERROR_EXPLANATION_E401),
        ERROR_CODE_HOOK_DIVERGENT => Some(ERROR_EXPLANATION_E500),
        ERROR_CODE_IO => Some(ERROR_EXPLANATION_E900),
        ERROR_CODE_INTERNAL => Some(ERROR_EXPLANATION_E999),
        _ => None,
    }
}

/// Stable list of explainable error codes.
pub fn known_error_codes() -> &'static [&'static str] {
    &KNOWN_ERROR_CODES
}
