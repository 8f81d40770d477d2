use rand::{distributions::Alphanumeric, Rng};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{Result, VaultError};

const MIN_PASSPHRASE_LENGTH: usize = 1;
const GENERATED_PASSPHRASE_LENGTH: usize = 48;

/// Passphrase wrapper that avoids accidental logging.
pub struct Passphrase {
    inner: Secret<String>,
}

impl Passphrase {
    /// Wraps a passphrase, rejecting empty values and embedded newlines.
    pub fn new(mut value: String) -> Result<Self> {
        if value.chars().count() < MIN_PASSPHRASE_LENGTH {
            value.zeroize();
            return Err(VaultError::InvalidInput(
                "passphrase cannot be empty".to_owned(),
            ));
        }
        if value.contains('\n') || value.contains('\r') {
            value.zeroize();
            return Err(VaultError::InvalidInput(
                "passphrase cannot contain line breaks".to_owned(),
            ));
        }
        Ok(Self {
            inner: Secret::new(value),
        })
    }

    /// Generates a random alphanumeric passphrase.
    pub fn generate() -> Self {
        let value = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_PASSPHRASE_LENGTH)
            .map(char::from)
            .collect::<String>();
        Self {
            inner: Secret::new(value),
        }
    }

    /// Exposes the passphrase to a closure.
    pub fn expose<F, R>(&self, function: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        function(self.inner.expose_secret())
    }

    /// Compares two passphrases.
    pub fn matches(&self, other: &Passphrase) -> bool {
        self.inner.expose_secret() == other.inner.expose_secret()
    }
}

impl Clone for Passphrase {
    fn clone(&self) -> Self {
        Self {
            inner: Secret::new(self.inner.expose_secret().clone()),
        }
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passphrase([REDACTED])")
    }
}

/// Lifecycle state of one secret record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SecretStatus {
    /// Record backs a managed path.
    Active,
    /// Record was soft-deleted.
    Removed,
}

impl SecretStatus {
    /// Stable lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretStatus::Active => "active",
            SecretStatus::Removed => "removed",
        }
    }
}

/// Metadata stored alongside a passphrase where the backend supports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMetadata {
    /// Managed path the record belongs to.
    pub path: String,
    /// Record status.
    pub status: SecretStatus,
}

impl SecretMetadata {
    /// Metadata for a freshly created record.
    pub fn active(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            status: SecretStatus::Active,
        }
    }
}
