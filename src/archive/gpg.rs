use std::path::Path;

use zeroize::Zeroize;

use crate::{
    error::{Result, VaultError},
    process::run_captured,
    types::Passphrase,
};

const BASE_ARGS: [&str; 8] = [
    "--batch",
    "--yes",
    "--quiet",
    "--pinentry-mode",
    "loopback",
    "--no-symkey-cache",
    "--passphrase-fd",
    "0",
];
const CIPHER_ALGORITHM: &str = "AES256";

/// Symmetric cipher abstraction over one input and one output file.
pub trait CipherTool: Send + Sync {
    /// Encrypts `input` into `output` with `passphrase`.
    fn encrypt(&self, input: &Path, output: &Path, passphrase: &Passphrase) -> Result<()>;
    /// Decrypts `input` into `output` with `passphrase`.
    fn decrypt(&self, input: &Path, output: &Path, passphrase: &Passphrase) -> Result<()>;
}

/// System `gpg` symmetric cipher driver.
#[derive(Debug, Clone)]
pub struct GpgCipher {
    binary: String,
}

impl GpgCipher {
    /// Constructs a driver using the `gpg` binary.
    pub fn new() -> Self {
        Self {
            binary: "gpg".to_owned(),
        }
    }

    /// Constructs a driver with a custom binary.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(
        &self,
        mode: &[&str],
        input: &Path,
        output: &Path,
        passphrase: &Passphrase,
    ) -> Result<()> {
        let input_arg = path_arg(input)?;
        let output_arg = path_arg(output)?;
        let mut args = BASE_ARGS.to_vec();
        args.extend_from_slice(mode);
        args.extend_from_slice(&["--output", output_arg, input_arg]);

        let mut stdin = passphrase.expose(|value| {
            let mut bytes = Vec::with_capacity(value.len() + 1);
            bytes.extend_from_slice(value.as_bytes());
            bytes.push(b'\n');
            bytes
        });
        let result = run_captured(&self.binary, &args, None, Some(&stdin));
        stdin.zeroize();

        let outcome = result?;
        if outcome.success() {
            return Ok(());
        }
        Err(VaultError::EncryptionFailed {
            path: input.display().to_string(),
            detail: format!(
                "{} exited with status {}: {}",
                self.binary,
                outcome.status_code,
                outcome.diagnostic()
            ),
        })
    }
}

impl Default for GpgCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl CipherTool for GpgCipher {
    fn encrypt(&self, input: &Path, output: &Path, passphrase: &Passphrase) -> Result<()> {
        self.run(
            &["--symmetric", "--cipher-algo", CIPHER_ALGORITHM],
            input,
            output,
            passphrase,
        )
    }

    fn decrypt(&self, input: &Path, output: &Path, passphrase: &Passphrase) -> Result<()> {
        self.run(&["--decrypt"], input, output, passphrase)
    }
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        VaultError::InvalidInput(format!("path is not valid UTF-8: {}", path.display()))
    })
}
