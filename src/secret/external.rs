use chrono::Utc;
use zeroize::Zeroize;

use crate::{
    error::{Result, VaultError},
    fs_secure::{ensure_private_dir, write_private_file_atomic},
    paths::{VaultPaths, EXTERNAL_MARKER_SUFFIX, PASSWORD_FILE_SUFFIX},
    process::{is_missing_binary, run_captured, CommandOutput},
    types::{Passphrase, SecretMetadata, SecretStatus},
};

use super::{
    file::{list_hashes_with_suffix, soft_delete},
    BackendKind, SecretBackend,
};

const ITEM_TITLE_PREFIX: &str = "git-vault";
const PASSWORD_FIELD: &str = "password";
const PATH_FIELD: &str = "path";
const STATUS_FIELD: &str = "status";

/// Executor abstraction for `op` commands.
pub trait OpExecutor: Send + Sync {
    /// Executes `op` with arguments and optional stdin bytes.
    fn exec(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<CommandOutput>;
}

/// Real executor that calls the system `op` binary.
pub struct SystemOpExecutor {
    binary: String,
}

impl SystemOpExecutor {
    /// Creates a system executor using the `op` binary.
    pub fn new() -> Self {
        Self {
            binary: "op".to_owned(),
        }
    }

    /// Creates a system executor with a custom binary path.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for SystemOpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl OpExecutor for SystemOpExecutor {
    fn exec(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<CommandOutput> {
        run_captured(&self.binary, args, None, stdin)
    }
}

/// Stores passphrases as 1Password items keyed by project and hash.
pub struct ExternalBackend {
    paths: VaultPaths,
    vault_name: String,
    project: String,
    executor: Box<dyn OpExecutor>,
}

impl ExternalBackend {
    /// Creates a backend with the default system executor.
    pub fn new(paths: VaultPaths, vault_name: impl Into<String>) -> Self {
        Self::with_executor(paths, vault_name, Box::new(SystemOpExecutor::new()))
    }

    /// Creates a backend with a custom executor, useful for tests.
    pub fn with_executor(
        paths: VaultPaths,
        vault_name: impl Into<String>,
        executor: Box<dyn OpExecutor>,
    ) -> Self {
        let project = paths.project_name();
        Self {
            paths,
            vault_name: vault_name.into(),
            project,
            executor,
        }
    }

    /// Composite item title for one hash.
    pub fn item_title(&self, hash: &str) -> String {
        format!("{ITEM_TITLE_PREFIX}-{}-{hash}", self.project)
    }

    /// Hashes with a local marker.
    pub fn recorded_hashes(&self) -> Result<Vec<String>> {
        list_hashes_with_suffix(
            &self.paths.secrets_dir(),
            &format!("{PASSWORD_FILE_SUFFIX}{EXTERNAL_MARKER_SUFFIX}"),
        )
    }

    fn exec(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<CommandOutput> {
        self.executor.exec(args, stdin).map_err(|error| {
            if is_missing_binary(&error) {
                VaultError::BackendUnavailable("1Password CLI `op` is not installed".to_owned())
            } else {
                error
            }
        })
    }

    fn classify_failure(&self, hash: &str, output: &CommandOutput) -> VaultError {
        let diagnostic = output.diagnostic();
        let lowered = diagnostic.to_ascii_lowercase();
        if lowered.contains("isn't an item") || lowered.contains("not found") {
            return VaultError::MissingSecretRecord(hash.to_owned());
        }
        if lowered.contains("not signed in")
            || lowered.contains("sign in")
            || lowered.contains("session expired")
        {
            return VaultError::AuthRequired(diagnostic);
        }
        VaultError::BackendUnavailable(format!("op failed for hash {hash}: {diagnostic}"))
    }
}

impl SecretBackend for ExternalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::External
    }

    fn ensure_ready(&self) -> Result<()> {
        let version = self.exec(&["--version"], None)?;
        if !version.success() {
            return Err(VaultError::BackendUnavailable(format!(
                "`op --version` failed: {}",
                version.diagnostic()
            )));
        }
        let whoami = self.exec(&["whoami"], None)?;
        if !whoami.success() {
            return Err(VaultError::AuthRequired(
                "run `op signin` and retry".to_owned(),
            ));
        }
        Ok(())
    }

    fn has_record(&self, hash: &str) -> bool {
        self.paths.external_marker_file(hash).exists()
    }

    fn store(&self, hash: &str, passphrase: &Passphrase, metadata: &SecretMetadata) -> Result<()> {
        let marker = self.paths.external_marker_file(hash);
        if marker.exists() {
            return Err(VaultError::InvalidInput(format!(
                "secret record already exists for hash {hash}"
            )));
        }
        self.ensure_ready()?;

        let title = self.item_title(hash);
        let mut template = passphrase.expose(|value| {
            serde_json::json!({
                "title": title,
                "category": "PASSWORD",
                "fields": [
                    {
                        "id": PASSWORD_FIELD,
                        "label": PASSWORD_FIELD,
                        "type": "CONCEALED",
                        "purpose": "PASSWORD",
                        "value": value,
                    },
                    {
                        "id": PATH_FIELD,
                        "label": PATH_FIELD,
                        "type": "STRING",
                        "value": metadata.path,
                    },
                    {
                        "id": STATUS_FIELD,
                        "label": STATUS_FIELD,
                        "type": "STRING",
                        "value": metadata.status.as_str(),
                    },
                ],
            })
            .to_string()
        });
        let result = self.exec(
            &["item", "create", "--vault", &self.vault_name, "--format", "json", "-"],
            Some(template.as_bytes()),
        );
        template.zeroize();
        let output = result?;
        if !output.success() {
            return Err(self.classify_failure(hash, &output));
        }

        ensure_private_dir(&self.paths.secrets_dir())?;
        write_private_file_atomic(&marker, b"")
    }

    fn retrieve(&self, hash: &str) -> Result<Passphrase> {
        if !self.has_record(hash) {
            return Err(VaultError::MissingSecretRecord(hash.to_owned()));
        }
        self.ensure_ready()?;

        let title = self.item_title(hash);
        let field = format!("label={PASSWORD_FIELD}");
        let mut output = self.exec(
            &[
                "item",
                "get",
                &title,
                "--vault",
                &self.vault_name,
                "--fields",
                &field,
                "--reveal",
            ],
            None,
        )?;
        if !output.success() {
            return Err(self.classify_failure(hash, &output));
        }
        let value = output.stdout.trim_end_matches(['\n', '\r']).to_owned();
        output.stdout.zeroize();
        Passphrase::new(value)
    }

    fn mark_removed(&self, hash: &str) -> Result<()> {
        let marker = self.paths.external_marker_file(hash);
        if !marker.exists() {
            return Err(VaultError::MissingSecretRecord(hash.to_owned()));
        }
        self.ensure_ready()?;

        let title = self.item_title(hash);
        let retired_title = format!(
            "{title}-{}-{}",
            SecretStatus::Removed.as_str(),
            Utc::now().format("%Y%m%dT%H%M%SZ")
        );
        let status_assignment = format!("{STATUS_FIELD}[text]={}", SecretStatus::Removed.as_str());
        let output = self.exec(
            &[
                "item",
                "edit",
                &title,
                "--vault",
                &self.vault_name,
                "--title",
                &retired_title,
                &status_assignment,
            ],
            None,
        )?;
        if !output.success() {
            return Err(self.classify_failure(hash, &output));
        }
        soft_delete(&marker)
    }

    fn discard(&self, hash: &str) -> Result<()> {
        if !self.has_record(hash) {
            return Ok(());
        }
        self.mark_removed(hash)
    }
}
