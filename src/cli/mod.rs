mod commands;
mod output;
mod secret_input;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::{
    error::{classify_error_code, Result, VaultError},
    secret::BackendKind,
};

/// Environment variable overriding `--workspace`.
pub const WORKSPACE_ENV_VAR: &str = "GIT_VAULT_WORKSPACE";
/// Environment variable overriding `--password`.
pub const PASSWORD_ENV_VAR: &str = "GIT_VAULT_PASSWORD";
/// Environment variable holding a tracing filter directive.
pub const LOG_ENV_VAR: &str = "GIT_VAULT_LOG";

const PATH_ARG_HELP: &str =
    "File or directory inside the repository (example: `secrets/key.txt`, `config/prod/`).";
const ERROR_CODE_ARG_HELP: &str = "Error code from CLI stderr (example: `E102`).";
const ERROR_FORMAT_ARG_HELP: &str = "Error output format (`text` or `json`).";
const CLI_AFTER_HELP: &str = r#"Examples:
  git-vault init
  git-vault add secrets/key.txt
  git-vault add config/prod/ --generate
  git-vault list --json
  git-vault encrypt
  git-vault decrypt --write
  git-vault install-hooks
  git-vault explain E102

More help:
  git-vault help <command>
"#;
const INIT_COMMAND_AFTER_HELP: &str = r#"Examples:
  git-vault init
  git-vault init --backend external --vault-name Git-Vault
  git-vault init --lfs-threshold 0

Notes:
  - Re-running `init` updates only the options you pass.
  - `--lfs-threshold 0` disables Git LFS tiering.
"#;
const ADD_COMMAND_AFTER_HELP: &str = r#"Examples:
  git-vault add secrets/key.txt
  git-vault add config/prod/ --link config/app.toml
  git-vault add certs/ --generate
  GIT_VAULT_PASSWORD=... git-vault add secrets/key.txt

Notes:
  - The plaintext is added to .gitignore; only the encrypted archive is staged.
  - `--generate` stores a random passphrase in the secret backend and never prints it.
"#;
const REMOVE_COMMAND_AFTER_HELP: &str = r#"Examples:
  git-vault remove secrets/key.txt

Notes:
  - The passphrase is verified against the archive before anything changes.
  - The plaintext stays in the working tree.
"#;
const ENCRYPT_COMMAND_AFTER_HELP: &str = r#"Examples:
  git-vault encrypt
  git-vault encrypt secrets/key.txt

Notes:
  - Only plaintext that changed since the last archive is re-encrypted.
  - Exits non-zero when any entry fails; the pre-commit hook relies on this.
"#;
const DECRYPT_COMMAND_AFTER_HELP: &str = r#"Examples:
  git-vault decrypt
  git-vault decrypt --write
  git-vault decrypt config/prod/

Notes:
  - Plaintext that differs from its archive is left alone unless `--write` is set.
"#;
const LIST_COMMAND_AFTER_HELP: &str = r#"Examples:
  git-vault list
  git-vault list --json
"#;
const CHECK_COMMAND_AFTER_HELP: &str = r#"Examples:
  git-vault check
  git-vault check --json

Reports:
  orphan secret records, missing passphrase files or markers, missing archives,
  archives without manifest entries, and records held by the wrong backend.
"#;
const INSTALL_HOOKS_COMMAND_AFTER_HELP: &str = r#"Examples:
  git-vault install-hooks

Notes:
  - Installs pre-commit (encrypt), post-checkout and post-merge (decrypt).
  - Existing hooks are backed up before the invocation is appended.
"#;
const EXPLAIN_COMMAND_AFTER_HELP: &str = r#"Examples:
  git-vault explain E102
  git-vault explain e201

Tip:
  Error codes are shown in stderr output, for example `error[E102]: ...`.
"#;

/// Top-level command line parser.
#[derive(Debug, Parser)]
#[command(
    name = "git-vault",
    version,
    about = "Keep selected files and directories encrypted at rest in a Git repository.",
    after_help = CLI_AFTER_HELP,
    infer_subcommands = true,
    arg_required_else_help = true,
    next_line_help = true
)]
pub struct Cli {
    /// Repository root override; defaults to the enclosing Git work tree.
    #[arg(long, global = true, env = WORKSPACE_ENV_VAR)]
    pub workspace: Option<PathBuf>,
    /// Passphrase for non-interactive use (prefer the environment variable).
    #[arg(long, global = true, env = PASSWORD_ENV_VAR, hide_env_values = true)]
    pub password: Option<String>,
    /// Overwrite plaintext that differs from its archive when decrypting.
    #[arg(long, global = true)]
    pub write: bool,
    /// Only log errors.
    #[arg(long, short, global = true)]
    pub quiet: bool,
    /// Error output format.
    #[arg(long, global = true, value_enum, default_value_t = ErrorFormatArg::Text, help = ERROR_FORMAT_ARG_HELP)]
    pub error_format: ErrorFormatArg,
    /// Subcommand.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Creates or updates the vault config.
    #[command(after_help = INIT_COMMAND_AFTER_HELP)]
    Init {
        /// Backend for new secret records.
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
        /// 1Password vault holding external records.
        #[arg(long)]
        vault_name: Option<String>,
        /// Archive size in MB above which archives are tiered to Git LFS (0 disables).
        #[arg(long)]
        lfs_threshold: Option<u64>,
    },
    /// Encrypts a path and starts managing it.
    #[command(after_help = ADD_COMMAND_AFTER_HELP)]
    Add {
        /// Path to protect.
        #[arg(help = PATH_ARG_HELP)]
        path: PathBuf,
        /// Config file that references the path (repeatable).
        #[arg(long = "link", value_name = "FILE")]
        links: Vec<String>,
        /// Generate a random passphrase instead of prompting.
        #[arg(long, conflicts_with = "password")]
        generate: bool,
    },
    /// Stops managing a path; the plaintext stays in place.
    #[command(visible_alias = "rm", after_help = REMOVE_COMMAND_AFTER_HELP)]
    Remove {
        /// Managed path.
        #[arg(help = PATH_ARG_HELP)]
        path: PathBuf,
    },
    /// Lists managed paths.
    #[command(visible_alias = "ls", after_help = LIST_COMMAND_AFTER_HELP)]
    List {
        /// Print structured JSON output.
        #[arg(long)]
        json: bool,
    },
    /// Re-encrypts changed plaintext.
    #[command(after_help = ENCRYPT_COMMAND_AFTER_HELP)]
    Encrypt {
        /// Limit to one managed path.
        #[arg(help = PATH_ARG_HELP)]
        path: Option<PathBuf>,
    },
    /// Restores plaintext from archives.
    #[command(after_help = DECRYPT_COMMAND_AFTER_HELP)]
    Decrypt {
        /// Limit to one managed path.
        #[arg(help = PATH_ARG_HELP)]
        path: Option<PathBuf>,
    },
    /// Installs pre-commit, post-checkout, and post-merge hooks.
    #[command(after_help = INSTALL_HOOKS_COMMAND_AFTER_HELP)]
    InstallHooks,
    /// Reports inconsistencies between manifest, secret records, and archives.
    #[command(after_help = CHECK_COMMAND_AFTER_HELP)]
    Check {
        /// Print structured JSON output.
        #[arg(long)]
        json: bool,
    },
    /// Explains a stable error code with recovery guidance.
    #[command(after_help = EXPLAIN_COMMAND_AFTER_HELP)]
    Explain {
        /// Error code from stderr (for example: `E102`).
        #[arg(help = ERROR_CODE_ARG_HELP)]
        code: String,
    },
}

/// Backend selection argument.
#[derive(Debug, Clone, Copy, ValueEnum, Eq, PartialEq)]
pub enum BackendArg {
    /// Local passphrase file.
    File,
    /// 1Password via the `op` CLI.
    External,
}

impl From<BackendArg> for BackendKind {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::File => BackendKind::File,
            BackendArg::External => BackendKind::External,
        }
    }
}

/// Error format argument.
#[derive(Debug, Clone, Copy, ValueEnum, Eq, PartialEq)]
pub enum ErrorFormatArg {
    /// Human-readable text diagnostics.
    Text,
    /// Machine-readable JSON diagnostics.
    Json,
}

/// Runs CLI and returns process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    commands::run(cli)
}

/// Renders an error for stderr.
pub fn render_error(error: &VaultError, format: ErrorFormatArg) -> String {
    let code = classify_error_code(error);
    match format {
        ErrorFormatArg::Text => format!("error[{code}]: {error}"),
        ErrorFormatArg::Json => serde_json::json!({
            "error": {
                "code": code,
                "message": error.to_string(),
                "explain": format!("git-vault explain {code}"),
            }
        })
        .to_string(),
    }
}
