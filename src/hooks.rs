//! Git lifecycle hook installation.
//!
//! Each hook file is classified once per install call as absent, carrying
//! this tool's marker, or holding foreign content, and handled accordingly.
//! Reinstalling with an unchanged invocation line never rewrites the file.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    error::{Result, VaultError},
    fs_secure::{set_executable, write_file_atomic},
};

/// Marker line identifying hook content written by this tool.
pub const HOOK_MARKER: &str = "# git-vault managed hook";
/// Executable name invoked from hooks.
pub const HOOK_BINARY: &str = "git-vault";
const SHEBANG: &str = "#!/bin/sh";

/// Hooks managed by the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Re-encrypts changed plaintext before each commit.
    PreCommit,
    /// Decrypts archives after checkout.
    PostCheckout,
    /// Decrypts archives after merge.
    PostMerge,
}

/// Every managed hook, in install order.
pub const MANAGED_HOOKS: [HookKind; 3] = [
    HookKind::PreCommit,
    HookKind::PostCheckout,
    HookKind::PostMerge,
];

impl HookKind {
    /// Hook file name.
    pub fn file_name(&self) -> &'static str {
        match self {
            HookKind::PreCommit => "pre-commit",
            HookKind::PostCheckout => "post-checkout",
            HookKind::PostMerge => "post-merge",
        }
    }

    /// Vault command the hook runs.
    pub fn command(&self) -> &'static str {
        match self {
            HookKind::PreCommit => "encrypt",
            HookKind::PostCheckout | HookKind::PostMerge => "decrypt",
        }
    }

    /// Returns `true` when a failing command must abort the Git operation.
    pub fn blocks_on_failure(&self) -> bool {
        matches!(self, HookKind::PreCommit)
    }
}

/// Classification of an existing hook file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookState {
    /// No hook file, or an empty one.
    Absent,
    /// File carries the marker followed by `recorded_line`.
    Marked {
        /// Invocation line found after the marker.
        recorded_line: String,
    },
    /// File holds content not written by this tool.
    Foreign,
}

/// What an install call did to one hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// New hook file written.
    Created,
    /// Marker and invocation line already present.
    Unchanged,
    /// Foreign content backed up and the invocation appended.
    Appended {
        /// Copy of the original hook.
        backup: PathBuf,
    },
    /// Marker present with a different invocation line; file left untouched.
    Divergent {
        /// Invocation line found in the file.
        recorded_line: String,
    },
}

/// Classifies hook content.
pub fn classify(content: Option<&str>) -> HookState {
    let Some(content) = content.filter(|content| !content.trim().is_empty()) else {
        return HookState::Absent;
    };
    let mut lines = content.lines();
    while let Some(line) = lines.next() {
        if line.trim() == HOOK_MARKER {
            let recorded_line = lines
                .find(|candidate| !candidate.trim().is_empty())
                .unwrap_or_default()
                .trim()
                .to_owned();
            return HookState::Marked { recorded_line };
        }
    }
    HookState::Foreign
}

/// Shell expression locating the repository root from inside `hooks_dir`.
pub fn workspace_argument(hooks_dir: &Path, root: &Path) -> String {
    let hooks = fs::canonicalize(hooks_dir).unwrap_or_else(|_| hooks_dir.to_path_buf());
    let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    match hooks.strip_prefix(&root) {
        Ok(nested) => {
            let depth = nested.components().count();
            if depth == 0 {
                "$(dirname \"$0\")".to_owned()
            } else {
                format!("$(dirname \"$0\")/{}", vec![".."; depth].join("/"))
            }
        }
        Err(_) => root.display().to_string(),
    }
}

/// Invocation line for one hook.
pub fn invocation_line(kind: HookKind, workspace: &str) -> String {
    let line = format!(
        "{HOOK_BINARY} --workspace \"{workspace}\" --quiet {}",
        kind.command()
    );
    if kind.blocks_on_failure() {
        format!("{line} || exit 1")
    } else {
        line
    }
}

/// Installs `line` into the hook at `hook_path`.
pub fn install(hook_path: &Path, line: &str) -> Result<HookOutcome> {
    let existing = match fs::read_to_string(hook_path) {
        Ok(content) => Some(content),
        Err(error) if error.kind() == io::ErrorKind::NotFound => None,
        Err(error) => return Err(error.into()),
    };

    let outcome = match classify(existing.as_deref()) {
        HookState::Absent => {
            let content = format!("{SHEBANG}\n{HOOK_MARKER}\n{line}\n");
            write_file_atomic(hook_path, content.as_bytes())?;
            HookOutcome::Created
        }
        HookState::Marked { recorded_line } if recorded_line == line => HookOutcome::Unchanged,
        HookState::Marked { recorded_line } => {
            let name = hook_display_name(hook_path);
            warn!(hook = %name, "{}", VaultError::HookDivergent(name.clone()));
            return Ok(HookOutcome::Divergent { recorded_line });
        }
        HookState::Foreign => {
            let content = existing.unwrap_or_default();
            let backup = backup_path(hook_path);
            fs::copy(hook_path, &backup)?;

            let mut updated = content;
            if !updated.ends_with('\n') {
                updated.push('\n');
            }
            updated.push_str(&format!("\n{HOOK_MARKER}\n{line}\n"));
            write_file_atomic(hook_path, updated.as_bytes())?;
            HookOutcome::Appended { backup }
        }
    };
    set_executable(hook_path)?;
    Ok(outcome)
}

/// Installs every managed hook into `hooks_dir`.
pub fn install_all(hooks_dir: &Path, root: &Path) -> Result<Vec<(HookKind, HookOutcome)>> {
    fs::create_dir_all(hooks_dir)?;
    let workspace = workspace_argument(hooks_dir, root);

    let mut outcomes = Vec::with_capacity(MANAGED_HOOKS.len());
    for kind in MANAGED_HOOKS {
        let hook_path = hooks_dir.join(kind.file_name());
        let outcome = install(&hook_path, &invocation_line(kind, &workspace))?;
        match &outcome {
            HookOutcome::Created => info!(hook = kind.file_name(), "installed hook"),
            HookOutcome::Appended { backup } => info!(
                hook = kind.file_name(),
                backup = %backup.display(),
                "appended to existing hook"
            ),
            HookOutcome::Unchanged | HookOutcome::Divergent { .. } => {}
        }
        outcomes.push((kind, outcome));
    }
    Ok(outcomes)
}

fn backup_path(hook_path: &Path) -> PathBuf {
    let name = hook_display_name(hook_path);
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    hook_path.with_file_name(format!("{name}.backup-{stamp}"))
}

fn hook_display_name(hook_path: &Path) -> String {
    hook_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| hook_path.display().to_string())
}
