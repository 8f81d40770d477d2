use std::path::{Path, PathBuf};

use crate::{
    error::{Result, VaultError},
    process::{run_captured, CommandOutput},
};

/// Git plumbing used by the vault.
pub trait GitPlumbing: Send + Sync {
    /// Top-level directory of the repository containing `cwd`.
    fn toplevel(&self, cwd: &Path) -> Result<PathBuf>;
    /// Stages additions and modifications of repo-relative `paths`.
    fn stage(&self, root: &Path, paths: &[String]) -> Result<()>;
    /// Drops repo-relative `paths` (recursively) from the index, keeping the
    /// working tree and ignoring untracked ones.
    fn stage_removal(&self, root: &Path, paths: &[String]) -> Result<()>;
    /// Directory Git reads hooks from.
    fn hooks_dir(&self, root: &Path) -> Result<PathBuf>;
    /// Returns `true` when the LFS extension is installed.
    fn lfs_available(&self, root: &Path) -> bool;
    /// Registers `pattern` with LFS.
    fn lfs_track(&self, root: &Path, pattern: &str) -> Result<()>;
}

/// System `git` command driver.
#[derive(Debug, Clone)]
pub struct SystemGit {
    binary: String,
}

impl SystemGit {
    /// Constructs a driver using the `git` binary.
    pub fn new() -> Self {
        Self {
            binary: "git".to_owned(),
        }
    }

    /// Constructs a driver with a custom binary.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn git(&self, root: &Path, args: &[&str]) -> Result<CommandOutput> {
        let root_arg = root.to_str().ok_or_else(|| {
            VaultError::InvalidInput(format!("path is not valid UTF-8: {}", root.display()))
        })?;
        let mut full_args = vec!["-C", root_arg];
        full_args.extend_from_slice(args);
        run_captured(&self.binary, &full_args, None, None)
    }

    fn git_checked(&self, root: &Path, args: &[&str]) -> Result<CommandOutput> {
        let output = self.git(root, args)?;
        if output.success() {
            return Ok(output);
        }
        Err(VaultError::InvalidInput(format!(
            "git {} failed: {}",
            args.join(" "),
            output.diagnostic()
        )))
    }
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new()
    }
}

impl GitPlumbing for SystemGit {
    fn toplevel(&self, cwd: &Path) -> Result<PathBuf> {
        let output = self.git(cwd, &["rev-parse", "--show-toplevel"])?;
        if !output.success() {
            return Err(VaultError::NotARepository(cwd.display().to_string()));
        }
        Ok(PathBuf::from(output.stdout.trim()))
    }

    fn stage(&self, root: &Path, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "-A", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.git_checked(root, &args).map(|_| ())
    }

    fn stage_removal(&self, root: &Path, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["rm", "--cached", "-r", "--ignore-unmatch", "--quiet", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.git_checked(root, &args).map(|_| ())
    }

    fn hooks_dir(&self, root: &Path) -> Result<PathBuf> {
        let configured = self.git(root, &["config", "--get", "core.hooksPath"])?;
        let configured_path = configured.stdout.trim();
        if configured.success() && !configured_path.is_empty() {
            return Ok(absolutize(root, configured_path));
        }
        let output = self.git_checked(root, &["rev-parse", "--git-path", "hooks"])?;
        Ok(absolutize(root, output.stdout.trim()))
    }

    fn lfs_available(&self, root: &Path) -> bool {
        matches!(self.git(root, &["lfs", "version"]), Ok(output) if output.success())
    }

    fn lfs_track(&self, root: &Path, pattern: &str) -> Result<()> {
        self.git_checked(root, &["lfs", "track", pattern]).map(|_| ())
    }
}

fn absolutize(root: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}
