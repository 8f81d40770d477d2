use std::{fs, path::Path};

use tracing::{info, warn};

use crate::{
    error::Result,
    fs_secure::write_file_atomic,
    git::GitPlumbing,
    ignore::read_or_empty,
};

/// Attribute set Git LFS writes for tracked patterns.
pub const LFS_ATTRIBUTES: &str = "filter=lfs diff=lfs merge=lfs -text";
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Result of a tiering attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierOutcome {
    /// Archive is at or below the threshold, or tiering is disabled.
    NotNeeded,
    /// Storage pattern was registered by this call.
    Registered,
    /// Storage pattern was already registered.
    AlreadyRegistered,
    /// LFS is not installed; the archive stays in regular Git storage.
    Unavailable,
}

/// Size of `path` in megabytes.
pub fn size_mb(path: &Path) -> Result<f64> {
    Ok(fs::metadata(path)?.len() as f64 / BYTES_PER_MB)
}

/// Returns `true` when an archive of `size_mb` exceeds `threshold_mb`.
///
/// A threshold of zero disables tiering.
pub fn should_tier(size_mb: f64, threshold_mb: u64) -> bool {
    threshold_mb > 0 && size_mb > threshold_mb as f64
}

/// `.gitattributes` line for one glob.
pub fn attributes_line(glob: &str) -> String {
    format!("{glob} {LFS_ATTRIBUTES}")
}

/// Registers `glob` with LFS once.
pub fn register_pattern(
    git: &dyn GitPlumbing,
    root: &Path,
    attributes_file: &Path,
    glob: &str,
) -> Result<TierOutcome> {
    if !git.lfs_available(root) {
        warn!("git-lfs is not installed; large archives stay in regular git storage");
        return Ok(TierOutcome::Unavailable);
    }

    let line = attributes_line(glob);
    let existing = read_or_empty(attributes_file)?;
    if existing.lines().any(|candidate| candidate.trim() == line) {
        return Ok(TierOutcome::AlreadyRegistered);
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&line);
    updated.push('\n');
    write_file_atomic(attributes_file, updated.as_bytes())?;

    if let Err(error) = git.lfs_track(root, glob) {
        warn!(%error, glob, "git lfs track failed after writing .gitattributes");
    }
    info!(glob, "registered storage pattern with git-lfs");
    Ok(TierOutcome::Registered)
}

/// Tiers the storage glob when `archive_file` exceeds `threshold_mb`.
pub fn tier_if_oversized(
    git: &dyn GitPlumbing,
    root: &Path,
    attributes_file: &Path,
    glob: &str,
    archive_file: &Path,
    threshold_mb: u64,
) -> Result<TierOutcome> {
    let size = size_mb(archive_file)?;
    if !should_tier(size, threshold_mb) {
        return Ok(TierOutcome::NotNeeded);
    }
    info!(
        archive = %archive_file.display(),
        size_mb = size,
        threshold_mb,
        "archive exceeds large-object threshold"
    );
    register_pattern(git, root, attributes_file, glob)
}
