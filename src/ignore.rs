use std::{fs, io, path::Path};

use crate::{error::Result, fs_secure::write_file_atomic, paths::VAULT_DIR_NAME};

/// Rules that keep local secret state out of version control.
pub fn local_state_rules() -> [String; 2] {
    [
        format!("/{VAULT_DIR_NAME}/secrets/"),
        format!("/{VAULT_DIR_NAME}/.lock"),
    ]
}

/// Appends `rule` unless an identical line exists. Returns `true` when written.
pub fn add_rule(file: &Path, rule: &str) -> Result<bool> {
    let existing = read_or_empty(file)?;
    if existing.lines().any(|line| line.trim() == rule) {
        return Ok(false);
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(rule);
    updated.push('\n');
    write_file_atomic(file, updated.as_bytes())?;
    Ok(true)
}

/// Removes every line equal to `rule`. Returns `true` when the file changed.
pub fn remove_rule(file: &Path, rule: &str) -> Result<bool> {
    let existing = read_or_empty(file)?;
    if !existing.lines().any(|line| line.trim() == rule) {
        return Ok(false);
    }
    let mut updated = existing
        .lines()
        .filter(|line| line.trim() != rule)
        .collect::<Vec<_>>()
        .join("\n");
    if !updated.is_empty() {
        updated.push('\n');
    }
    write_file_atomic(file, updated.as_bytes())?;
    Ok(true)
}

/// Adds the local-state rules. Returns `true` when any rule was written.
pub fn ensure_local_state_rules(file: &Path) -> Result<bool> {
    let mut changed = false;
    for rule in local_state_rules() {
        changed |= add_rule(file, &rule)?;
    }
    Ok(changed)
}

/// Returns `true` when `rule` is present.
pub fn has_rule(file: &Path, rule: &str) -> Result<bool> {
    Ok(read_or_empty(file)?
        .lines()
        .any(|line| line.trim() == rule))
}

pub(crate) fn read_or_empty(file: &Path) -> Result<String> {
    match fs::read_to_string(file) {
        Ok(content) => Ok(content),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(error) => Err(error.into()),
    }
}
