use std::{
    env,
    path::{Path, PathBuf},
};

use crate::{
    archive::GpgCipher,
    error::{explain_error_code, known_error_codes, normalize_error_code, Result, VaultError},
    git::{GitPlumbing, SystemGit},
    hooks::HookOutcome,
    lfs::TierOutcome,
    manifest::{self, DEFAULT_EXTERNAL_VAULT_NAME},
    paths::VaultPaths,
    secret::{ExternalBackend, FileBackend, SecretRouter, SystemOpExecutor},
    vault::{BulkReport, CheckReport, InitOptions, ListEntry, VaultManager},
};

use super::{
    output::{self, OutputStatus},
    secret_input, Cli, Command,
};

const GPG_BINARY_ENV_VAR: &str = "GIT_VAULT_GPG";
const OP_BINARY_ENV_VAR: &str = "GIT_VAULT_OP";

type SystemVault = VaultManager<GpgCipher, SystemGit>;

pub(crate) fn run(cli: Cli) -> Result<i32> {
    let Cli {
        workspace,
        password,
        write,
        quiet,
        error_format: _,
        command,
    } = cli;

    if let Command::Explain { code } = &command {
        return run_explain(code);
    }

    let cwd = env::current_dir()?;
    let root = resolve_root(workspace.as_deref(), &cwd)?;
    let paths = VaultPaths::new(&root);

    match command {
        Command::Init {
            backend,
            vault_name,
            lfs_threshold,
        } => {
            let manager = build_manager(&paths, vault_name.as_deref())?;
            let report = manager.init(&InitOptions {
                backend: backend.map(Into::into),
                vault_name,
                large_object_threshold_mb: lfs_threshold,
            })?;
            let verb = if report.created {
                "initialized"
            } else {
                "updated"
            };
            let line = format!(
                "{verb} .vault (backend: {}, lfs threshold: {})",
                report.backend,
                threshold_label(report.large_object_threshold_mb)
            );
            if let Some(code) = status_line(&line, quiet)? {
                return Ok(code);
            }
        }
        Command::Add {
            path,
            links,
            generate,
        } => {
            let manager = build_manager(&paths, None)?;
            let source = secret_input::resolve_passphrase_source(generate, password)?;
            let report = manager.add(&path, &cwd, source.as_ref(), &links)?;
            let mut line = format!(
                "added {} (hash {}, backend {})",
                report.entry.path, report.entry.hash, report.backend
            );
            if report.reused_record {
                line.push_str("; reused existing secret record");
            }
            if report.tier == TierOutcome::Registered {
                line.push_str("; archives tracked by git-lfs");
            }
            if let Some(code) = status_line(&line, quiet)? {
                return Ok(code);
            }
        }
        Command::Remove { path } => {
            let manager = build_manager(&paths, None)?;
            let source = secret_input::resolve_passphrase_source(false, password)?;
            let report = manager.remove(&path, &cwd, source.as_ref())?;
            let line = format!(
                "removed {} from the vault; plaintext left in place",
                report.entry.path
            );
            if let Some(code) = status_line(&line, quiet)? {
                return Ok(code);
            }
        }
        Command::List { json } => {
            let manager = build_manager(&paths, None)?;
            let entries = manager.list()?;
            if json {
                if let Some(code) = json_or_exit(&entries)? {
                    return Ok(code);
                }
            } else if entries.is_empty() {
                if let Some(code) = stdout_line_or_exit("no managed paths")? {
                    return Ok(code);
                }
            } else {
                for entry in &entries {
                    if let Some(code) = stdout_line_or_exit(&list_line(entry))? {
                        return Ok(code);
                    }
                }
            }
        }
        Command::Encrypt { path } => {
            let manager = build_manager(&paths, None)?;
            let report = manager.encrypt_all(path.as_deref(), &cwd)?;
            report_failures(&report)?;
            if let Some(code) = status_line(&bulk_summary("encrypt", &report), quiet)? {
                return Ok(code);
            }
            if !report.failures.is_empty() {
                return Ok(1);
            }
        }
        Command::Decrypt { path } => {
            let manager = build_manager(&paths, None)?;
            let report = manager.decrypt_all(path.as_deref(), &cwd, write)?;
            report_failures(&report)?;
            // Hooks run decrypt after checkout; failures are reported but never fatal.
            if let Some(code) = status_line(&bulk_summary("decrypt", &report), quiet)? {
                return Ok(code);
            }
        }
        Command::InstallHooks => {
            let manager = build_manager(&paths, None)?;
            for (kind, outcome) in manager.install_hooks()? {
                let line = format!("{}: {}", kind.file_name(), hook_outcome_label(&outcome));
                if let Some(code) = status_line(&line, quiet)? {
                    return Ok(code);
                }
            }
        }
        Command::Check { json } => {
            let manager = build_manager(&paths, None)?;
            let report = manager.check()?;
            if json {
                if let Some(code) = json_or_exit(&report)? {
                    return Ok(code);
                }
            } else {
                for line in check_lines(&report) {
                    if let Some(code) = stdout_line_or_exit(&line)? {
                        return Ok(code);
                    }
                }
            }
            if !report.is_clean() {
                return Ok(1);
            }
        }
        Command::Explain { .. } => {}
    }
    Ok(0)
}

fn run_explain(code: &str) -> Result<i32> {
    let Some(explanation) = explain_error_code(code) else {
        return Err(VaultError::InvalidInput(format!(
            "unknown error code `{}`; known codes: {}",
            normalize_error_code(code),
            known_error_codes().join(", ")
        )));
    };
    Ok(stdout_line_or_exit(explanation)?.unwrap_or(0))
}

fn resolve_root(workspace: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
    match workspace {
        Some(path) => {
            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                cwd.join(path)
            };
            absolute.canonicalize().map_err(|error| {
                VaultError::InvalidInput(format!(
                    "workspace {} is not accessible: {error}",
                    absolute.display()
                ))
            })
        }
        None => SystemGit::new().toplevel(cwd),
    }
}

fn build_manager(paths: &VaultPaths, vault_name: Option<&str>) -> Result<SystemVault> {
    let vault_name = match vault_name {
        Some(name) => name.to_owned(),
        None => manifest::load(paths)?
            .map(|config| config.vault_name().to_owned())
            .unwrap_or_else(|| DEFAULT_EXTERNAL_VAULT_NAME.to_owned()),
    };
    let op = env::var(OP_BINARY_ENV_VAR)
        .map(SystemOpExecutor::with_binary)
        .unwrap_or_default();
    let cipher = env::var(GPG_BINARY_ENV_VAR)
        .map(GpgCipher::with_binary)
        .unwrap_or_default();
    let router = SecretRouter::new(
        paths.clone(),
        FileBackend::new(paths.clone()),
        ExternalBackend::with_executor(paths.clone(), vault_name, Box::new(op)),
    );
    Ok(VaultManager::new(
        paths.clone(),
        router,
        cipher,
        SystemGit::new(),
    ))
}

fn threshold_label(threshold_mb: u64) -> String {
    if threshold_mb == 0 {
        "disabled".to_owned()
    } else {
        format!("{threshold_mb} MB")
    }
}

fn list_line(entry: &ListEntry) -> String {
    let backend = entry
        .backend
        .map(|kind| kind.to_string())
        .unwrap_or_else(|| "no-record".to_owned());
    let mut flags = Vec::new();
    if !entry.archive_present {
        flags.push("archive missing");
    }
    if !entry.plaintext_present {
        flags.push("plaintext missing");
    }
    let mut line = format!("{}  {}  [{backend}]", entry.hash, entry.path);
    if !flags.is_empty() {
        line.push_str(&format!(" ({})", flags.join(", ")));
    }
    if !entry.linked_config_files.is_empty() {
        line.push_str(&format!(" -> {}", entry.linked_config_files.join(", ")));
    }
    line
}

fn bulk_summary(operation: &str, report: &BulkReport) -> String {
    format!(
        "{operation}: {} processed, {} changed, {} skipped, {} failed",
        report.processed.len(),
        report.changed.len(),
        report.skipped.len(),
        report.failures.len()
    )
}

fn hook_outcome_label(outcome: &HookOutcome) -> String {
    match outcome {
        HookOutcome::Created => "installed".to_owned(),
        HookOutcome::Unchanged => "already installed".to_owned(),
        HookOutcome::Appended { backup } => {
            format!("appended (backup: {})", backup.display())
        }
        HookOutcome::Divergent { recorded_line } => {
            format!("left untouched; managed line differs: {recorded_line}")
        }
    }
}

fn check_lines(report: &CheckReport) -> Vec<String> {
    if report.is_clean() {
        return vec![format!(
            "ok: {} managed path(s), no issues",
            report.entries
        )];
    }
    report
        .issues
        .iter()
        .map(|issue| {
            let kind = serde_json::to_value(issue.kind)
                .ok()
                .and_then(|value| value.as_str().map(ToOwned::to_owned))
                .unwrap_or_default();
            format!("{kind}: {}", issue.detail)
        })
        .collect()
}

fn report_failures(report: &BulkReport) -> Result<()> {
    for failure in &report.failures {
        stderr_line_ignore_broken_pipe(&format!(
            "error[{}]: {}: {}",
            failure.code, failure.path, failure.message
        ))?;
    }
    Ok(())
}

fn status_line(line: &str, quiet: bool) -> Result<Option<i32>> {
    if quiet {
        return Ok(None);
    }
    stdout_line_or_exit(line)
}

fn stdout_line_or_exit(line: &str) -> Result<Option<i32>> {
    match output::stdout_line(line) {
        Ok(OutputStatus::Written) => Ok(None),
        Ok(OutputStatus::BrokenPipe) => Ok(Some(0)),
        Err(error) => Err(VaultError::Io(error)),
    }
}

fn json_or_exit<T: serde::Serialize>(value: &T) -> Result<Option<i32>> {
    match output::stdout_json(value) {
        Ok(OutputStatus::Written) => Ok(None),
        Ok(OutputStatus::BrokenPipe) => Ok(Some(0)),
        Err(error) => Err(VaultError::Io(error)),
    }
}

fn stderr_line_ignore_broken_pipe(line: &str) -> std::io::Result<()> {
    match output::stderr_line(line) {
        Ok(OutputStatus::Written | OutputStatus::BrokenPipe) => Ok(()),
        Err(error) => Err(error),
    }
}
