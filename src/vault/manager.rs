use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    archive::{
        archive_digest, archived_digest, compare_trees, decrypt_to_scratch, encrypt_path,
        ensure_archivable, install_file, qualified_names, replace_path, scratch_dir,
        unarchivable_entries, validate_round_trip, CipherTool,
    },
    error::{Result, VaultError},
    fs_secure::{ensure_private_dir, VaultLock},
    git::GitPlumbing,
    hooks::{install_all, HookKind, HookOutcome},
    identity::{canonicalize, escapes_root, normalize},
    ignore::{add_rule, ensure_local_state_rules, has_rule, remove_rule},
    lfs::{tier_if_oversized, TierOutcome},
    manifest::{self, LinkedConfigFile, ManagedPathEntry, VaultConfig},
    paths::{VaultPaths, ARCHIVE_SUFFIX},
    secret::{BackendKind, SecretRouter},
    types::{Passphrase, SecretMetadata},
};

use super::types::{
    AddReport, BulkFailure, BulkReport, CheckIssue, CheckReport, InitOptions, InitReport,
    IssueKind, ListEntry, PassphraseSource, RemoveReport,
};

const GITIGNORE_RELATIVE: &str = ".gitignore";
const GITATTRIBUTES_RELATIVE: &str = ".gitattributes";

enum EntryChange {
    Unchanged,
    Written,
}

/// Coordinator for every vault command.
pub struct VaultManager<C, G>
where
    C: CipherTool,
    G: GitPlumbing,
{
    paths: VaultPaths,
    router: SecretRouter,
    cipher: C,
    git: G,
}

impl<C, G> VaultManager<C, G>
where
    C: CipherTool,
    G: GitPlumbing,
{
    /// Constructs a vault manager.
    pub fn new(paths: VaultPaths, router: SecretRouter, cipher: C, git: G) -> Self {
        Self {
            paths,
            router,
            cipher,
            git,
        }
    }

    /// Repository layout.
    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    /// Creates or updates the vault config and local-state ignore rules.
    pub fn init(&self, options: &InitOptions) -> Result<InitReport> {
        let _lock = self.lock()?;
        let existing = manifest::load(&self.paths)?;
        let created = existing.is_none();
        let mut config = existing.unwrap_or_default();

        if let Some(backend) = options.backend {
            config.secret_backend = backend;
        }
        if let Some(threshold) = options.large_object_threshold_mb {
            config.large_object_threshold_mb = threshold;
        }
        if let Some(vault_name) = &options.vault_name {
            config.external_vault_name = Some(vault_name.clone());
        }
        if config.secret_backend == BackendKind::External && config.external_vault_name.is_none()
        {
            config.external_vault_name = Some(config.vault_name().to_owned());
        }

        fs::create_dir_all(self.paths.storage_dir())?;
        ensure_private_dir(&self.paths.secrets_dir())?;
        manifest::save(&self.paths, &config)?;
        ensure_local_state_rules(&self.paths.gitignore_file())?;

        let mut warnings = Vec::new();
        if let Err(error) = self.router.backend(config.secret_backend).ensure_ready() {
            warnings.push(format!(
                "{} backend is not ready: {error}",
                config.secret_backend
            ));
        }
        self.stage_or_warn(
            &[self.config_relative(), GITIGNORE_RELATIVE.to_owned()],
            &mut warnings,
        );
        for warning in &warnings {
            warn!("{warning}");
        }
        info!(created, backend = %config.secret_backend, "vault initialized");

        Ok(InitReport {
            created,
            backend: config.secret_backend,
            large_object_threshold_mb: config.large_object_threshold_mb,
            warnings,
        })
    }

    /// Places `raw` under encrypted management.
    pub fn add(
        &self,
        raw: &Path,
        cwd: &Path,
        source: &dyn PassphraseSource,
        links: &[String],
    ) -> Result<AddReport> {
        let _lock = self.lock()?;
        let config = manifest::load(&self.paths)?.unwrap_or_default();
        let relative = canonicalize(raw, self.paths.root(), cwd)?;
        ensure_archivable(self.paths.root(), &relative)?;
        let linked_config_files = normalize_links(links)?;
        let entry = ManagedPathEntry::new(&relative, linked_config_files);

        let mut updated = config.clone();
        updated.insert(entry.clone())?;
        let storage_name = entry.storage_name();
        if let Some(clash) = config
            .managed_paths
            .iter()
            .find(|existing| existing.storage_name() == storage_name)
        {
            return Err(VaultError::InvalidInput(format!(
                "storage name `{storage_name}` for `{}` is already used by `{}`",
                entry.path, clash.path
            )));
        }

        let pair = source.new_passphrase(&entry.path)?;
        if !pair.entered.matches(&pair.confirmed) {
            return Err(VaultError::PasswordMismatch);
        }
        let passphrase = pair.entered;

        let kind = config.secret_backend;
        let backend = self.router.backend(kind);
        backend.ensure_ready()?;

        let reused_record = self.resolve_orphan(&entry, kind, &passphrase)?;
        if !reused_record {
            backend.store(&entry.hash, &passphrase, &SecretMetadata::active(&entry.path))?;
            debug!(hash = %entry.hash, backend = %kind, "stored secret record");
        }

        let scratch = self.scratch()?;
        let validated = validate_round_trip(
            &self.cipher,
            self.paths.root(),
            &entry.path,
            &passphrase,
            scratch.path(),
        );
        let sealed = match validated {
            Ok(sealed) => sealed,
            Err(error) => {
                if !reused_record {
                    if let Err(discard_error) = backend.discard(&entry.hash) {
                        warn!(hash = %entry.hash, %discard_error, "failed to discard secret record");
                    }
                }
                return Err(error);
            }
        };
        let archive_file = self.paths.archive_file(&storage_name);
        install_file(&sealed, &archive_file)?;
        drop(scratch);

        let mut warnings = Vec::new();
        let tier = self.tier(&archive_file, updated.large_object_threshold_mb, &mut warnings)?;

        manifest::save(&self.paths, &updated)?;
        add_rule(&self.paths.gitignore_file(), &entry.ignore_rule())?;
        ensure_local_state_rules(&self.paths.gitignore_file())?;

        let mut staged = vec![
            self.config_relative(),
            self.paths.archive_relative(&storage_name),
            GITIGNORE_RELATIVE.to_owned(),
        ];
        if tier == TierOutcome::Registered {
            staged.push(GITATTRIBUTES_RELATIVE.to_owned());
        }
        self.stage_or_warn(&staged, &mut warnings);
        // Ignore rules do not apply to paths Git already tracks.
        let plaintext_relative = entry.path.trim_end_matches('/').to_owned();
        if let Err(error) = self
            .git
            .stage_removal(self.paths.root(), &[plaintext_relative])
        {
            warnings.push(format!(
                "failed to drop plaintext {} from the index: {error}",
                entry.path
            ));
        }
        for warning in &warnings {
            warn!("{warning}");
        }
        info!(path = %entry.path, hash = %entry.hash, "path added to vault");

        Ok(AddReport {
            entry,
            backend: kind,
            reused_record,
            tier,
            warnings,
        })
    }

    /// Stops managing `raw` after verifying `source`'s passphrase.
    ///
    /// The plaintext stays in the working tree.
    pub fn remove(
        &self,
        raw: &Path,
        cwd: &Path,
        source: &dyn PassphraseSource,
    ) -> Result<RemoveReport> {
        if !self.is_initialized() {
            return Err(VaultError::NotManaged(raw.display().to_string()));
        }
        let _lock = self.lock()?;
        let Some(mut config) = manifest::load(&self.paths)? else {
            return Err(VaultError::NotManaged(raw.display().to_string()));
        };
        let entry = self.resolve_managed(&config, raw, cwd)?.clone();

        let archive_file = self.paths.archive_file(&entry.storage_name());
        if !archive_file.exists() {
            return Err(VaultError::MissingArchive(entry.path.clone()));
        }

        let owner = self.router.owner_of(&entry.hash);
        if let Some(kind) = owner {
            self.router.backend(kind).ensure_ready()?;
        }

        let passphrase = source.existing_passphrase(&entry.path)?;
        self.verify_passphrase(&entry, &archive_file, &passphrase)?;

        config.remove(&entry.hash)?;
        manifest::save(&self.paths, &config)?;

        let mut warnings = Vec::new();
        match owner {
            Some(kind) => {
                if let Err(error) = self.router.backend(kind).mark_removed(&entry.hash) {
                    warnings.push(format!("failed to retire secret record {}: {error}", entry.hash));
                }
            }
            None => warnings.push(format!("no secret record found for hash {}", entry.hash)),
        }

        fs::remove_file(&archive_file)?;
        remove_rule(&self.paths.gitignore_file(), &entry.ignore_rule())?;

        self.stage_or_warn(
            &[self.config_relative(), GITIGNORE_RELATIVE.to_owned()],
            &mut warnings,
        );
        if let Err(error) = self.git.stage_removal(
            self.paths.root(),
            &[self.paths.archive_relative(&entry.storage_name())],
        ) {
            warnings.push(format!("failed to stage archive removal: {error}"));
        }
        for warning in &warnings {
            warn!("{warning}");
        }
        info!(path = %entry.path, "path removed from vault");

        Ok(RemoveReport { entry, warnings })
    }

    /// Re-encrypts managed plaintext that changed since it was archived.
    pub fn encrypt_all(&self, only: Option<&Path>, cwd: &Path) -> Result<BulkReport> {
        if !self.is_initialized() {
            debug!("vault is not initialized; nothing to encrypt");
            return Ok(BulkReport::default());
        }
        let _lock = self.lock()?;
        let Some(config) = manifest::load(&self.paths)? else {
            debug!("vault is not initialized; nothing to encrypt");
            return Ok(BulkReport::default());
        };
        let entries = self.select(&config, only, cwd)?;

        let mut report = BulkReport::default();
        let mut staged = Vec::new();
        let mut attributes_changed = false;
        for entry in entries {
            if !self.paths.resolve(&entry.path).exists() {
                report.skip(&entry.path, format!("plaintext for {} is missing", entry.path));
                continue;
            }
            match self.encrypt_entry(&entry) {
                Ok(EntryChange::Written) => {
                    let archive_file = self.paths.archive_file(&entry.storage_name());
                    // The archive is already rewritten, so stage it even if tiering fails.
                    staged.push(self.paths.archive_relative(&entry.storage_name()));
                    match self.tier(
                        &archive_file,
                        config.large_object_threshold_mb,
                        &mut report.warnings,
                    ) {
                        Ok(tier) => attributes_changed |= tier == TierOutcome::Registered,
                        Err(error) => {
                            record_failure(&mut report, &entry.path, error);
                            continue;
                        }
                    }
                    report.changed.push(entry.path.clone());
                    report.processed.push(entry.path.clone());
                    info!(path = %entry.path, "re-encrypted");
                }
                Ok(EntryChange::Unchanged) => report.processed.push(entry.path.clone()),
                Err(error) => record_failure(&mut report, &entry.path, error),
            }
        }

        if attributes_changed {
            staged.push(GITATTRIBUTES_RELATIVE.to_owned());
        }
        if !staged.is_empty() {
            self.stage_or_warn(&staged, &mut report.warnings);
        }
        for warning in &report.warnings {
            warn!("{warning}");
        }
        Ok(report)
    }

    /// Restores managed plaintext from archives.
    ///
    /// Differing plaintext is overwritten only when `overwrite` is set.
    pub fn decrypt_all(
        &self,
        only: Option<&Path>,
        cwd: &Path,
        overwrite: bool,
    ) -> Result<BulkReport> {
        if !self.is_initialized() {
            debug!("vault is not initialized; nothing to decrypt");
            return Ok(BulkReport::default());
        }
        let _lock = self.lock()?;
        let Some(config) = manifest::load(&self.paths)? else {
            debug!("vault is not initialized; nothing to decrypt");
            return Ok(BulkReport::default());
        };
        let entries = self.select(&config, only, cwd)?;

        let mut report = BulkReport::default();
        for entry in entries {
            match self.decrypt_entry(&entry, overwrite) {
                Ok(Some(EntryChange::Written)) => {
                    report.changed.push(entry.path.clone());
                    report.processed.push(entry.path.clone());
                    info!(path = %entry.path, "decrypted");
                }
                Ok(Some(EntryChange::Unchanged)) => report.processed.push(entry.path.clone()),
                Ok(None) => {
                    report.processed.push(entry.path.clone());
                    report.warnings.push(format!(
                        "{} differs from its archive; rerun with --write to overwrite",
                        entry.path
                    ));
                }
                Err(error) => record_failure(&mut report, &entry.path, error),
            }
        }
        for warning in &report.warnings {
            warn!("{warning}");
        }
        Ok(report)
    }

    /// Lists managed paths with their local state.
    pub fn list(&self) -> Result<Vec<ListEntry>> {
        let Some(config) = manifest::load(&self.paths)? else {
            return Ok(Vec::new());
        };
        Ok(config
            .managed_paths
            .iter()
            .map(|entry| ListEntry {
                hash: entry.hash.clone(),
                path: entry.path.clone(),
                kind: if entry.is_directory() {
                    "directory"
                } else {
                    "file"
                },
                backend: self.router.owner_of(&entry.hash),
                archive_present: self.paths.archive_file(&entry.storage_name()).exists(),
                plaintext_present: self.paths.resolve(&entry.path).exists(),
                linked_config_files: entry
                    .linked_config_files
                    .iter()
                    .map(|link| link.file.clone())
                    .collect(),
            })
            .collect())
    }

    /// Reports inconsistencies between the manifest, secret records, and archives.
    pub fn check(&self) -> Result<CheckReport> {
        let config = manifest::load(&self.paths)?.unwrap_or_default();
        let mut report = CheckReport {
            entries: config.managed_paths.len(),
            issues: Vec::new(),
        };

        for entry in &config.managed_paths {
            match self.router.owner_of(&entry.hash) {
                None => report.issues.push(CheckIssue {
                    kind: IssueKind::MissingRecord,
                    hash: Some(entry.hash.clone()),
                    path: Some(entry.path.clone()),
                    detail: format!(
                        "no passphrase file or external marker for {}",
                        entry.path
                    ),
                }),
                Some(kind) if kind != config.secret_backend => report.issues.push(CheckIssue {
                    kind: IssueKind::BackendMismatch,
                    hash: Some(entry.hash.clone()),
                    path: Some(entry.path.clone()),
                    detail: format!(
                        "record is held by the {kind} backend but the config selects {}",
                        config.secret_backend
                    ),
                }),
                Some(_) => {}
            }
            if !self.paths.archive_file(&entry.storage_name()).exists() {
                report.issues.push(CheckIssue {
                    kind: IssueKind::MissingArchive,
                    hash: Some(entry.hash.clone()),
                    path: Some(entry.path.clone()),
                    detail: format!("no encrypted archive for {}", entry.path),
                });
            }
            if !has_rule(&self.paths.gitignore_file(), &entry.ignore_rule())? {
                report.issues.push(CheckIssue {
                    kind: IssueKind::MissingIgnoreRule,
                    hash: Some(entry.hash.clone()),
                    path: Some(entry.path.clone()),
                    detail: format!(
                        "{} is missing from {GITIGNORE_RELATIVE}; the plaintext can be committed",
                        entry.ignore_rule()
                    ),
                });
            }
        }

        for hash in self.router.recorded_hashes()? {
            if config.find(&hash).is_none() {
                report.issues.push(CheckIssue {
                    kind: IssueKind::OrphanRecord,
                    hash: Some(hash.clone()),
                    path: None,
                    detail: format!("secret record {hash} has no manifest entry"),
                });
            }
        }

        for archive in list_archives(&self.paths.storage_dir())? {
            let known = config
                .managed_paths
                .iter()
                .any(|entry| entry.storage_name() == archive);
            if !known {
                report.issues.push(CheckIssue {
                    kind: IssueKind::StrayArchive,
                    hash: None,
                    path: Some(self.paths.archive_relative(&archive)),
                    detail: format!("archive {archive}{ARCHIVE_SUFFIX} has no manifest entry"),
                });
            }
        }
        Ok(report)
    }

    /// Installs the lifecycle hooks.
    pub fn install_hooks(&self) -> Result<Vec<(HookKind, HookOutcome)>> {
        let hooks_dir = self.git.hooks_dir(self.paths.root())?;
        install_all(&hooks_dir, self.paths.root())
    }

    fn is_initialized(&self) -> bool {
        self.paths.config_file().exists()
    }

    fn lock(&self) -> Result<VaultLock> {
        let lock_file = self.paths.lock_file();
        if let Some(lock) = VaultLock::try_acquire(&lock_file)? {
            return Ok(lock);
        }
        info!(lock = %lock_file.display(), "waiting for another git-vault process");
        VaultLock::acquire(&lock_file)
    }

    fn scratch(&self) -> Result<tempfile::TempDir> {
        ensure_private_dir(&self.paths.secrets_dir())?;
        scratch_dir(&self.paths.secrets_dir())
    }

    fn config_relative(&self) -> String {
        relative_to(self.paths.root(), &self.paths.config_file())
    }

    /// Returns `true` when an orphaned record was reused.
    fn resolve_orphan(
        &self,
        entry: &ManagedPathEntry,
        kind: BackendKind,
        passphrase: &Passphrase,
    ) -> Result<bool> {
        let Some(owner_kind) = self.router.owner_of(&entry.hash) else {
            return Ok(false);
        };
        let owner = self.router.backend(owner_kind);
        let reusable = owner_kind == kind
            && matches!(owner.retrieve(&entry.hash), Ok(existing) if existing.matches(passphrase));
        if reusable {
            info!(hash = %entry.hash, "reusing orphaned secret record");
            return Ok(true);
        }
        owner.mark_removed(&entry.hash)?;
        info!(hash = %entry.hash, backend = %owner_kind, "retired orphaned secret record");
        Ok(false)
    }

    fn verify_passphrase(
        &self,
        entry: &ManagedPathEntry,
        archive_file: &Path,
        passphrase: &Passphrase,
    ) -> Result<()> {
        let scratch = self.scratch()?;
        let opened = scratch.path().join("verify.tar.gz");
        match self.cipher.decrypt(archive_file, &opened, passphrase) {
            Ok(()) => Ok(()),
            Err(VaultError::EncryptionFailed { .. }) => {
                Err(VaultError::PasswordVerificationFailed(entry.path.clone()))
            }
            Err(error) => Err(error),
        }
    }

    fn encrypt_entry(&self, entry: &ManagedPathEntry) -> Result<EntryChange> {
        let passphrase = self.router.retrieve(&entry.hash)?;
        let archive_file = self.paths.archive_file(&entry.storage_name());
        let scratch = self.scratch()?;

        if archive_file.exists() {
            let current = archive_digest(self.paths.root(), &entry.path)?;
            let archived = archived_digest(&self.cipher, &archive_file, &passphrase, scratch.path())?;
            if current == archived {
                return Ok(EntryChange::Unchanged);
            }
        }
        encrypt_path(
            &self.cipher,
            self.paths.root(),
            &entry.path,
            &archive_file,
            &passphrase,
            scratch.path(),
        )?;
        Ok(EntryChange::Written)
    }

    /// `None` means the plaintext differs and was left alone.
    fn decrypt_entry(
        &self,
        entry: &ManagedPathEntry,
        overwrite: bool,
    ) -> Result<Option<EntryChange>> {
        let archive_file = self.paths.archive_file(&entry.storage_name());
        if !archive_file.exists() {
            return Err(VaultError::MissingArchive(entry.path.clone()));
        }
        let passphrase = self.router.retrieve(&entry.hash)?;
        let scratch = self.scratch()?;
        let extracted = decrypt_to_scratch(
            &self.cipher,
            &archive_file,
            &entry.path,
            &passphrase,
            scratch.path(),
        )?;

        let plaintext = self.paths.resolve(&entry.path);
        let present = match fs::symlink_metadata(&plaintext) {
            Ok(_) => true,
            Err(error) if error.kind() == io::ErrorKind::NotFound => false,
            Err(error) => return Err(error.into()),
        };
        if present {
            if let Some(difference) = compare_trees(&plaintext, &extracted)? {
                if !overwrite {
                    debug!(path = %entry.path, %difference, "plaintext differs from archive");
                    return Ok(None);
                }
                let unsupported = unarchivable_entries(&plaintext)?;
                if !unsupported.is_empty() {
                    return Err(VaultError::InvalidInput(format!(
                        "refusing to overwrite {}: it holds entries the archive cannot restore: {}",
                        entry.path,
                        qualified_names(&entry.path, &unsupported).join(", ")
                    )));
                }
                replace_path(&extracted, &plaintext)?;
                return Ok(Some(EntryChange::Written));
            }
            return Ok(Some(EntryChange::Unchanged));
        }
        replace_path(&extracted, &plaintext)?;
        Ok(Some(EntryChange::Written))
    }

    fn tier(
        &self,
        archive_file: &Path,
        threshold_mb: u64,
        warnings: &mut Vec<String>,
    ) -> Result<TierOutcome> {
        let outcome = tier_if_oversized(
            &self.git,
            self.paths.root(),
            &self.paths.gitattributes_file(),
            &self.paths.archive_glob(),
            archive_file,
            threshold_mb,
        )?;
        if outcome == TierOutcome::Unavailable {
            warnings.push(format!(
                "{} exceeds {threshold_mb} MB but git-lfs is unavailable",
                relative_to(self.paths.root(), archive_file)
            ));
        }
        Ok(outcome)
    }

    fn stage_or_warn(&self, paths: &[String], warnings: &mut Vec<String>) {
        if let Err(error) = self.git.stage(self.paths.root(), paths) {
            warnings.push(format!("failed to stage changes: {error}"));
        }
    }

    fn select(
        &self,
        config: &VaultConfig,
        only: Option<&Path>,
        cwd: &Path,
    ) -> Result<Vec<ManagedPathEntry>> {
        match only {
            Some(raw) => Ok(vec![self.resolve_managed(config, raw, cwd)?.clone()]),
            None => Ok(config.managed_paths.clone()),
        }
    }

    /// Finds the manifest entry for a user-supplied path, even when the
    /// plaintext no longer exists.
    fn resolve_managed<'a>(
        &self,
        config: &'a VaultConfig,
        raw: &Path,
        cwd: &Path,
    ) -> Result<&'a ManagedPathEntry> {
        let not_managed = || VaultError::NotManaged(raw.display().to_string());
        let relative = match canonicalize(raw, self.paths.root(), cwd) {
            Ok(relative) => relative,
            Err(VaultError::InvalidInput(_)) => {
                lexical_relative(raw, self.paths.root(), cwd).ok_or_else(not_managed)?
            }
            Err(error) => return Err(error),
        };
        let trimmed = relative.trim_end_matches('/');
        config
            .find_path(trimmed)
            .or_else(|| config.find_path(&format!("{trimmed}/")))
            .ok_or_else(not_managed)
    }
}

fn record_failure(report: &mut BulkReport, path: &str, error: VaultError) {
    match error {
        VaultError::BackendUnavailable(_) | VaultError::AuthRequired(_) => {
            report.skip(path, format!("skipped {path}: {error}"));
        }
        error => {
            warn!(path, %error, "vault entry failed");
            report.failures.push(BulkFailure::new(path, &error));
        }
    }
}

fn normalize_links(links: &[String]) -> Result<Vec<LinkedConfigFile>> {
    links
        .iter()
        .map(|link| {
            if escapes_root(link) {
                return Err(VaultError::OutsideRepository(link.clone()));
            }
            Ok(LinkedConfigFile {
                file: normalize(link),
            })
        })
        .collect()
}

fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Repo-relative form of a path that may not exist on disk.
fn lexical_relative(raw: &Path, root: &Path, cwd: &Path) -> Option<String> {
    let root = fs::canonicalize(root).ok()?;
    let base = fs::canonicalize(cwd).unwrap_or_else(|_| cwd.to_path_buf());
    let candidate = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        base.join(raw)
    };

    let mut resolved = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            other => resolved.push(other),
        }
    }
    let relative = resolved.strip_prefix(&root).ok()?;
    let joined = relative
        .components()
        .map(|component| component.as_os_str().to_str().map(str::to_owned))
        .collect::<Option<Vec<_>>>()?
        .join("/");
    if joined.is_empty() {
        return None;
    }
    Some(joined)
}

fn list_archives(storage_dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(storage_dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error.into()),
    };
    let mut names = Vec::new();
    for entry in entries {
        let name = entry?.file_name();
        if let Some(storage_name) = name
            .to_str()
            .and_then(|name| name.strip_suffix(ARCHIVE_SUFFIX))
        {
            names.push(storage_name.to_owned());
        }
    }
    names.sort();
    Ok(names)
}
