mod common;

use std::{fs, path::Path};

use common::{passphrase, FakeCipher, FakeGit, Fixture};
use git_vault::{
    error::VaultError,
    hooks::{HookOutcome, HOOK_MARKER},
    identity::path_hash,
    lfs::TierOutcome,
    manifest,
    secret::BackendKind,
    vault::{FixedPassphrase, GeneratedPassphrase, InitOptions, IssueKind},
};
use rand::RngCore;

const PASSWORD: &str = "correcthorse123";

fn fixed(value: &str) -> FixedPassphrase {
    FixedPassphrase::new(passphrase(value))
}

fn initialized() -> Fixture {
    let fixture = Fixture::new();
    fixture.manager().init(&InitOptions::default()).unwrap();
    fixture
}

fn add(fixture: &Fixture, relative: &str) {
    fixture
        .manager()
        .add(Path::new(relative), &fixture.root, &fixed(PASSWORD), &[])
        .unwrap();
}

fn write_random(fixture: &Fixture, relative: &str, bytes: usize) {
    let mut data = vec![0_u8; bytes];
    rand::thread_rng().fill_bytes(&mut data);
    let path = fixture.path(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, data).unwrap();
}

#[test]
fn init_creates_layout_and_local_ignore_rules() {
    let fixture = Fixture::new();
    let report = fixture.manager().init(&InitOptions::default()).unwrap();

    assert!(report.created);
    assert_eq!(report.backend, BackendKind::File);
    assert_eq!(report.large_object_threshold_mb, 5);
    assert!(report.warnings.is_empty());
    assert!(fixture.exists(".vault/config.toml"));
    assert!(fixture.path(".vault/storage").is_dir());
    assert!(fixture.path(".vault/secrets").is_dir());
    let gitignore = fixture.gitignore();
    assert!(gitignore.lines().any(|line| line == "/.vault/secrets/"));
    assert!(gitignore.lines().any(|line| line == "/.vault/.lock"));
    assert!(fixture
        .git
        .staged_paths()
        .contains(&".vault/config.toml".to_owned()));
}

#[test]
fn init_twice_keeps_settings_and_rules() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    manager
        .init(&InitOptions {
            large_object_threshold_mb: Some(0),
            ..InitOptions::default()
        })
        .unwrap();
    let second = manager.init(&InitOptions::default()).unwrap();

    assert!(!second.created);
    assert_eq!(second.large_object_threshold_mb, 0);
    let gitignore = fixture.gitignore();
    assert_eq!(
        gitignore
            .lines()
            .filter(|line| *line == "/.vault/secrets/")
            .count(),
        1
    );
}

#[test]
fn init_with_signed_out_external_backend_only_warns() {
    let fixture = Fixture::new();
    fixture.op.set_signed_in(false);
    let report = fixture
        .manager()
        .init(&InitOptions {
            backend: Some(BackendKind::External),
            ..InitOptions::default()
        })
        .unwrap();

    assert_eq!(report.backend, BackendKind::External);
    assert_eq!(report.warnings.len(), 1);
    let config = manifest::load(&fixture.paths()).unwrap().unwrap();
    assert_eq!(config.external_vault_name.as_deref(), Some("Git-Vault"));
}

#[test]
fn add_file_encrypts_ignores_and_stages() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "API_KEY=abc123\n");

    let report = fixture
        .manager()
        .add(
            Path::new("secrets/key.txt"),
            &fixture.root,
            &fixed(PASSWORD),
            &[],
        )
        .unwrap();

    let hash = path_hash("secrets/key.txt");
    assert_eq!(report.entry.path, "secrets/key.txt");
    assert_eq!(report.entry.hash, hash);
    assert_eq!(report.backend, BackendKind::File);
    assert!(!report.reused_record);
    assert_eq!(report.tier, TierOutcome::NotNeeded);
    assert_eq!(fixture.archives(), vec!["secrets_key.txt.tar.gz.gpg"]);
    assert_eq!(fixture.secret_files(), vec![format!("{hash}.pw")]);
    assert_eq!(fixture.read(&format!(".vault/secrets/{hash}.pw")), PASSWORD);
    assert!(fixture.gitignore().lines().any(|line| line == "/secrets/key.txt"));
    assert_eq!(fixture.read("secrets/key.txt"), "API_KEY=abc123\n");

    let staged = fixture.git.staged_paths();
    assert!(staged.contains(&".vault/storage/secrets_key.txt.tar.gz.gpg".to_owned()));
    assert!(staged.contains(&".gitignore".to_owned()));
    assert!(!staged.contains(&"secrets/key.txt".to_owned()));
    assert_eq!(fixture.git.removed_paths(), vec!["secrets/key.txt".to_owned()]);

    let archive = fs::read(fixture.path(".vault/storage/secrets_key.txt.tar.gz.gpg")).unwrap();
    assert!(!String::from_utf8_lossy(&archive).contains("API_KEY"));
}

#[test]
fn add_resolves_paths_relative_to_cwd() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");

    let report = fixture
        .manager()
        .add(
            Path::new("key.txt"),
            &fixture.path("secrets"),
            &fixed(PASSWORD),
            &[],
        )
        .unwrap();
    assert_eq!(report.entry.path, "secrets/key.txt");
}

#[test]
fn add_directory_round_trips_through_decrypt() {
    let fixture = initialized();
    fixture.write("config/prod/db.toml", "url = \"postgres://prod\"\n");
    fixture.write("config/prod/nested/api.toml", "token = \"t0k3n\"\n");

    let report = fixture
        .manager()
        .add(
            Path::new("config/prod"),
            &fixture.root,
            &fixed(PASSWORD),
            &[],
        )
        .unwrap();
    assert_eq!(report.entry.path, "config/prod/");
    assert_eq!(fixture.archives(), vec!["config_prod.tar.gz.gpg"]);
    assert!(fixture.gitignore().lines().any(|line| line == "/config/prod/"));
    assert_eq!(fixture.git.removed_paths(), vec!["config/prod".to_owned()]);

    fs::remove_dir_all(fixture.path("config/prod")).unwrap();
    let decrypted = fixture
        .manager()
        .decrypt_all(None, &fixture.root, false)
        .unwrap();

    assert_eq!(decrypted.changed, vec!["config/prod/".to_owned()]);
    assert!(decrypted.failures.is_empty());
    assert_eq!(
        fixture.read("config/prod/db.toml"),
        "url = \"postgres://prod\"\n"
    );
    assert_eq!(
        fixture.read("config/prod/nested/api.toml"),
        "token = \"t0k3n\"\n"
    );
}

#[cfg(unix)]
#[test]
fn add_refuses_directories_holding_symlinks() {
    use std::os::unix::fs::symlink;

    let fixture = initialized();
    fixture.write("config/prod/db.toml", "url = 1\n");
    symlink("db.toml", fixture.path("config/prod/current.toml")).unwrap();
    let config_before = fixture.read(".vault/config.toml");

    let error = fixture
        .manager()
        .add(
            Path::new("config/prod"),
            &fixture.root,
            &fixed(PASSWORD),
            &[],
        )
        .unwrap_err();

    assert!(
        matches!(&error, VaultError::InvalidInput(message) if message.contains("config/prod/current.toml"))
    );
    assert!(fixture.secret_files().is_empty());
    assert!(fixture.archives().is_empty());
    assert_eq!(fixture.read(".vault/config.toml"), config_before);
    assert!(!fixture.gitignore().contains("/config/prod/"));
}

#[cfg(unix)]
#[test]
fn decrypt_write_keeps_symlinks_created_after_add() {
    use std::os::unix::fs::symlink;

    let fixture = initialized();
    fixture.write("config/prod/db.toml", "url = 1\n");
    add(&fixture, "config/prod");
    symlink("db.toml", fixture.path("config/prod/current.toml")).unwrap();
    fixture.write("config/prod/db.toml", "url = 2\n");
    let manager = fixture.manager();

    let encrypted = manager.encrypt_all(None, &fixture.root).unwrap();
    assert_eq!(encrypted.failures.len(), 1);
    assert_eq!(encrypted.failures[0].code, "E100");

    let decrypted = manager.decrypt_all(None, &fixture.root, true).unwrap();
    assert!(decrypted.changed.is_empty());
    assert_eq!(decrypted.failures.len(), 1);
    assert!(decrypted.failures[0].message.contains("config/prod/current.toml"));
    assert!(fs::symlink_metadata(fixture.path("config/prod/current.toml"))
        .unwrap()
        .file_type()
        .is_symlink());
    assert_eq!(fixture.read("config/prod/db.toml"), "url = 2\n");
}

#[test]
fn passphrase_mismatch_writes_nothing() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    let config_before = fixture.read(".vault/config.toml");
    let gitignore_before = fixture.gitignore();

    let source = FixedPassphrase::with_confirmation(passphrase("first-entry"), passphrase("second"));
    let error = fixture
        .manager()
        .add(Path::new("secrets/key.txt"), &fixture.root, &source, &[])
        .unwrap_err();

    assert!(matches!(error, VaultError::PasswordMismatch));
    assert!(fixture.archives().is_empty());
    assert!(fixture.secret_files().is_empty());
    assert_eq!(fixture.read(".vault/config.toml"), config_before);
    assert_eq!(fixture.gitignore(), gitignore_before);
}

#[test]
fn failed_round_trip_discards_new_record() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");

    let error = fixture
        .manager_with(FakeCipher::corrupting())
        .add(
            Path::new("secrets/key.txt"),
            &fixture.root,
            &fixed(PASSWORD),
            &[],
        )
        .unwrap_err();

    assert!(matches!(error, VaultError::ExtractionFailed { .. }));
    assert!(fixture.secret_files().is_empty());
    assert!(fixture.archives().is_empty());
    assert!(fixture.manager().list().unwrap().is_empty());
    assert!(!fixture.gitignore().contains("/secrets/key.txt"));
}

#[test]
fn adding_a_managed_path_twice_is_rejected() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    add(&fixture, "secrets/key.txt");

    let error = fixture
        .manager()
        .add(
            Path::new("secrets/key.txt"),
            &fixture.root,
            &fixed("another-passphrase"),
            &[],
        )
        .unwrap_err();

    assert!(matches!(error, VaultError::AlreadyManaged(path) if path == "secrets/key.txt"));
    assert_eq!(fixture.archives().len(), 1);
    assert_eq!(fixture.secret_files().len(), 1);
}

#[test]
fn add_rejects_paths_outside_repository() {
    let fixture = initialized();
    let outside = fixture.root.parent().unwrap().join("outside.txt");
    fs::write(&outside, "secret").unwrap();

    let error = fixture
        .manager()
        .add(&outside, &fixture.root, &fixed(PASSWORD), &[])
        .unwrap_err();
    assert!(matches!(error, VaultError::OutsideRepository(_)));
    assert!(fixture.secret_files().is_empty());
}

#[test]
fn add_rejects_vault_internals() {
    let fixture = initialized();
    let error = fixture
        .manager()
        .add(
            Path::new(".vault/config.toml"),
            &fixture.root,
            &fixed(PASSWORD),
            &[],
        )
        .unwrap_err();
    assert!(matches!(error, VaultError::InvalidInput(_)));
}

#[test]
fn add_rejects_links_that_escape_the_repository() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    let error = fixture
        .manager()
        .add(
            Path::new("secrets/key.txt"),
            &fixture.root,
            &fixed(PASSWORD),
            &["../elsewhere.toml".to_owned()],
        )
        .unwrap_err();
    assert!(matches!(error, VaultError::OutsideRepository(_)));
    assert!(fixture.archives().is_empty());
}

#[test]
fn generated_passphrase_lands_in_the_backend() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    let report = fixture
        .manager()
        .add(
            Path::new("secrets/key.txt"),
            &fixture.root,
            &GeneratedPassphrase,
            &[],
        )
        .unwrap();

    let stored = fixture.read(&format!(".vault/secrets/{}.pw", report.entry.hash));
    assert_eq!(stored.len(), 48);
    assert!(stored.chars().all(|character| character.is_ascii_alphanumeric()));
}

#[test]
fn secrets_key_lifecycle() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    add(&fixture, "secrets/key.txt");
    let hash = path_hash("secrets/key.txt");
    let manager = fixture.manager();

    fixture.write("secrets/key.txt", "v2");
    let encrypted = manager.encrypt_all(None, &fixture.root).unwrap();
    assert_eq!(encrypted.changed, vec!["secrets/key.txt".to_owned()]);
    assert!(encrypted.failures.is_empty());

    let unchanged = manager.encrypt_all(None, &fixture.root).unwrap();
    assert!(unchanged.changed.is_empty());
    assert_eq!(unchanged.processed, vec!["secrets/key.txt".to_owned()]);

    fs::remove_file(fixture.path("secrets/key.txt")).unwrap();
    let decrypted = manager.decrypt_all(None, &fixture.root, false).unwrap();
    assert_eq!(decrypted.changed, vec!["secrets/key.txt".to_owned()]);
    assert_eq!(fixture.read("secrets/key.txt"), "v2");

    let removed = manager
        .remove(Path::new("secrets/key.txt"), &fixture.root, &fixed(PASSWORD))
        .unwrap();
    assert_eq!(removed.entry.path, "secrets/key.txt");
    assert!(fixture.archives().is_empty());
    assert_eq!(fixture.secret_files(), vec![format!("{hash}.pw.removed")]);
    assert!(!fixture.gitignore().lines().any(|line| line == "/secrets/key.txt"));
    assert_eq!(fixture.read("secrets/key.txt"), "v2");
    assert!(manager.list().unwrap().is_empty());
    assert!(fixture
        .git
        .removed_paths()
        .contains(&".vault/storage/secrets_key.txt.tar.gz.gpg".to_owned()));
}

#[test]
fn remove_with_wrong_passphrase_changes_nothing() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    add(&fixture, "secrets/key.txt");
    let config_before = fixture.read(".vault/config.toml");
    let gitignore_before = fixture.gitignore();
    let secrets_before = fixture.secret_files();

    let error = fixture
        .manager()
        .remove(
            Path::new("secrets/key.txt"),
            &fixture.root,
            &fixed("wrong-passphrase"),
        )
        .unwrap_err();

    assert!(matches!(error, VaultError::PasswordVerificationFailed(path) if path == "secrets/key.txt"));
    assert_eq!(fixture.read(".vault/config.toml"), config_before);
    assert_eq!(fixture.gitignore(), gitignore_before);
    assert_eq!(fixture.secret_files(), secrets_before);
    assert_eq!(fixture.archives(), vec!["secrets_key.txt.tar.gz.gpg"]);
}

#[test]
fn remove_unmanaged_path_is_not_managed() {
    let fixture = initialized();
    fixture.write("notes.txt", "hello");
    let config_before = fixture.read(".vault/config.toml");

    let error = fixture
        .manager()
        .remove(Path::new("notes.txt"), &fixture.root, &fixed(PASSWORD))
        .unwrap_err();

    assert!(matches!(error, VaultError::NotManaged(_)));
    assert_eq!(fixture.read(".vault/config.toml"), config_before);
}

#[test]
fn remove_in_uninitialized_repository_creates_nothing() {
    let fixture = Fixture::new();
    fixture.write("notes.txt", "hello");

    let error = fixture
        .manager()
        .remove(Path::new("notes.txt"), &fixture.root, &fixed(PASSWORD))
        .unwrap_err();

    assert!(matches!(error, VaultError::NotManaged(_)));
    assert!(!fixture.exists(".vault"));
}

#[test]
fn remove_works_after_plaintext_was_deleted() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    add(&fixture, "secrets/key.txt");
    fs::remove_file(fixture.path("secrets/key.txt")).unwrap();

    let report = fixture
        .manager()
        .remove(Path::new("secrets/key.txt"), &fixture.root, &fixed(PASSWORD))
        .unwrap();
    assert_eq!(report.entry.path, "secrets/key.txt");
    assert!(fixture.archives().is_empty());
}

#[test]
fn readding_after_remove_creates_a_fresh_record() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    add(&fixture, "secrets/key.txt");
    fixture
        .manager()
        .remove(Path::new("secrets/key.txt"), &fixture.root, &fixed(PASSWORD))
        .unwrap();

    let report = fixture
        .manager()
        .add(
            Path::new("secrets/key.txt"),
            &fixture.root,
            &fixed("rotated-passphrase"),
            &[],
        )
        .unwrap();

    let hash = report.entry.hash;
    assert!(!report.reused_record);
    assert_eq!(
        fixture.secret_files(),
        vec![format!("{hash}.pw"), format!("{hash}.pw.removed")]
    );
    assert_eq!(
        fixture.read(&format!(".vault/secrets/{hash}.pw")),
        "rotated-passphrase"
    );
}

fn forget_manifest(fixture: &Fixture) {
    let paths = fixture.paths();
    let mut config = manifest::load(&paths).unwrap().unwrap();
    config.managed_paths.clear();
    manifest::save(&paths, &config).unwrap();
    fs::remove_file(fixture.path(".vault/storage/secrets_key.txt.tar.gz.gpg")).unwrap();
}

#[test]
fn orphaned_record_with_matching_passphrase_is_reused() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    add(&fixture, "secrets/key.txt");
    forget_manifest(&fixture);

    let report = fixture
        .manager()
        .add(
            Path::new("secrets/key.txt"),
            &fixture.root,
            &fixed(PASSWORD),
            &[],
        )
        .unwrap();

    assert!(report.reused_record);
    assert_eq!(fixture.secret_files(), vec![format!("{}.pw", report.entry.hash)]);
}

#[test]
fn orphaned_record_with_other_passphrase_is_retired() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    add(&fixture, "secrets/key.txt");
    forget_manifest(&fixture);

    let report = fixture
        .manager()
        .add(
            Path::new("secrets/key.txt"),
            &fixture.root,
            &fixed("different-passphrase"),
            &[],
        )
        .unwrap();

    let hash = report.entry.hash;
    assert!(!report.reused_record);
    assert_eq!(
        fixture.secret_files(),
        vec![format!("{hash}.pw"), format!("{hash}.pw.removed")]
    );
}

#[test]
fn decrypt_keeps_differing_plaintext_unless_write_is_set() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    add(&fixture, "secrets/key.txt");
    fixture.write("secrets/key.txt", "local edit");
    let manager = fixture.manager();

    let cautious = manager.decrypt_all(None, &fixture.root, false).unwrap();
    assert!(cautious.changed.is_empty());
    assert_eq!(cautious.processed.len(), 1);
    assert_eq!(cautious.warnings.len(), 1);
    assert_eq!(fixture.read("secrets/key.txt"), "local edit");

    let forced = manager.decrypt_all(None, &fixture.root, true).unwrap();
    assert_eq!(forced.changed, vec!["secrets/key.txt".to_owned()]);
    assert_eq!(fixture.read("secrets/key.txt"), "v1");
}

#[test]
fn decrypt_of_matching_plaintext_is_a_no_op() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    add(&fixture, "secrets/key.txt");

    let report = fixture
        .manager()
        .decrypt_all(None, &fixture.root, false)
        .unwrap();
    assert!(report.changed.is_empty());
    assert!(report.warnings.is_empty());
    assert_eq!(report.processed, vec!["secrets/key.txt".to_owned()]);
}

#[test]
fn decrypt_reports_missing_archive() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    add(&fixture, "secrets/key.txt");
    fs::remove_file(fixture.path(".vault/storage/secrets_key.txt.tar.gz.gpg")).unwrap();

    let report = fixture
        .manager()
        .decrypt_all(None, &fixture.root, false)
        .unwrap();
    assert!(report.processed.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].code, "E400");
}

#[test]
fn encrypt_skips_missing_plaintext() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    add(&fixture, "secrets/key.txt");
    fs::remove_file(fixture.path("secrets/key.txt")).unwrap();

    let report = fixture.manager().encrypt_all(None, &fixture.root).unwrap();
    assert_eq!(report.skipped, vec!["secrets/key.txt".to_owned()]);
    assert!(report.failures.is_empty());
}

#[test]
fn encrypt_reports_missing_secret_record() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    add(&fixture, "secrets/key.txt");
    let hash = path_hash("secrets/key.txt");
    fs::remove_file(fixture.path(&format!(".vault/secrets/{hash}.pw"))).unwrap();
    fixture.write("secrets/key.txt", "v2");

    let report = fixture.manager().encrypt_all(None, &fixture.root).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].code, "E301");
    assert_eq!(report.failures[0].path, "secrets/key.txt");
}

#[test]
fn encrypt_one_path_only_touches_that_entry() {
    let fixture = initialized();
    fixture.write("a.txt", "a1");
    fixture.write("b.txt", "b1");
    add(&fixture, "a.txt");
    add(&fixture, "b.txt");
    fixture.write("a.txt", "a2");
    fixture.write("b.txt", "b2");

    let report = fixture
        .manager()
        .encrypt_all(Some(Path::new("b.txt")), &fixture.root)
        .unwrap();
    assert_eq!(report.changed, vec!["b.txt".to_owned()]);
    assert_eq!(report.attempted(), 1);
}

#[test]
fn deleted_directory_resolves_by_name_without_trailing_slash() {
    let fixture = initialized();
    fixture.write("config/prod/db.toml", "url = 1\n");
    fixture.write("other.txt", "x");
    add(&fixture, "config/prod");
    add(&fixture, "other.txt");
    fs::remove_dir_all(fixture.path("config/prod")).unwrap();
    fs::remove_file(fixture.path("other.txt")).unwrap();

    let report = fixture
        .manager()
        .decrypt_all(Some(Path::new("./config//prod")), &fixture.root, false)
        .unwrap();
    assert_eq!(report.changed, vec!["config/prod/".to_owned()]);
    assert_eq!(report.attempted(), 1);
    assert_eq!(fixture.read("config/prod/db.toml"), "url = 1\n");
    assert!(!fixture.exists("other.txt"));
}

#[test]
fn encrypt_in_uninitialized_repository_is_empty() {
    let fixture = Fixture::new();
    let report = fixture.manager().encrypt_all(None, &fixture.root).unwrap();
    assert_eq!(report.attempted(), 0);
    assert!(!fixture.exists(".vault"));
}

#[test]
fn external_backend_records_are_skipped_when_signed_out() {
    let fixture = Fixture::new();
    fixture
        .manager()
        .init(&InitOptions {
            backend: Some(BackendKind::External),
            ..InitOptions::default()
        })
        .unwrap();
    fixture.write("secrets/key.txt", "v1");
    let report = fixture
        .manager()
        .add(
            Path::new("secrets/key.txt"),
            &fixture.root,
            &fixed(PASSWORD),
            &[],
        )
        .unwrap();
    assert_eq!(report.backend, BackendKind::External);
    assert_eq!(
        fixture.secret_files(),
        vec![format!("{}.pw.1pass", report.entry.hash)]
    );

    fixture.op.set_signed_in(false);
    fixture.write("secrets/key.txt", "v2");
    let encrypted = fixture.manager().encrypt_all(None, &fixture.root).unwrap();
    assert_eq!(encrypted.skipped, vec!["secrets/key.txt".to_owned()]);
    assert!(encrypted.failures.is_empty());
}

#[test]
fn external_add_fails_cleanly_when_signed_out() {
    let fixture = Fixture::new();
    fixture
        .manager()
        .init(&InitOptions {
            backend: Some(BackendKind::External),
            ..InitOptions::default()
        })
        .unwrap();
    fixture.write("secrets/key.txt", "v1");
    fixture.op.set_signed_in(false);

    let error = fixture
        .manager()
        .add(
            Path::new("secrets/key.txt"),
            &fixture.root,
            &fixed(PASSWORD),
            &[],
        )
        .unwrap_err();
    assert!(matches!(error, VaultError::AuthRequired(_)));
    assert!(fixture.secret_files().is_empty());
    assert!(fixture.archives().is_empty());
}

#[test]
fn list_reports_local_state_and_links() {
    let fixture = initialized();
    fixture.write("secrets/key.txt", "v1");
    fixture
        .manager()
        .add(
            Path::new("secrets/key.txt"),
            &fixture.root,
            &fixed(PASSWORD),
            &["config/app.toml".to_owned()],
        )
        .unwrap();
    fs::remove_file(fixture.path("secrets/key.txt")).unwrap();

    let entries = fixture.manager().list().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.path, "secrets/key.txt");
    assert_eq!(entry.kind, "file");
    assert_eq!(entry.backend, Some(BackendKind::File));
    assert!(entry.archive_present);
    assert!(!entry.plaintext_present);
    assert_eq!(entry.linked_config_files, vec!["config/app.toml".to_owned()]);
}

#[test]
fn check_reports_each_local_issue() {
    let fixture = initialized();
    fixture.write("a.txt", "a");
    fixture.write("b.txt", "b");
    add(&fixture, "a.txt");
    add(&fixture, "b.txt");
    fs::remove_file(fixture.path(".vault/storage/a.txt.tar.gz.gpg")).unwrap();
    fs::remove_file(fixture.path(&format!(".vault/secrets/{}.pw", path_hash("b.txt")))).unwrap();
    fixture.write(".vault/storage/old.tar.gz.gpg", "stale");
    fixture.write(".vault/secrets/0123abcd.pw", "orphan");

    let report = fixture.manager().check().unwrap();
    assert_eq!(report.entries, 2);
    let kinds = report
        .issues
        .iter()
        .map(|issue| issue.kind)
        .collect::<Vec<_>>();
    assert!(kinds.contains(&IssueKind::MissingArchive));
    assert!(kinds.contains(&IssueKind::MissingRecord));
    assert!(kinds.contains(&IssueKind::StrayArchive));
    assert!(kinds.contains(&IssueKind::OrphanRecord));
    assert!(!kinds.contains(&IssueKind::BackendMismatch));
    assert!(!report.is_clean());
}

#[test]
fn check_flags_records_in_the_other_backend() {
    let fixture = initialized();
    fixture.write("a.txt", "a");
    add(&fixture, "a.txt");
    fixture
        .manager()
        .init(&InitOptions {
            backend: Some(BackendKind::External),
            ..InitOptions::default()
        })
        .unwrap();

    let report = fixture.manager().check().unwrap();
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].kind, IssueKind::BackendMismatch);
}

#[test]
fn check_flags_managed_paths_missing_their_ignore_rule() {
    let fixture = initialized();
    fixture.write("config/prod/db.toml", "url = 1\n");
    add(&fixture, "config/prod");
    let trimmed = fixture
        .gitignore()
        .lines()
        .filter(|line| *line != "/config/prod/")
        .map(|line| format!("{line}\n"))
        .collect::<String>();
    fixture.write(".gitignore", &trimmed);

    let report = fixture.manager().check().unwrap();
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].kind, IssueKind::MissingIgnoreRule);
    assert_eq!(report.issues[0].path.as_deref(), Some("config/prod/"));
    assert!(report.issues[0].detail.contains("/config/prod/"));
}

#[test]
fn check_of_consistent_vault_is_clean() {
    let fixture = initialized();
    fixture.write("a.txt", "a");
    add(&fixture, "a.txt");
    assert!(fixture.manager().check().unwrap().is_clean());
}

#[test]
fn large_archives_register_the_lfs_pattern_once() {
    let fixture = Fixture::with_git(FakeGit::with_lfs());
    fixture
        .manager()
        .init(&InitOptions {
            large_object_threshold_mb: Some(1),
            ..InitOptions::default()
        })
        .unwrap();
    write_random(&fixture, "blobs/one.bin", 1536 * 1024);
    write_random(&fixture, "blobs/two.bin", 1536 * 1024);

    let manager = fixture.manager();
    let first = manager
        .add(
            Path::new("blobs/one.bin"),
            &fixture.root,
            &fixed(PASSWORD),
            &[],
        )
        .unwrap();
    let second = manager
        .add(
            Path::new("blobs/two.bin"),
            &fixture.root,
            &fixed(PASSWORD),
            &[],
        )
        .unwrap();

    assert_eq!(first.tier, TierOutcome::Registered);
    assert_eq!(second.tier, TierOutcome::AlreadyRegistered);
    let attributes = fixture.read(".gitattributes");
    assert_eq!(
        attributes
            .lines()
            .filter(|line| *line == ".vault/storage/*.tar.gz.gpg filter=lfs diff=lfs merge=lfs -text")
            .count(),
        1
    );
    assert_eq!(fixture.git.lfs_tracked(), vec![".vault/storage/*.tar.gz.gpg".to_owned()]);
    assert!(fixture.git.staged_paths().contains(&".gitattributes".to_owned()));
}

#[test]
fn large_archive_without_lfs_only_warns() {
    let fixture = Fixture::new();
    fixture
        .manager()
        .init(&InitOptions {
            large_object_threshold_mb: Some(1),
            ..InitOptions::default()
        })
        .unwrap();
    write_random(&fixture, "blobs/one.bin", 1536 * 1024);

    let report = fixture
        .manager()
        .add(
            Path::new("blobs/one.bin"),
            &fixture.root,
            &fixed(PASSWORD),
            &[],
        )
        .unwrap();
    assert_eq!(report.tier, TierOutcome::Unavailable);
    assert_eq!(report.warnings.len(), 1);
    assert!(!fixture.exists(".gitattributes"));
}

#[test]
fn tiering_failure_is_recorded_per_entry() {
    let fixture = Fixture::with_git(FakeGit::with_lfs());
    fixture
        .manager()
        .init(&InitOptions {
            large_object_threshold_mb: Some(1),
            ..InitOptions::default()
        })
        .unwrap();
    write_random(&fixture, "blobs/one.bin", 1536 * 1024);
    fixture.write("a.txt", "a");
    add(&fixture, "blobs/one.bin");
    add(&fixture, "a.txt");

    fs::remove_file(fixture.path(".gitattributes")).unwrap();
    fs::create_dir(fixture.path(".gitattributes")).unwrap();
    write_random(&fixture, "blobs/one.bin", 1536 * 1024);
    fixture.write("a.txt", "b");

    let report = fixture.manager().encrypt_all(None, &fixture.root).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "blobs/one.bin");
    assert_eq!(report.processed, vec!["a.txt".to_owned()]);
    assert_eq!(report.changed, vec!["a.txt".to_owned()]);
    assert!(fixture
        .git
        .staged_paths()
        .contains(&".vault/storage/blobs_one.bin.tar.gz.gpg".to_owned()));
}

#[test]
fn install_hooks_twice_is_byte_identical() {
    let fixture = initialized();
    let manager = fixture.manager();

    let first = manager.install_hooks().unwrap();
    assert_eq!(first.len(), 3);
    assert!(first
        .iter()
        .all(|(_, outcome)| *outcome == HookOutcome::Created));
    let before = ["pre-commit", "post-checkout", "post-merge"]
        .map(|name| fs::read(fixture.path(&format!(".git/hooks/{name}"))).unwrap());

    let second = manager.install_hooks().unwrap();
    assert!(second
        .iter()
        .all(|(_, outcome)| *outcome == HookOutcome::Unchanged));
    let after = ["pre-commit", "post-checkout", "post-merge"]
        .map(|name| fs::read(fixture.path(&format!(".git/hooks/{name}"))).unwrap());
    assert_eq!(before, after);

    let pre_commit = fixture.read(".git/hooks/pre-commit");
    assert!(pre_commit.starts_with("#!/bin/sh\n"));
    assert!(pre_commit.contains(HOOK_MARKER));
    assert!(pre_commit
        .contains("git-vault --workspace \"$(dirname \"$0\")/../..\" --quiet encrypt || exit 1"));
    let post_merge = fixture.read(".git/hooks/post-merge");
    assert!(post_merge.contains("--quiet decrypt"));
    assert!(!post_merge.contains("|| exit 1"));
}

#[test]
fn install_hooks_backs_up_foreign_hooks() {
    let fixture = initialized();
    let original = "#!/bin/sh\necho custom\n";
    fixture.write(".git/hooks/post-merge", original);

    let outcomes = fixture.manager().install_hooks().unwrap();
    let (_, outcome) = outcomes
        .iter()
        .find(|(kind, _)| kind.file_name() == "post-merge")
        .unwrap();
    let HookOutcome::Appended { backup } = outcome else {
        panic!("expected appended outcome, got {outcome:?}");
    };
    assert_eq!(fs::read_to_string(backup).unwrap(), original);
    let updated = fixture.read(".git/hooks/post-merge");
    assert!(updated.starts_with(original));
    assert!(updated.contains(HOOK_MARKER));
}

#[test]
fn install_hooks_leaves_divergent_hooks_alone() {
    let fixture = initialized();
    let edited = format!("#!/bin/sh\n{HOOK_MARKER}\ngit-vault encrypt --verbose\n");
    fixture.write(".git/hooks/pre-commit", &edited);

    let outcomes = fixture.manager().install_hooks().unwrap();
    assert!(matches!(
        &outcomes[0].1,
        HookOutcome::Divergent { recorded_line } if recorded_line == "git-vault encrypt --verbose"
    ));
    assert_eq!(fixture.read(".git/hooks/pre-commit"), edited);
}
