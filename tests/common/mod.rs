#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use git_vault::{
    archive::CipherTool,
    error::{Result, VaultError},
    git::GitPlumbing,
    paths::VaultPaths,
    process::CommandOutput,
    secret::{ExternalBackend, FileBackend, OpExecutor, SecretRouter},
    types::Passphrase,
    vault::VaultManager,
};
use sha2::{Digest, Sha256};

const FAKE_CIPHER_MAGIC: &str = "FAKE-CIPHER";
const FAKE_CIPHER_MASK: u8 = 0x5a;

/// Deterministic stand-in for `gpg`: tags the payload with a passphrase
/// digest and masks the bytes.
#[derive(Debug, Clone, Default)]
pub struct FakeCipher {
    corrupt_on_decrypt: bool,
}

impl FakeCipher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cipher whose decrypt output is garbage, so round-trip validation fails.
    pub fn corrupting() -> Self {
        Self {
            corrupt_on_decrypt: true,
        }
    }
}

fn passphrase_tag(passphrase: &Passphrase) -> String {
    passphrase.expose(|value| format!("{:x}", Sha256::digest(value.as_bytes())))
}

impl CipherTool for FakeCipher {
    fn encrypt(&self, input: &Path, output: &Path, passphrase: &Passphrase) -> Result<()> {
        let plaintext = fs::read(input)?;
        let mut sealed = format!("{FAKE_CIPHER_MAGIC}:{}\n", passphrase_tag(passphrase)).into_bytes();
        sealed.extend(plaintext.iter().map(|byte| byte ^ FAKE_CIPHER_MASK));
        fs::write(output, sealed)?;
        Ok(())
    }

    fn decrypt(&self, input: &Path, output: &Path, passphrase: &Passphrase) -> Result<()> {
        let sealed = fs::read(input)?;
        let split = sealed
            .iter()
            .position(|byte| *byte == b'\n')
            .ok_or_else(|| VaultError::EncryptionFailed {
                path: input.display().to_string(),
                detail: "not a fake ciphertext".to_owned(),
            })?;
        let header = String::from_utf8_lossy(&sealed[..split]).into_owned();
        let expected = format!("{FAKE_CIPHER_MAGIC}:{}", passphrase_tag(passphrase));
        if header != expected {
            return Err(VaultError::EncryptionFailed {
                path: input.display().to_string(),
                detail: "decryption failed: Bad session key".to_owned(),
            });
        }
        if self.corrupt_on_decrypt {
            fs::write(output, b"definitely not gzip")?;
            return Ok(());
        }
        let plaintext = sealed[split + 1..]
            .iter()
            .map(|byte| byte ^ FAKE_CIPHER_MASK)
            .collect::<Vec<_>>();
        fs::write(output, plaintext)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct GitLog {
    pub staged: Vec<Vec<String>>,
    pub removed: Vec<Vec<String>>,
    pub lfs_tracked: Vec<String>,
}

/// Git plumbing that records calls instead of running `git`.
#[derive(Debug, Clone)]
pub struct FakeGit {
    log: Arc<Mutex<GitLog>>,
    lfs_available: bool,
}

impl FakeGit {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(GitLog::default())),
            lfs_available: false,
        }
    }

    pub fn with_lfs() -> Self {
        Self {
            lfs_available: true,
            ..Self::new()
        }
    }

    pub fn staged_paths(&self) -> Vec<String> {
        self.log.lock().unwrap().staged.concat()
    }

    pub fn removed_paths(&self) -> Vec<String> {
        self.log.lock().unwrap().removed.concat()
    }

    pub fn lfs_tracked(&self) -> Vec<String> {
        self.log.lock().unwrap().lfs_tracked.clone()
    }
}

impl GitPlumbing for FakeGit {
    fn toplevel(&self, cwd: &Path) -> Result<PathBuf> {
        Ok(cwd.to_path_buf())
    }

    fn stage(&self, _root: &Path, paths: &[String]) -> Result<()> {
        self.log.lock().unwrap().staged.push(paths.to_vec());
        Ok(())
    }

    fn stage_removal(&self, _root: &Path, paths: &[String]) -> Result<()> {
        self.log.lock().unwrap().removed.push(paths.to_vec());
        Ok(())
    }

    fn hooks_dir(&self, root: &Path) -> Result<PathBuf> {
        Ok(root.join(".git").join("hooks"))
    }

    fn lfs_available(&self, _root: &Path) -> bool {
        self.lfs_available
    }

    fn lfs_track(&self, _root: &Path, pattern: &str) -> Result<()> {
        self.log.lock().unwrap().lfs_tracked.push(pattern.to_owned());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OpItem {
    pub password: String,
    pub path: String,
    pub status: String,
}

#[derive(Debug)]
pub struct OpState {
    pub installed: bool,
    pub signed_in: bool,
    pub items: BTreeMap<String, OpItem>,
    pub calls: Vec<Vec<String>>,
}

/// In-memory emulation of the 1Password CLI.
#[derive(Debug, Clone)]
pub struct FakeOp {
    state: Arc<Mutex<OpState>>,
}

impl FakeOp {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(OpState {
                installed: true,
                signed_in: true,
                items: BTreeMap::new(),
                calls: Vec::new(),
            })),
        }
    }

    pub fn set_signed_in(&self, signed_in: bool) {
        self.state.lock().unwrap().signed_in = signed_in;
    }

    pub fn set_installed(&self, installed: bool) {
        self.state.lock().unwrap().installed = installed;
    }

    pub fn item(&self, title: &str) -> Option<OpItem> {
        self.state.lock().unwrap().items.get(title).cloned()
    }

    pub fn titles(&self) -> Vec<String> {
        self.state.lock().unwrap().items.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }
}

fn op_output(status_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        status_code,
        stdout: stdout.to_owned(),
        stderr: stderr.to_owned(),
    }
}

fn field_value(template: &serde_json::Value, id: &str) -> String {
    template["fields"]
        .as_array()
        .and_then(|fields| fields.iter().find(|field| field["id"] == id))
        .and_then(|field| field["value"].as_str())
        .unwrap_or_default()
        .to_owned()
}

impl OpExecutor for FakeOp {
    fn exec(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(args.iter().map(|arg| (*arg).to_owned()).collect());
        if !state.installed {
            return Err(VaultError::InvalidInput(
                "required binary not found: op".to_owned(),
            ));
        }
        match args {
            ["--version"] => Ok(op_output(0, "2.30.0\n", "")),
            ["whoami"] if state.signed_in => Ok(op_output(0, "URL: https://example\n", "")),
            ["whoami"] => Ok(op_output(1, "", "[ERROR] account is not signed in")),
            _ if !state.signed_in => Ok(op_output(1, "", "[ERROR] not signed in")),
            ["item", "create", ..] => {
                let template: serde_json::Value =
                    serde_json::from_slice(stdin.unwrap_or_default())?;
                let title = template["title"].as_str().unwrap_or_default().to_owned();
                let item = OpItem {
                    password: field_value(&template, "password"),
                    path: field_value(&template, "path"),
                    status: field_value(&template, "status"),
                };
                state.items.insert(title, item);
                Ok(op_output(0, "{}", ""))
            }
            ["item", "get", title, ..] => match state.items.get(*title) {
                Some(item) => Ok(op_output(0, &format!("{}\n", item.password), "")),
                None => Ok(op_output(
                    1,
                    "",
                    &format!("[ERROR] \"{title}\" isn't an item in the vault"),
                )),
            },
            ["item", "edit", title, "--vault", _, "--title", retired, status] => {
                let Some(mut item) = state.items.remove(*title) else {
                    return Ok(op_output(
                        1,
                        "",
                        &format!("[ERROR] \"{title}\" isn't an item in the vault"),
                    ));
                };
                if let Some(value) = status.strip_prefix("status[text]=") {
                    item.status = value.to_owned();
                }
                state.items.insert((*retired).to_owned(), item);
                Ok(op_output(0, "{}", ""))
            }
            _ => Ok(op_output(2, "", "unsupported fake op invocation")),
        }
    }
}

pub type TestVault = VaultManager<FakeCipher, FakeGit>;

/// Temporary repository wired to fake collaborators.
pub struct Fixture {
    _temp: tempfile::TempDir,
    pub root: PathBuf,
    pub git: FakeGit,
    pub op: FakeOp,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_git(FakeGit::new())
    }

    pub fn with_git(git: FakeGit) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("repo");
        fs::create_dir_all(&root).unwrap();
        let root = fs::canonicalize(root).unwrap();
        Self {
            _temp: temp,
            root,
            git,
            op: FakeOp::new(),
        }
    }

    pub fn paths(&self) -> VaultPaths {
        VaultPaths::new(&self.root)
    }

    pub fn manager(&self) -> TestVault {
        self.manager_with(FakeCipher::new())
    }

    pub fn manager_with(&self, cipher: FakeCipher) -> TestVault {
        let paths = self.paths();
        let router = SecretRouter::new(
            paths.clone(),
            FileBackend::new(paths.clone()),
            ExternalBackend::with_executor(paths.clone(), "Git-Vault", Box::new(self.op.clone())),
        );
        VaultManager::new(paths, router, cipher, self.git.clone())
    }

    pub fn external_backend(&self) -> ExternalBackend {
        ExternalBackend::with_executor(self.paths(), "Git-Vault", Box::new(self.op.clone()))
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    pub fn gitignore(&self) -> String {
        fs::read_to_string(self.path(".gitignore")).unwrap_or_default()
    }

    /// File names in `.vault/secrets/`, ignoring scratch directories.
    pub fn secret_files(&self) -> Vec<String> {
        let mut names = match fs::read_dir(self.paths().secrets_dir()) {
            Ok(entries) => entries
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .filter(|name| !name.starts_with(".git-vault-"))
                .collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    /// File names in `.vault/storage/`.
    pub fn archives(&self) -> Vec<String> {
        let mut names = match fs::read_dir(self.paths().storage_dir()) {
            Ok(entries) => entries
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

pub fn passphrase(value: &str) -> Passphrase {
    Passphrase::new(value.to_owned()).unwrap()
}
