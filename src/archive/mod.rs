//! Deterministic archive packaging and the encrypt/decrypt pipeline.
//!
//! Archives are gzip-compressed tarballs whose entry names are the
//! repository-relative managed path, so extracting under the repository root
//! reproduces the working-tree layout. Headers carry no timestamps or owner
//! information: packing unchanged plaintext twice yields identical bytes.

/// `gpg` cipher driver.
pub mod gpg;

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, Write},
    path::{Component, Path, PathBuf},
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use sha2::{Digest, Sha256};
use tar::{Archive, EntryType, Header};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use crate::{
    error::{Result, VaultError},
    identity::{join_relative, storage_name},
    types::Passphrase,
};

pub use gpg::{CipherTool, GpgCipher};

const DIRECTORY_MODE: u32 = 0o755;
const EXECUTABLE_MODE: u32 = 0o755;
const REGULAR_MODE: u32 = 0o644;
const SCRATCH_PREFIX: &str = ".git-vault-";
const SEALED_SCRATCH_NAME: &str = "sealed.tar.gz.gpg";
const OPENED_SCRATCH_NAME: &str = "opened.tar.gz";
const EXTRACT_SCRATCH_DIR: &str = "tree";

/// SHA-256 over an uncompressed tar stream.
pub type ArchiveDigest = [u8; 32];

/// Creates a self-cleaning scratch directory inside `parent`.
///
/// Keeping scratch space next to its destination makes the final rename
/// stay on one filesystem.
pub fn scratch_dir(parent: &Path) -> Result<TempDir> {
    fs::create_dir_all(parent)?;
    let scratch = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir_in(parent)?;
    Ok(scratch)
}

/// Packs the managed path `relative` under `root` into an uncompressed,
/// deterministic tar stream.
pub fn pack_tar(root: &Path, relative: &str) -> Result<Vec<u8>> {
    let source = join_relative(root, relative);
    let entry_root = relative.trim_end_matches('/');
    let metadata = match fs::symlink_metadata(&source) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Err(VaultError::EncryptionFailed {
                path: relative.to_owned(),
                detail: "plaintext is missing".to_owned(),
            });
        }
        Err(error) => return Err(error.into()),
    };
    ensure_archivable(root, relative)?;

    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    if metadata.is_dir() {
        for entry in WalkDir::new(&source).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let nested = entry.path().strip_prefix(&source).map_err(|_| {
                VaultError::InvalidInput(format!(
                    "walked outside {}: {}",
                    source.display(),
                    entry.path().display()
                ))
            })?;
            let name = if nested.as_os_str().is_empty() {
                entry_root.to_owned()
            } else {
                format!("{entry_root}/{}", posix_name(nested)?)
            };
            append_entry(&mut builder, entry.path(), &name)?;
        }
    } else {
        append_entry(&mut builder, &source, entry_root)?;
    }
    Ok(builder.into_inner()?)
}

/// Lists entries at or below `path` that an archive cannot carry: symlinks
/// and special files.
///
/// Names are relative to `path`, with `.` standing for `path` itself. A
/// missing `path` has no such entries.
pub fn unarchivable_entries(path: &Path) -> Result<Vec<String>> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error.into()),
    };
    if !metadata.is_dir() {
        return Ok(if metadata.is_file() {
            Vec::new()
        } else {
            vec![".".to_owned()]
        });
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let file_type = entry.file_type();
        if file_type.is_dir() || file_type.is_file() {
            continue;
        }
        let nested = entry
            .path()
            .strip_prefix(path)
            .map_err(|_| VaultError::InvalidInput(format!("walked outside {}", path.display())))?;
        found.push(posix_name(nested)?);
    }
    Ok(found)
}

/// Fails when the managed path `relative` holds symlinks or special files,
/// naming each of them.
pub fn ensure_archivable(root: &Path, relative: &str) -> Result<()> {
    let unsupported = unarchivable_entries(&join_relative(root, relative))?;
    if unsupported.is_empty() {
        return Ok(());
    }
    Err(VaultError::InvalidInput(format!(
        "{relative} contains symlinks or special files that cannot be archived: {}",
        qualified_names(relative, &unsupported).join(", ")
    )))
}

/// Prefixes names from [`unarchivable_entries`] with the managed path.
pub fn qualified_names(relative: &str, names: &[String]) -> Vec<String> {
    let entry_root = relative.trim_end_matches('/');
    names
        .iter()
        .map(|name| {
            if name == "." {
                entry_root.to_owned()
            } else {
                format!("{entry_root}/{name}")
            }
        })
        .collect()
}

/// Gzip-compresses a tar stream with a zeroed header timestamp.
pub fn compress(tar_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(tar_bytes)?;
    Ok(encoder.finish()?)
}

/// Writes a deterministic `.tar.gz` of `relative` into `scratch` and returns its path.
pub fn create_archive(root: &Path, relative: &str, scratch: &Path) -> Result<PathBuf> {
    let compressed = compress(&pack_tar(root, relative)?)?;
    let archive = scratch.join(format!("{}.tar.gz", storage_name(relative)));
    fs::write(&archive, compressed)?;
    Ok(archive)
}

/// Extracts a `.tar.gz` into `target`, returning the entry names.
///
/// Entries with absolute paths, `..` components, or link types are rejected
/// before anything is written for them.
pub fn extract_archive(archive: &Path, target: &Path) -> Result<Vec<String>> {
    let failed = |detail: String| VaultError::ExtractionFailed {
        path: archive.display().to_string(),
        detail,
    };

    let file = File::open(archive)?;
    let mut tarball = Archive::new(GzDecoder::new(file));
    tarball.set_preserve_mtime(false);
    tarball.set_overwrite(true);

    let mut names = Vec::new();
    let entries = tarball
        .entries()
        .map_err(|error| failed(error.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|error| failed(error.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|error| failed(error.to_string()))?
            .into_owned();
        let name = safe_entry_name(&entry_path)
            .ok_or_else(|| failed(format!("unsafe entry path `{}`", entry_path.display())))?;
        let entry_type = entry.header().entry_type();
        if !entry_type.is_file() && !entry_type.is_dir() {
            return Err(failed(format!("unsupported entry type for `{name}`")));
        }
        let unpacked = entry
            .unpack_in(target)
            .map_err(|error| failed(format!("`{name}`: {error}")))?;
        if !unpacked {
            return Err(failed(format!("entry `{name}` escapes the target")));
        }
        names.push(name);
    }
    Ok(names)
}

/// Packs, encrypts, decrypts, and extracts `relative` in scratch space and
/// compares the result with the source tree.
///
/// Returns the validated ciphertext inside `scratch` so callers can install
/// exactly the bytes that were checked.
pub fn validate_round_trip(
    cipher: &dyn CipherTool,
    root: &Path,
    relative: &str,
    passphrase: &Passphrase,
    scratch: &Path,
) -> Result<PathBuf> {
    let archive = create_archive(root, relative, scratch)?;
    let sealed = scratch.join(SEALED_SCRATCH_NAME);
    cipher.encrypt(&archive, &sealed, passphrase)?;

    let extracted = decrypt_to_scratch(cipher, &sealed, relative, passphrase, scratch)?;
    if let Some(difference) = compare_trees(&join_relative(root, relative), &extracted)? {
        return Err(VaultError::EncryptionFailed {
            path: relative.to_owned(),
            detail: format!("round-trip validation failed: {difference}"),
        });
    }
    debug!(path = relative, "round-trip validation passed");
    Ok(sealed)
}

/// Packs and encrypts `relative`, then moves the ciphertext to `destination`.
pub fn encrypt_path(
    cipher: &dyn CipherTool,
    root: &Path,
    relative: &str,
    destination: &Path,
    passphrase: &Passphrase,
    scratch: &Path,
) -> Result<()> {
    let archive = create_archive(root, relative, scratch)?;
    let sealed = scratch.join(SEALED_SCRATCH_NAME);
    cipher.encrypt(&archive, &sealed, passphrase)?;
    install_file(&sealed, destination)
}

/// Decrypts and extracts an archive into `scratch`, returning the extracted
/// managed path.
///
/// Every entry must live at or below `relative`.
pub fn decrypt_to_scratch(
    cipher: &dyn CipherTool,
    archive_file: &Path,
    relative: &str,
    passphrase: &Passphrase,
    scratch: &Path,
) -> Result<PathBuf> {
    let opened = scratch.join(OPENED_SCRATCH_NAME);
    cipher.decrypt(archive_file, &opened, passphrase)?;

    let tree = scratch.join(EXTRACT_SCRATCH_DIR);
    if tree.exists() {
        fs::remove_dir_all(&tree)?;
    }
    fs::create_dir_all(&tree)?;
    let names = extract_archive(&opened, &tree)?;
    fs::remove_file(&opened)?;

    let entry_root = relative.trim_end_matches('/');
    let nested_prefix = format!("{entry_root}/");
    if let Some(stray) = names
        .iter()
        .find(|name| name.as_str() != entry_root && !name.starts_with(&nested_prefix))
    {
        return Err(VaultError::ExtractionFailed {
            path: archive_file.display().to_string(),
            detail: format!("entry `{stray}` is outside managed path `{relative}`"),
        });
    }

    let extracted = join_relative(&tree, relative);
    if !extracted.exists() {
        return Err(VaultError::ExtractionFailed {
            path: archive_file.display().to_string(),
            detail: format!("archive does not contain `{relative}`"),
        });
    }
    Ok(extracted)
}

/// Digest of the plaintext as it would be archived now.
pub fn archive_digest(root: &Path, relative: &str) -> Result<ArchiveDigest> {
    Ok(Sha256::digest(pack_tar(root, relative)?).into())
}

/// Digest of the tar stream stored in an existing encrypted archive.
pub fn archived_digest(
    cipher: &dyn CipherTool,
    archive_file: &Path,
    passphrase: &Passphrase,
    scratch: &Path,
) -> Result<ArchiveDigest> {
    let opened = scratch.join(OPENED_SCRATCH_NAME);
    cipher.decrypt(archive_file, &opened, passphrase)?;

    let mut decoder = GzDecoder::new(File::open(&opened)?);
    let mut hasher = Sha256::new();
    io::copy(&mut decoder, &mut hasher).map_err(|error| VaultError::ExtractionFailed {
        path: archive_file.display().to_string(),
        detail: error.to_string(),
    })?;
    fs::remove_file(&opened)?;
    Ok(hasher.finalize().into())
}

/// Compares two trees (or two files) by shape and content.
///
/// Returns a description of the first difference, or `None` when equal.
/// Symlinks and special files count as entries, so a tree holding them never
/// matches an extracted archive.
pub fn compare_trees(expected: &Path, actual: &Path) -> Result<Option<String>> {
    if !actual.exists() {
        return Ok(Some(format!("{} is missing", actual.display())));
    }
    let expected_nodes = snapshot(expected)?;
    let actual_nodes = snapshot(actual)?;

    for (name, node) in &expected_nodes {
        match actual_nodes.get(name) {
            None => return Ok(Some(format!("`{name}` is missing"))),
            Some(other) if other != node => return Ok(Some(format!("`{name}` differs"))),
            Some(_) => {}
        }
    }
    if let Some(extra) = actual_nodes
        .keys()
        .find(|name| !expected_nodes.contains_key(*name))
    {
        return Ok(Some(format!("unexpected `{extra}`")));
    }
    Ok(None)
}

/// Moves `source` over `destination`, replacing a file or a whole directory.
pub fn replace_path(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::symlink_metadata(destination) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(destination)?,
        Ok(_) => fs::remove_file(destination)?,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(error.into()),
    }
    fs::rename(source, destination)?;
    Ok(())
}

/// Moves a finished file into place, creating parent directories.
pub fn install_file(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(source, destination)?;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum TreeNode {
    Directory,
    File { digest: ArchiveDigest, executable: bool },
    Unsupported,
}

fn snapshot(base: &Path) -> Result<BTreeMap<String, TreeNode>> {
    let mut nodes = BTreeMap::new();
    for entry in WalkDir::new(base).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let file_type = entry.file_type();
        let nested = entry
            .path()
            .strip_prefix(base)
            .map_err(|_| VaultError::InvalidInput(format!("walked outside {}", base.display())))?;
        let name = posix_name(nested)?;
        if file_type.is_dir() {
            nodes.insert(name, TreeNode::Directory);
        } else if file_type.is_file() {
            let mut hasher = Sha256::new();
            io::copy(&mut File::open(entry.path())?, &mut hasher)?;
            let metadata = entry.metadata().map_err(io::Error::from)?;
            nodes.insert(
                name,
                TreeNode::File {
                    digest: hasher.finalize().into(),
                    executable: is_executable(&metadata),
                },
            );
        } else {
            nodes.insert(name, TreeNode::Unsupported);
        }
    }
    Ok(nodes)
}

fn append_entry(builder: &mut tar::Builder<Vec<u8>>, path: &Path, name: &str) -> Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    let file_type = metadata.file_type();
    let mut header = Header::new_gnu();
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);

    if file_type.is_dir() {
        header.set_entry_type(EntryType::Directory);
        header.set_mode(DIRECTORY_MODE);
        header.set_size(0);
        builder.append_data(&mut header, name, io::empty())?;
    } else if file_type.is_file() {
        header.set_entry_type(EntryType::Regular);
        header.set_mode(if is_executable(&metadata) {
            EXECUTABLE_MODE
        } else {
            REGULAR_MODE
        });
        header.set_size(metadata.len());
        builder.append_data(&mut header, name, File::open(path)?)?;
    } else {
        return Err(VaultError::InvalidInput(format!(
            "cannot archive symlink or special file {name}"
        )));
    }
    Ok(())
}

fn posix_name(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                VaultError::InvalidInput(format!(
                    "path is not valid UTF-8: {}",
                    relative.display()
                ))
            })?),
            Component::CurDir => {}
            _ => {
                return Err(VaultError::InvalidInput(format!(
                    "unexpected path component in {}",
                    relative.display()
                )))
            }
        }
    }
    Ok(parts.join("/"))
}

fn safe_entry_name(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}
