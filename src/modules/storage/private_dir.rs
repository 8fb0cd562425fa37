//! Private on-disk storage for encrypted blobs.
//!
//! Layout under the configured upload directory:
//! - `<stored>.php`: encrypted blobs (mode 0600)
//! - `.staging/<stored>.src`: plaintext awaiting chunked encryption
//! - `.staging/<stored>.part`: partially written chunked blob
//! - `.htaccess` / `index.php`: deny-all guards for misconfigured web servers

use std::path::{Component, Path, PathBuf};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::core::error::{AppError, Result};

pub const STAGING_DIR: &str = ".staging";
const HTACCESS: &str = "Order deny,allow\nDeny from all\n";
const INDEX_GUARD: &str = "<?php\n// Silence is golden.\n";

/// Generate a unique, opaque stored filename: 32 hex chars, `_`, unix timestamp, `.php`.
pub fn generate_stored_name() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    format!("{}_{}.php", hex::encode(bytes), Utc::now().timestamp())
}

#[derive(Debug, Clone)]
pub struct PrivateStorage {
    root: PathBuf,
}

impl PrivateStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn blob_path(&self, stored_name: &str) -> PathBuf {
        self.root.join(stored_name)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub fn staged_source_path(&self, stored_name: &str) -> PathBuf {
        self.staging_dir().join(format!("{stored_name}.src"))
    }

    pub fn partial_blob_path(&self, stored_name: &str) -> PathBuf {
        self.staging_dir().join(format!("{stored_name}.part"))
    }

    /// Create the directory tree (0700) and the deny-all guard files if missing.
    pub async fn ensure(&self) -> Result<()> {
        for dir in [self.root.clone(), self.staging_dir()] {
            fs::create_dir_all(&dir).await?;
            set_mode(&dir, 0o700).await?;
        }

        for (name, body) in [(".htaccess", HTACCESS), ("index.php", INDEX_GUARD)] {
            let path = self.root.join(name);
            if fs::metadata(&path).await.is_err() {
                fs::write(&path, body).await?;
                debug!("Created guard file {}", path.display());
            }
        }
        Ok(())
    }

    /// Write a complete blob with owner-only permissions.
    pub async fn write_private(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut file = open_private(path, false).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    /// Append bytes to a private file, creating it (0600) if needed.
    pub async fn append_private(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut file = open_private(path, true).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    /// Move a file into the staging area and restrict its permissions.
    pub async fn stage(&self, source: &Path, stored_name: &str) -> Result<PathBuf> {
        let target = self.staged_source_path(stored_name);
        move_file(source, &target).await?;
        set_mode(&target, 0o600).await?;
        Ok(target)
    }

    /// List the files in the staging area with the upload each belongs to.
    ///
    /// Names that are neither `.src` nor `.part` are skipped.
    pub async fn staged_files(&self) -> Result<Vec<StagedFile>> {
        let dir = self.staging_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut staged = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some((stored_name, kind)) = StagedKind::split(&name) else {
                continue;
            };
            staged.push(StagedFile {
                path: entry.path(),
                stored_name: stored_name.to_string(),
                kind,
                modified: meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now()),
            });
        }
        Ok(staged)
    }
}

/// Which half of a chunked upload a staging file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedKind {
    /// Plaintext awaiting encryption
    Source,
    /// Blob being assembled
    Partial,
}

impl StagedKind {
    fn split(file_name: &str) -> Option<(&str, StagedKind)> {
        let split = match file_name.strip_suffix(".src") {
            Some(stored) => (stored, StagedKind::Source),
            None => (file_name.strip_suffix(".part")?, StagedKind::Partial),
        };
        (!split.0.is_empty()).then_some(split)
    }
}

#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub stored_name: String,
    pub kind: StagedKind,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RelocationReport {
    /// `(old_path, new_path)` for every blob moved
    pub moved: Vec<(PathBuf, PathBuf)>,
    pub failed: Vec<PathBuf>,
}

/// Move every encrypted blob from `old_root` into `new`, creating its guard files.
///
/// Only top-level `.php` blobs move; guard files are recreated rather than moved and
/// the staging area stays with in-flight tasks. The old directory's guard files and
/// the directory itself are removed when everything moved.
pub async fn relocate_blobs(old_root: &Path, new: &PrivateStorage) -> Result<RelocationReport> {
    new.ensure().await?;

    let mut report = RelocationReport::default();
    let mut entries = match fs::read_dir(old_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if !entry.metadata().await?.is_file() || name == "index.php" || !name.ends_with(".php")
        {
            continue;
        }

        let target = new.blob_path(&name);
        match move_file(&path, &target).await {
            Ok(()) => report.moved.push((path, target)),
            Err(e) => {
                warn!("Failed to move {:?} to {:?}: {}", path, target, e);
                report.failed.push(path);
            }
        }
    }

    if report.failed.is_empty() {
        for guard in [".htaccess", "index.php"] {
            if let Err(e) = remove_if_exists(&old_root.join(guard)).await {
                debug!("Guard file {} in {:?} kept: {}", guard, old_root, e);
            }
        }
        let staging = old_root.join(STAGING_DIR);
        let _ = fs::remove_dir(&staging).await;
        if let Err(e) = fs::remove_dir(old_root).await {
            debug!("Old upload directory {:?} kept: {}", old_root, e);
        }
    }

    Ok(report)
}

/// Remove a file, treating "already gone" as success.
pub async fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub async fn exists(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

/// Rename, falling back to copy + delete when source and target are on different devices.
pub async fn move_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    match fs::rename(source, target).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!(
                "rename {:?} -> {:?} failed ({}), copying instead",
                source, target, rename_err
            );
            fs::copy(source, target).await?;
            fs::remove_file(source).await?;
            Ok(())
        }
    }
}

/// Resolve a caller-supplied path and require it to live inside `base`.
///
/// Relative paths are joined onto `base`. Parent-directory components are rejected
/// outright, and the canonical result must still start with the canonical base.
pub async fn resolve_within(base: &Path, candidate: &str) -> Result<PathBuf> {
    let candidate_path = Path::new(candidate);
    if candidate_path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(AppError::Forbidden(format!(
            "Path escapes the incoming directory: {candidate}"
        )));
    }

    let joined = if candidate_path.is_absolute() {
        candidate_path.to_path_buf()
    } else {
        base.join(candidate_path)
    };

    let base_canonical = fs::canonicalize(base).await?;
    let resolved = fs::canonicalize(&joined)
        .await
        .map_err(|_| AppError::NotFound(format!("Uploaded file not found: {candidate}")))?;

    if !resolved.starts_with(&base_canonical) {
        return Err(AppError::Forbidden(format!(
            "Path escapes the incoming directory: {candidate}"
        )));
    }
    Ok(resolved)
}

/// Cut a partially written file back to `len` bytes, dropping a half-written tail.
///
/// Fails when the file is shorter than `len`: earlier data is missing.
pub async fn truncate_to(path: &Path, len: u64) -> Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path).await?;
    let current = file.metadata().await?.len();
    if current < len {
        return Err(AppError::Internal(format!(
            "{} has {} bytes, expected at least {}",
            path.display(),
            current,
            len
        )));
    }
    if current > len {
        debug!("Truncating {:?} from {} to {} bytes", path, current, len);
        file.set_len(len).await?;
    }
    Ok(())
}

/// Read up to `len` bytes starting at `offset`. Shorter only at end of file.
pub async fn read_range(path: &Path, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut file = fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;

    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

async fn open_private(path: &Path, append: bool) -> Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    #[cfg(unix)]
    options.mode(0o600);
    Ok(options.open(path).await?)
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::validation::STORED_NAME_REGEX;

    #[test]
    fn test_stored_names_are_unique_and_opaque() {
        let a = generate_stored_name();
        let b = generate_stored_name();
        assert_ne!(a, b);
        assert!(STORED_NAME_REGEX.is_match(&a), "unexpected name {a}");
    }

    #[tokio::test]
    async fn test_ensure_creates_guards() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PrivateStorage::new(dir.path().join("secure"));
        tokio_test::assert_ok!(storage.ensure().await);
        // idempotent
        tokio_test::assert_ok!(storage.ensure().await);

        let htaccess = fs::read_to_string(storage.root().join(".htaccess"))
            .await
            .unwrap();
        assert!(htaccess.contains("Deny from all"));
        assert!(exists(&storage.root().join("index.php")).await);
        assert!(fs::metadata(storage.staging_dir()).await.unwrap().is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_private_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let storage = PrivateStorage::new(dir.path());
        let path = storage.blob_path("x.php");
        storage.write_private(&path, b"secret").await.unwrap();

        let mode = fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_append_private_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PrivateStorage::new(dir.path());
        let path = storage.blob_path("blob.part");
        storage.append_private(&path, b"ab").await.unwrap();
        storage.append_private(&path, b"cd").await.unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn test_resolve_within_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("upload.pdf"), b"x").await.unwrap();

        let ok = resolve_within(dir.path(), "upload.pdf").await.unwrap();
        assert!(ok.ends_with("upload.pdf"));

        let err = resolve_within(dir.path(), "../etc/passwd").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = resolve_within(dir.path(), "/etc/hostname").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_) | AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_relocate_blobs_moves_only_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let old = PrivateStorage::new(dir.path().join("old"));
        old.ensure().await.unwrap();
        old.write_private(&old.blob_path("a_1.php"), b"A").await.unwrap();
        old.write_private(&old.blob_path("b_2.php"), b"B").await.unwrap();
        fs::write(old.root().join("notes.txt"), b"keep").await.unwrap();

        let new = PrivateStorage::new(dir.path().join("new"));
        let report = relocate_blobs(old.root(), &new).await.unwrap();

        assert_eq!(report.moved.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(fs::read(new.blob_path("a_1.php")).await.unwrap(), b"A");
        assert!(exists(&new.root().join(".htaccess")).await);
        assert!(!exists(&old.blob_path("a_1.php")).await);
        // Unrelated files stay, so the old directory is not removed
        assert!(exists(&old.root().join("notes.txt")).await);
    }

    #[tokio::test]
    async fn test_relocate_missing_old_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let new = PrivateStorage::new(dir.path().join("new"));
        let report = relocate_blobs(&dir.path().join("absent"), &new).await.unwrap();
        assert!(report.moved.is_empty());
    }

    #[tokio::test]
    async fn test_remove_if_exists_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone");
        fs::write(&path, b"x").await.unwrap();
        assert!(remove_if_exists(&path).await.unwrap());
        assert!(!remove_if_exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_staged_files_pairs_names_with_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PrivateStorage::new(dir.path());
        storage.ensure().await.unwrap();
        fs::write(storage.staged_source_path("a_1.php"), b"plain").await.unwrap();
        fs::write(storage.partial_blob_path("a_1.php"), b"blob").await.unwrap();
        fs::write(storage.staging_dir().join("stray.tmp"), b"x").await.unwrap();

        let mut staged = storage.staged_files().await.unwrap();
        staged.sort_by_key(|f| f.path.clone());

        assert_eq!(staged.len(), 2);
        assert!(staged.iter().all(|f| f.stored_name == "a_1.php"));
        assert_eq!(staged[0].kind, StagedKind::Partial);
        assert_eq!(staged[1].kind, StagedKind::Source);
    }

    #[tokio::test]
    async fn test_staged_files_without_staging_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PrivateStorage::new(dir.path().join("absent"));
        assert!(storage.staged_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_truncate_to_drops_tail_and_rejects_short_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.part");
        fs::write(&path, b"abcdef").await.unwrap();

        truncate_to(&path, 4).await.unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), b"abcd");
        assert!(truncate_to(&path, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_read_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src");
        fs::write(&path, b"0123456789").await.unwrap();

        assert_eq!(read_range(&path, 2, 3).await.unwrap(), b"234");
        assert_eq!(read_range(&path, 8, 5).await.unwrap(), b"89");
        assert!(read_range(&path, 20, 5).await.unwrap().is_empty());
    }
}
