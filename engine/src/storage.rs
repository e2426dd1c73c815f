//! Protected storage for cache files.
//!
//! All persisted engine state lives as whole files under a single per-user
//! cache directory. Files are always rewritten in full; there is no partial
//! update and no cross-process locking, so the last writer wins.

use crate::common::EngineError;
use crate::encryption::ProtectedCipher;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const TOKEN_CACHE_FILE: &str = "token_cache.dat";
pub const TENANT_CACHE_FILE: &str = "tenant_cache.dat";
pub const RECENT_ENV_FILE: &str = "recent_env.txt";
pub const RECENT_TOKEN_FILE: &str = "recent_token.dat";
pub const KEY_FILE: &str = ".key";

/// Locations of every file the engine persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFiles {
    dir: PathBuf,
}

impl CacheFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn token_cache(&self) -> PathBuf {
        self.dir.join(TOKEN_CACHE_FILE)
    }

    pub fn tenant_cache(&self) -> PathBuf {
        self.dir.join(TENANT_CACHE_FILE)
    }

    pub fn recent_env(&self) -> PathBuf {
        self.dir.join(RECENT_ENV_FILE)
    }

    pub fn recent_token(&self) -> PathBuf {
        self.dir.join(RECENT_TOKEN_FILE)
    }

    pub fn key(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }
}

/// Whole-file storage with encryption at rest.
///
/// `read_text`/`write_text` go through the protection layer, while
/// `read_plain`/`write_plain` store text as-is (used for the recent
/// environment marker, which holds no secret).
pub trait ProtectedStorage: Send + Sync {
    /// Reads and decrypts a file. Returns `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CorruptCache`] when the file exists but cannot
    /// be decrypted.
    fn read_text(&self, path: &Path) -> Result<Option<String>, EngineError>;

    /// Encrypts and atomically replaces a file, creating its directory on demand.
    fn write_text(&self, path: &Path, plaintext: &str) -> Result<(), EngineError>;

    fn read_plain(&self, path: &Path) -> Result<Option<String>, EngineError>;

    fn write_plain(&self, path: &Path, text: &str) -> Result<(), EngineError>;

    /// Deletes every file in `dir`. Missing files or directory are not an error.
    ///
    /// Returns the paths that were removed.
    fn clear(&self, dir: &Path) -> Result<Vec<PathBuf>, EngineError>;
}

/// File-system backed [`ProtectedStorage`] using AES-256-GCM.
///
/// The key is derived from the configured passphrase or, when none is
/// configured, from a random per-user key file stored next to the caches.
pub struct EncryptedFileStorage {
    key_file: PathBuf,
    passphrase: Option<String>,
}

impl EncryptedFileStorage {
    pub fn new(files: &CacheFiles, passphrase: Option<String>) -> Self {
        Self {
            key_file: files.key(),
            passphrase: passphrase.filter(|p| !p.trim().is_empty()),
        }
    }

    fn cipher(&self, create_key: bool) -> Result<Option<ProtectedCipher>, EngineError> {
        if let Some(passphrase) = &self.passphrase {
            return Ok(Some(ProtectedCipher::new(passphrase.as_bytes())?));
        }

        match fs::read(&self.key_file) {
            Ok(material) => ProtectedCipher::new(material)
                .map(Some)
                .map_err(|e| EngineError::corrupt(&self.key_file, e)),
            Err(e) if e.kind() == ErrorKind::NotFound && create_key => {
                let material = ProtectedCipher::generate_key_material();
                write_atomic(&self.key_file, &material)?;
                log::debug!("Created protected storage key {}", self.key_file.display());
                Ok(Some(ProtectedCipher::new(material.to_vec())?))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl ProtectedStorage for EncryptedFileStorage {
    fn read_text(&self, path: &Path) -> Result<Option<String>, EngineError> {
        let Some(sealed) = self.read_plain(path)? else {
            return Ok(None);
        };

        let cipher = self
            .cipher(false)?
            .ok_or_else(|| EngineError::corrupt(path, "protection key is missing"))?;

        cipher
            .open(&sealed)
            .map(Some)
            .map_err(|e| EngineError::corrupt(path, e))
    }

    fn write_text(&self, path: &Path, plaintext: &str) -> Result<(), EngineError> {
        let cipher = self
            .cipher(true)?
            .ok_or_else(|| EngineError::Storage("protection key unavailable".to_string()))?;
        let sealed = cipher.seal(plaintext)?;
        write_atomic(path, sealed.as_bytes())
    }

    fn read_plain(&self, path: &Path) -> Result<Option<String>, EngineError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(EngineError::corrupt(path, e)),
            Err(e) => Err(e.into()),
        }
    }

    fn write_plain(&self, path: &Path, text: &str) -> Result<(), EngineError> {
        write_atomic(path, text.as_bytes())
    }

    fn clear(&self, dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut removed = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            log::info!("Deleting {} ...", path.display());
            match fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(removed)
    }
}

/// Writes `bytes` to a sibling temporary file and renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    let dir = path
        .parent()
        .ok_or_else(|| EngineError::Storage(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("cache");
    let tmp_path = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    let result = (|| {
        let mut file = open_private(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(EngineError::Storage(format!(
            "failed to write {}: {e}",
            path.display()
        )));
    }

    Ok(())
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(path)
}

/// In-memory [`ProtectedStorage`], for tests and ephemeral sessions.
///
/// Values are kept as plaintext; [`MemoryStorage::corrupt`] can be used to
/// simulate a file that no longer decrypts.
#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<PathBuf, MemoryEntry>>,
}

#[derive(Clone)]
enum MemoryEntry {
    Protected(String),
    Plain(String),
    Corrupt,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `path` as present but undecipherable.
    pub fn corrupt(&self, path: &Path) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(path.to_path_buf(), MemoryEntry::Corrupt);
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files
            .lock()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    fn get(&self, path: &Path) -> Result<Option<MemoryEntry>, EngineError> {
        let files = self
            .files
            .lock()
            .map_err(|e| EngineError::Storage(format!("memory storage poisoned: {e}")))?;
        Ok(files.get(path).cloned())
    }

    fn put(&self, path: &Path, entry: MemoryEntry) -> Result<(), EngineError> {
        let mut files = self
            .files
            .lock()
            .map_err(|e| EngineError::Storage(format!("memory storage poisoned: {e}")))?;
        files.insert(path.to_path_buf(), entry);
        Ok(())
    }
}

impl ProtectedStorage for MemoryStorage {
    fn read_text(&self, path: &Path) -> Result<Option<String>, EngineError> {
        match self.get(path)? {
            None => Ok(None),
            Some(MemoryEntry::Protected(text)) => Ok(Some(text)),
            Some(_) => Err(EngineError::corrupt(path, "not a protected payload")),
        }
    }

    fn write_text(&self, path: &Path, plaintext: &str) -> Result<(), EngineError> {
        self.put(path, MemoryEntry::Protected(plaintext.to_string()))
    }

    fn read_plain(&self, path: &Path) -> Result<Option<String>, EngineError> {
        match self.get(path)? {
            None => Ok(None),
            Some(MemoryEntry::Plain(text)) | Some(MemoryEntry::Protected(text)) => Ok(Some(text)),
            Some(MemoryEntry::Corrupt) => Err(EngineError::corrupt(path, "unreadable")),
        }
    }

    fn write_plain(&self, path: &Path, text: &str) -> Result<(), EngineError> {
        self.put(path, MemoryEntry::Plain(text.to_string()))
    }

    fn clear(&self, dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let mut files = self
            .files
            .lock()
            .map_err(|e| EngineError::Storage(format!("memory storage poisoned: {e}")))?;
        let removed: Vec<PathBuf> = files
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect();
        for path in &removed {
            files.remove(path);
        }
        Ok(removed)
    }
}
