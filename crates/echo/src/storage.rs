//! Storage capability that recorded responses are read from.
//!
//! Replay only needs three operations: `stat` to probe whether an entry
//! exists, `read` to load it, and `list` to enumerate a directory. Two
//! backends are provided: [`MemoryStorage`] for archives unpacked in-process
//! and [`DirectoryStorage`] for the host filesystem.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// File or directory not found
    #[error("file not found: {0}")]
    NotFound(String),
    /// Path is not a directory
    #[error("not a directory: {0}")]
    NotADirectory(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Whether this error means the path does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            Self::NotADirectory(_) => false,
        }
    }
}

/// File/directory metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Whether this is a directory
    pub is_dir: bool,
    /// File size in bytes
    pub size: u64,
}

/// Directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name, relative to the listed directory
    pub name: String,
    /// Whether this entry is a directory
    pub is_dir: bool,
}

/// Read-only view of a directory tree.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Get metadata for a path.
    async fn stat(&self, path: &str) -> Result<Metadata, StorageError>;

    /// Read the full contents of a file.
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// List the direct children of a directory.
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>, StorageError>;
}

/// Normalize a path into the key form used by [`MemoryStorage`].
///
/// Leading slashes, `.` components and empty components are dropped and
/// `..` pops a component, so `/a/./b/` and `a/b` name the same entry.
fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// In-memory storage, usually populated from a packed archive.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unpack a packed archive so that its entries live under `mount`.
    ///
    /// A request for directory `mount` will then replay the archive.
    pub fn from_archive(mount: &str, archive: &[u8]) -> Result<Self, crate::EchoError> {
        let mut files = BTreeMap::new();
        for entry in crate::archive::entries(archive)? {
            files.insert(normalize(&format!("{mount}/{}", entry.name)), entry.data);
        }
        tracing::debug!(mount, count = files.len(), "Loaded archive into memory");
        Ok(Self {
            files: RwLock::new(files),
        })
    }

    /// Store a file, replacing any previous contents.
    pub async fn insert(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.files.write().await.insert(normalize(path), data.into());
    }

    /// Remove a file. Returns whether it existed.
    pub async fn remove(&self, path: &str) -> bool {
        self.files.write().await.remove(&normalize(path)).is_some()
    }

    /// Number of stored files.
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    /// Whether no files are stored.
    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn stat(&self, path: &str) -> Result<Metadata, StorageError> {
        let key = normalize(path);
        let files = self.files.read().await;
        if let Some(data) = files.get(&key) {
            return Ok(Metadata {
                is_dir: false,
                size: data.len() as u64,
            });
        }
        // Directories exist implicitly as prefixes of stored files.
        let prefix = format!("{key}/");
        if key.is_empty() || files.keys().any(|k| k.starts_with(&prefix)) {
            return Ok(Metadata {
                is_dir: true,
                size: 0,
            });
        }
        Err(StorageError::NotFound(path.to_string()))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.files
            .read()
            .await
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>, StorageError> {
        let key = normalize(path);
        let files = self.files.read().await;
        if files.contains_key(&key) {
            return Err(StorageError::NotADirectory(path.to_string()));
        }
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{key}/")
        };

        let mut dirs = BTreeSet::new();
        let mut entries = Vec::new();
        for file in files.keys() {
            let Some(rest) = file.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    if dirs.insert(dir.to_string()) {
                        entries.push(DirEntry {
                            name: dir.to_string(),
                            is_dir: true,
                        });
                    }
                }
                None => entries.push(DirEntry {
                    name: rest.to_string(),
                    is_dir: false,
                }),
            }
        }

        if entries.is_empty() && !key.is_empty() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(entries)
    }
}

/// Host filesystem storage.
///
/// With a root, request paths resolve beneath it and cannot climb out of it
/// with `..`. Without one, paths are used as given.
#[derive(Debug, Clone, Default)]
pub struct DirectoryStorage {
    root: Option<PathBuf>,
}

impl DirectoryStorage {
    /// Storage over the whole host filesystem.
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Storage confined to `root`.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let Some(root) = &self.root else {
            return PathBuf::from(path);
        };
        let mut resolved = root.clone();
        let mut depth = 0usize;
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::ParentDir if depth > 0 => {
                    resolved.pop();
                    depth -= 1;
                }
                _ => {}
            }
        }
        resolved
    }
}

fn map_io(path: &str, err: io::Error) -> StorageError {
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
        io::ErrorKind::NotADirectory => StorageError::NotADirectory(path.to_string()),
        _ => StorageError::Io(err),
    }
}

#[async_trait]
impl Storage for DirectoryStorage {
    async fn stat(&self, path: &str) -> Result<Metadata, StorageError> {
        let meta = tokio::fs::metadata(self.resolve(path))
            .await
            .map_err(|e| map_io(path, e))?;
        Ok(Metadata {
            is_dir: meta.is_dir(),
            size: meta.len(),
        })
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        tokio::fs::read(self.resolve(path))
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>, StorageError> {
        let mut dir = tokio::fs::read_dir(self.resolve(path))
            .await
            .map_err(|e| map_io(path, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| map_io(path, e))? {
            let file_type = entry.file_type().await.map_err(|e| map_io(path, e))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
