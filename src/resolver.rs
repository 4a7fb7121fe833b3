//! File resolution for asset names
//!
//! Maps asset names to readable file handles. The filesystem resolver is
//! the production path; the in-memory resolver serves tests and embedded
//! asset bundles.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{AssetError, Result};

#[derive(Clone)]
enum FileSource {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

/// A resolved, readable file backing one asset.
#[derive(Clone)]
pub struct FileHandle {
    name: String,
    source: FileSource,
}

impl FileHandle {
    /// Handle backed by a path on disk.
    pub fn from_path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Path(path.into()),
        }
    }

    /// Handle backed by an in-memory byte buffer.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Memory(bytes.into()),
        }
    }

    /// The asset name this handle was resolved from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the full contents of the file.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Path(path) => std::fs::read(path),
            FileSource::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }

    /// Read the contents as UTF-8 text.
    pub fn read_to_string(&self) -> io::Result<String> {
        let bytes = self.read()?;
        String::from_utf8(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            FileSource::Path(path) => write!(f, "FileHandle({:?} -> {:?})", self.name, path),
            FileSource::Memory(bytes) => {
                write!(f, "FileHandle({:?}, {} bytes in memory)", self.name, bytes.len())
            }
        }
    }
}

/// Resolves asset names to file handles.
///
/// Resolution is lazy: the manager resolves a name only when its loading
/// task first runs, not when the request is queued.
pub trait FileResolver: Send + Sync {
    /// Resolve `name` to a readable handle, or fail with
    /// [`AssetError::FileNotFound`].
    fn resolve(&self, name: &str) -> Result<FileHandle>;
}

impl<R: FileResolver + ?Sized> FileResolver for Arc<R> {
    fn resolve(&self, name: &str) -> Result<FileHandle> {
        (**self).resolve(name)
    }
}

/// Resolver rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsResolver {
    base: PathBuf,
}

impl FsResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl FileResolver for FsResolver {
    fn resolve(&self, name: &str) -> Result<FileHandle> {
        let path = self.base.join(name);
        match path.metadata() {
            Ok(meta) if meta.is_file() => Ok(FileHandle::from_path(name, path)),
            Ok(_) => Err(AssetError::FileNotFound {
                name: name.to_string(),
                source: None,
            }),
            Err(e) => Err(AssetError::FileNotFound {
                name: name.to_string(),
                source: Some(e),
            }),
        }
    }
}

/// In-memory resolver for tests and embedded assets.
#[derive(Default)]
pub struct MemoryResolver {
    files: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under `name`, replacing any previous entry.
    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.files.write().insert(name.into(), bytes.into());
    }

    /// Register a UTF-8 text file under `name`.
    pub fn insert_text(&self, name: impl Into<String>, text: &str) {
        self.insert(name, text.as_bytes().to_vec());
    }
}

impl FileResolver for MemoryResolver {
    fn resolve(&self, name: &str) -> Result<FileHandle> {
        self.files
            .read()
            .get(name)
            .map(|bytes| FileHandle::from_bytes(name, bytes.clone()))
            .ok_or_else(|| AssetError::FileNotFound {
                name: name.to_string(),
                source: None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_resolver_roundtrip() {
        let resolver = MemoryResolver::new();
        resolver.insert_text("hello.txt", "hi");

        let handle = resolver.resolve("hello.txt").unwrap();
        assert_eq!(handle.name(), "hello.txt");
        assert_eq!(handle.read_to_string().unwrap(), "hi");
    }

    #[test]
    fn test_memory_resolver_missing() {
        let resolver = MemoryResolver::new();
        let err = resolver.resolve("absent.txt").unwrap_err();
        assert!(matches!(err, AssetError::FileNotFound { .. }));
    }

    #[test]
    fn test_fs_resolver_missing() {
        let resolver = FsResolver::new("/nonexistent-quiver-base");
        let err = resolver.resolve("a.png").unwrap_err();
        assert!(matches!(err, AssetError::FileNotFound { .. }));
    }
}
