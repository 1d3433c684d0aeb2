//! Filesystem abstraction.
//!
//! The Ctx owns a polymorphic filesystem handle; scripts only ever touch it
//! through `open()` and the file object, so a host can swap in its own backend
//! without the interpreter noticing. The default is an in-memory store.

use std::fmt;

use ahash::AHashMap;

/// Write disposition for [`FileSystem::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace any existing contents.
    Write,
    /// Append to existing contents (creating the file if absent).
    Append,
}

/// Filesystem operation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    NotFound(String),
    /// Backend-specific failure (permission, quota, ...).
    Other(String),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "No such file or directory: '{path}'"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for FsError {}

/// The pluggable filesystem interface.
///
/// Implementations must be `Send`: generator producer threads can run file
/// operations while the consumer is parked.
pub trait FileSystem: Send + fmt::Debug {
    fn read(&self, path: &str) -> Result<String, FsError>;
    fn write(&mut self, path: &str, contents: &str, mode: WriteMode) -> Result<(), FsError>;
    fn exists(&self, path: &str) -> bool;
    fn delete(&mut self, path: &str) -> Result<(), FsError>;
    /// All stored paths starting with `prefix`, in sorted order.
    fn list(&self, prefix: &str) -> Vec<String>;

    /// Full contents dump for snapshot serialization. Backends that cannot
    /// enumerate themselves return `None`; their state is then not carried
    /// across `dump()`/`load()`.
    fn snapshot(&self) -> Option<Vec<(String, String)>> {
        None
    }
}

/// The default memory-backed filesystem.
#[derive(Debug, Default, Clone)]
pub struct MemoryFs {
    files: AHashMap<String, String>,
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates a file (host-side test fixture helper).
    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.insert(path.into(), contents.into());
    }
}

impl FileSystem for MemoryFs {
    fn read(&self, path: &str) -> Result<String, FsError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_owned()))
    }

    fn write(&mut self, path: &str, contents: &str, mode: WriteMode) -> Result<(), FsError> {
        match mode {
            WriteMode::Write => {
                self.files.insert(path.to_owned(), contents.to_owned());
            }
            WriteMode::Append => {
                self.files.entry(path.to_owned()).or_default().push_str(contents);
            }
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn delete(&mut self, path: &str) -> Result<(), FsError> {
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| FsError::NotFound(path.to_owned()))
    }

    fn list(&self, prefix: &str) -> Vec<String> {
        let mut paths: Vec<String> = self.files.keys().filter(|p| p.starts_with(prefix)).cloned().collect();
        paths.sort();
        paths
    }

    fn snapshot(&self) -> Option<Vec<(String, String)>> {
        let mut entries: Vec<(String, String)> = self.files.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        entries.sort();
        Some(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_roundtrip() {
        let mut fs = MemoryFs::new();
        fs.write("a.txt", "hello", WriteMode::Write).unwrap();
        assert_eq!(fs.read("a.txt").unwrap(), "hello");
        fs.write("a.txt", " world", WriteMode::Append).unwrap();
        assert_eq!(fs.read("a.txt").unwrap(), "hello world");
    }

    #[test]
    fn missing_file() {
        let fs = MemoryFs::new();
        assert!(matches!(fs.read("nope"), Err(FsError::NotFound(_))));
        assert!(!fs.exists("nope"));
    }

    #[test]
    fn list_by_prefix() {
        let mut fs = MemoryFs::new();
        fs.insert("logs/a", "1");
        fs.insert("logs/b", "2");
        fs.insert("data/c", "3");
        assert_eq!(fs.list("logs/"), vec!["logs/a".to_owned(), "logs/b".to_owned()]);
    }
}
