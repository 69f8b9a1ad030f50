#[cfg(any(test, feature = "test-support"))]
use std::collections::HashMap;
#[cfg(any(test, feature = "test-support"))]
use std::io;
#[cfg(any(test, feature = "test-support"))]
use std::path::{Path, PathBuf};
#[cfg(any(test, feature = "test-support"))]
use std::sync::{Arc, Mutex};

#[cfg(any(test, feature = "test-support"))]
use super::{ReadFile, WriteFile};

/// In-memory filesystem keyed by raw [`PathBuf`] (no normalization).
///
/// Clones share the same files.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct MemFs {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.lock().unwrap().get(path.as_ref()).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().unwrap().is_empty()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ReadFile for MemFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file not found"))
    }
}

#[cfg(any(test, feature = "test-support"))]
impl WriteFile for MemFs {
    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.insert(path, contents);
        Ok(())
    }

    fn create_private(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut files = self.files.lock().unwrap();
        if files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "file already exists",
            ));
        }
        files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let fs = MemFs::new();
        fs.write(Path::new("a.txt"), "hello").unwrap();
        assert_eq!(fs.read_to_string(Path::new("a.txt")).unwrap(), "hello");
        assert_eq!(fs.len(), 1);
    }

    #[test]
    fn paths_are_not_normalized() {
        let fs = MemFs::new();
        fs.insert("a.txt", "x");
        assert!(fs.read_to_string(Path::new("./a.txt")).is_err());
    }

    #[test]
    fn create_private_fails_when_present() {
        let fs = MemFs::new();
        fs.insert("key", "old");
        let err = fs.create_private(Path::new("key"), "new").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs.get("key").as_deref(), Some("old"));
    }

    #[test]
    fn clones_share_files() {
        let fs = MemFs::new();
        fs.clone().insert("k", "v");
        assert!(!fs.is_empty());
    }
}
