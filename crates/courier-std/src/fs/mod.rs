//! Filesystem access used for key material and other small text files.
//!
//! ```
//! use courier_std::fs::{ReadFile, SystemFs};
//! use std::path::Path;
//!
//! fn read_or_empty<F: ReadFile>(fs: &F, path: &Path) -> String {
//!     fs.read_to_string(path).unwrap_or_default()
//! }
//!
//! let contents = read_or_empty(&SystemFs, Path::new("/nonexistent/courier.key"));
//! assert!(contents.is_empty());
//! ```

mod mem;
mod system;

use std::io;
use std::path::Path;

#[cfg(any(test, feature = "test-support"))]
pub use mem::MemFs;
pub use system::SystemFs;

pub trait ReadFile {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

pub trait WriteFile {
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Write a file only the current user can read (mode `0600` on Unix).
    ///
    /// Fails with [`io::ErrorKind::AlreadyExists`] instead of overwriting.
    fn create_private(&self, path: &Path, contents: &str) -> io::Result<()>;
}
