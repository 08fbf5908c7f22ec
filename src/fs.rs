//! Filesystem access used by the sync engine
//!
//! Everything the engine does to disk goes through [`FileSystem`], which keeps
//! dry runs provably read-only and lets tests substitute a mock.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::model::SchemaFile;

/// Glob selecting the files that get synced
pub const SCHEMA_FILE_PATTERN: &str = "*.proto";

/// Filesystem primitives
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Copy file content, creating the destination's parent directory
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Files below `dir` (recursively) whose base name matches `pattern`
    fn list_files(&self, dir: &Path, pattern: &str) -> io::Result<Vec<SchemaFile>>;

    /// Give the owner write permission on a single file
    fn make_writable(&self, path: &Path) -> io::Result<()>;
}

/// [`FileSystem`] backed by `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(path, data)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut source = fs::File::open(from)?;

        if let Some(parent) = to.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut destination = fs::File::create(to)?;
        io::copy(&mut source, &mut destination)?;
        destination.sync_all()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        if path.as_os_str().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_files(&self, dir: &Path, pattern: &str) -> io::Result<Vec<SchemaFile>> {
        let matcher = glob_to_regex(pattern)?;
        let mut files = Vec::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if !matcher.is_match(&name) {
                continue;
            }

            let metadata = entry.metadata()?;
            let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

            files.push(SchemaFile {
                name,
                path: entry.path().to_path_buf(),
                size: Some(metadata.len()),
                modified,
            });
        }

        debug!("Found {} file(s) matching {} in {}", files.len(), pattern, dir.display());
        Ok(files)
    }

    fn make_writable(&self, path: &Path) -> io::Result<()> {
        let mut permissions = fs::metadata(path)?.permissions();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            permissions.set_mode(permissions.mode() | 0o200);
        }

        #[cfg(not(unix))]
        {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
        }

        fs::set_permissions(path, permissions)
    }
}

/// Translate a file-name glob (`*`, `?`) into an anchored regex
fn glob_to_regex(pattern: &str) -> io::Result<Regex> {
    let translated = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");

    Regex::new(&format!("^{}$", translated))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}
