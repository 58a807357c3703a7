//! Filesystem contract used by the scanner, executor and backup manager

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Filesystem failures; "already absent" is kept apart from permission problems
#[derive(Error, Debug)]
pub enum FsError {
    #[error("Path not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Classify an IO error raised while touching `path`
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => FsError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    fn from_walkdir(root: &Path, err: walkdir::Error) -> Self {
        let path = err.path().unwrap_or(root).to_path_buf();
        match err.into_io_error() {
            Some(io_err) => Self::from_io(&path, io_err),
            None => FsError::Io {
                path,
                source: io::Error::other("filesystem loop detected"),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, FsError::PermissionDenied { .. })
    }
}

/// Filesystem operations needed for removal and backup
pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Direct children of a directory, sorted
    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, FsError>;

    /// Remove a file or a directory tree
    fn remove_all(&self, path: &Path) -> Result<(), FsError>;

    /// Copy a file or directory tree; returns bytes copied
    fn copy_recursive(&self, src: &Path, dst: &Path) -> Result<u64, FsError>;

    /// Total size of a file or directory tree
    fn size_of(&self, path: &Path) -> Result<u64, FsError>;
}

/// Filesystem backed by `std::fs` and `walkdir`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for LocalFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, FsError> {
        let mut entries = fs::read_dir(path)
            .map_err(|e| FsError::from_io(path, e))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FsError::from_io(path, e))?;
        entries.sort();
        Ok(entries)
    }

    fn remove_all(&self, path: &Path) -> Result<(), FsError> {
        let meta = path
            .symlink_metadata()
            .map_err(|e| FsError::from_io(path, e))?;
        let result = if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| FsError::from_io(path, e))
    }

    fn copy_recursive(&self, src: &Path, dst: &Path) -> Result<u64, FsError> {
        let meta = src.metadata().map_err(|e| FsError::from_io(src, e))?;
        if meta.is_file() {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent).map_err(|e| FsError::from_io(parent, e))?;
            }
            return fs::copy(src, dst).map_err(|e| FsError::from_io(src, e));
        }

        let mut copied = 0;
        for entry in WalkDir::new(src) {
            let entry = entry.map_err(|e| FsError::from_walkdir(src, e))?;
            let Ok(relative) = entry.path().strip_prefix(src) else {
                continue;
            };
            let target = dst.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|e| FsError::from_io(&target, e))?;
            } else if entry.file_type().is_file() {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| FsError::from_io(parent, e))?;
                }
                copied += fs::copy(entry.path(), &target)
                    .map_err(|e| FsError::from_io(entry.path(), e))?;
            }
        }
        Ok(copied)
    }

    fn size_of(&self, path: &Path) -> Result<u64, FsError> {
        let meta = path.metadata().map_err(|e| FsError::from_io(path, e))?;
        if meta.is_file() {
            return Ok(meta.len());
        }
        let mut total = 0;
        for entry in WalkDir::new(path) {
            let entry = entry.map_err(|e| FsError::from_walkdir(path, e))?;
            if entry.file_type().is_file() {
                total += entry
                    .metadata()
                    .map_err(|e| FsError::from_walkdir(path, e))?
                    .len();
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("data");
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("a.txt"), "hello").unwrap();
        fs::write(root.join("nested/b.txt"), "world!").unwrap();
        temp
    }

    #[test]
    fn test_size_and_list() {
        let temp = fixture();
        let fs_impl = LocalFilesystem::new();
        let root = temp.path().join("data");

        assert_eq!(fs_impl.size_of(&root).unwrap(), 11);
        assert_eq!(fs_impl.size_of(&root.join("a.txt")).unwrap(), 5);
        let entries = fs_impl.list_dir(&root).unwrap();
        assert_eq!(entries, vec![root.join("a.txt"), root.join("nested")]);
    }

    #[test]
    fn test_copy_recursive() {
        let temp = fixture();
        let fs_impl = LocalFilesystem::new();
        let dst = temp.path().join("copy");

        let bytes = fs_impl
            .copy_recursive(&temp.path().join("data"), &dst)
            .unwrap();
        assert_eq!(bytes, 11);
        assert_eq!(
            fs::read_to_string(dst.join("nested/b.txt")).unwrap(),
            "world!"
        );
    }

    #[test]
    fn test_remove_all_and_not_found() {
        let temp = fixture();
        let fs_impl = LocalFilesystem::new();
        let root = temp.path().join("data");

        fs_impl.remove_all(&root).unwrap();
        assert!(!fs_impl.exists(&root));

        let err = fs_impl.remove_all(&root).unwrap_err();
        assert!(err.is_not_found());
        assert!(fs_impl.size_of(&root).unwrap_err().is_not_found());
    }

    #[test]
    fn test_io_error_classification() {
        let path = Path::new("/x");
        assert!(FsError::from_io(path, io::Error::from(io::ErrorKind::PermissionDenied))
            .is_permission_denied());
        assert!(matches!(
            FsError::from_io(path, io::Error::other("boom")),
            FsError::Io { .. }
        ));
    }
}
