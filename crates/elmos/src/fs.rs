//! Filesystem seam. Builders only touch the disk through [`FileSystem`] so
//! tests can point them at scratch trees.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    /// True for a symlink itself, dangling or not.
    fn is_symlink(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;
    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()>;
    fn mkdir_all(&self, path: &Path) -> Result<()>;
    /// Entries sorted by name.
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;
    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| Error::config_io(path, e))
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.mkdir_all(parent)?;
        }
        fs::write(path, data).map_err(|e| Error::config_io(path, e))
    }

    fn mkdir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", path.display())))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let rd = fs::read_dir(path)
            .map_err(|e| Error::msg(format!("failed to read dir {}: {e}", path.display())))?;
        let mut out = Vec::new();
        for entry in rd {
            let entry = entry?;
            let path = entry.path();
            out.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: path.is_dir(),
                path,
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        std::os::unix::fs::symlink(target, link).map_err(|e| {
            Error::msg(format!(
                "failed to symlink {} -> {}: {e}",
                link.display(),
                target.display()
            ))
        })
    }

    #[cfg(not(unix))]
    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        Err(Error::msg(format!(
            "symlinks not supported on this platform: {} -> {}",
            link.display(),
            target.display()
        )))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .map_err(|e| Error::msg(format!("failed to remove {}: {e}", path.display())))
    }
}
