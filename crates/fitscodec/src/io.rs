//! Whole-buffer file access.
//!
//! The codec works on byte buffers; this module moves them to and from disk.
//! Writes are staged in a temporary file next to the destination and renamed
//! into place, so a failed write never leaves a partial file behind.

use std::fs;
use std::io::Write;
use std::path::Path;

use log::debug;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Read the whole file at `path`.
pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let bytes = fs::read(path.as_ref())?;
    debug!("read {} bytes from {}", bytes.len(), path.as_ref().display());
    Ok(bytes)
}

/// Write `bytes` to `path` atomically.
///
/// Fails with [`Error::FileExists`] when `path` exists and `overwrite` is
/// false.
pub fn write_all<P: AsRef<Path>>(path: P, bytes: &[u8], overwrite: bool) -> Result<()> {
    let path = path.as_ref();
    if !overwrite && path.exists() {
        return Err(Error::FileExists(path.to_path_buf()));
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    if overwrite {
        staged.persist(path).map_err(|e| e.error)?;
    } else {
        staged.persist_noclobber(path).map_err(|e| match e.error.kind() {
            std::io::ErrorKind::AlreadyExists => Error::FileExists(path.to_path_buf()),
            _ => Error::Io(e.error),
        })?;
    }
    debug!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.fits");
        write_all(&path, b"hello", false).unwrap();
        assert_eq!(read_all(&path).unwrap(), b"hello");
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.fits");
        write_all(&path, b"one", false).unwrap();
        let err = write_all(&path, b"two", false).unwrap_err();
        assert!(matches!(err, Error::FileExists(_)));
        assert_eq!(read_all(&path).unwrap(), b"one");

        write_all(&path, b"two", true).unwrap();
        assert_eq!(read_all(&path).unwrap(), b"two");
    }

    #[test]
    fn no_stray_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.fits");
        write_all(&path, b"x", false).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_all(dir.path().join("nope.fits")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
