//! Whole-file writes that never leave a truncated destination.
//!
//! Every helper writes into a temporary file in the destination's own
//! directory (same filesystem), fsyncs it, then renames it over the target.
//! Readers observe either the old bytes or the new bytes.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Directory that will hold the temporary file for `path`.
///
/// `Path::parent` yields an empty path for bare filenames, which is not a
/// usable directory for `tempfile`.
pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Atomic file write: tempfile + fsync + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut temp = tempfile::NamedTempFile::new_in(parent_dir(path))?;

    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Atomic file copy: stream `src` into a tempfile beside `dst`, fsync,
/// carry over the source permissions and modification time, rename.
///
/// Returns the number of bytes copied.
pub fn atomic_copy(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut source = File::open(src)?;
    let metadata = source.metadata()?;

    let mut temp = tempfile::NamedTempFile::new_in(parent_dir(dst))?;
    let copied = io::copy(&mut source, temp.as_file_mut())?;

    if copied != metadata.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "copied {copied} bytes from {}, expected {}",
                src.display(),
                metadata.len()
            ),
        ));
    }

    temp.as_file().sync_all()?;

    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(temp.path(), mtime)?;
    fs::set_permissions(temp.path(), metadata.permissions())?;

    temp.persist(dst).map_err(|e| e.error)?;
    Ok(copied)
}

/// Remove `path` if it exists; a missing file is not an error.
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
