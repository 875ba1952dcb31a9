//! Atomic file copy implementation

use crate::types::SyncError;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Suffix of the hidden temporary file written next to each target.
///
/// Entries carrying it are never mirrored.
pub const PART_SUFFIX: &str = "twinsync-part";

/// Which source attributes travel with the bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Permissions and mtime copied from the source (Create)
    WithAttributes,

    /// Bytes only; an existing target keeps its permissions (Modify)
    ContentOnly,
}

/// Temporary path used while writing `dest`: `dir/.name.twinsync-part`
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    if let Some(file_name) = dest.file_name() {
        name.push(file_name);
    }
    name.push(".");
    name.push(PART_SUFFIX);
    dest.with_file_name(name)
}

/// Copy a file atomically using the write-then-rename strategy
///
/// 1. Write to a hidden temporary file in the target directory
/// 2. Flush and sync to disk
/// 3. Apply attributes according to `mode`
/// 4. Rename over the final destination
///
/// The target is never truncated in place; on failure the temporary file
/// is removed and the previous target content stays intact.
///
/// # Returns
/// * `Ok(u64)` - Number of bytes copied
/// * `Err(SyncError)` - IO error or other failure
///
/// # Example
/// ```no_run
/// use twinsync::executor::{copy_file_atomic, CopyMode};
/// use std::path::Path;
///
/// let bytes = copy_file_atomic(
///     Path::new("a/report.txt"),
///     Path::new("b/report.txt"),
///     CopyMode::WithAttributes,
/// )?;
/// # Ok::<(), twinsync::SyncError>(())
/// ```
pub fn copy_file_atomic(src: &Path, dest: &Path, mode: CopyMode) -> Result<u64, SyncError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| SyncError::from_io(parent, e))?;
    }

    let part = part_path(dest);
    let result = write_part(src, dest, &part, mode);
    if result.is_err() {
        let _ = fs::remove_file(&part);
    }
    result
}

fn write_part(src: &Path, dest: &Path, part: &Path, mode: CopyMode) -> Result<u64, SyncError> {
    let mut src_file = File::open(src).map_err(|e| SyncError::from_io(src, e))?;
    let mut part_file = File::create(part).map_err(|e| SyncError::from_io(part, e))?;

    let mut buffer = vec![0u8; 128 * 1024];
    let mut total_bytes = 0u64;

    loop {
        let bytes_read = src_file
            .read(&mut buffer)
            .map_err(|e| SyncError::from_io(src, e))?;

        if bytes_read == 0 {
            break;
        }

        part_file
            .write_all(&buffer[0..bytes_read])
            .map_err(|e| SyncError::from_io(part, e))?;
        total_bytes += bytes_read as u64;
    }

    part_file.sync_all().map_err(|e| SyncError::from_io(part, e))?;

    // Drop the file handle before rename (required on Windows)
    drop(part_file);

    match mode {
        CopyMode::WithAttributes => {
            let src_metadata = fs::metadata(src).map_err(|e| SyncError::from_io(src, e))?;
            fs::set_permissions(part, src_metadata.permissions())
                .map_err(|e| SyncError::from_io(part, e))?;

            let mtime = src_metadata.modified().map_err(SyncError::Io)?;
            filetime::set_file_mtime(part, filetime::FileTime::from_system_time(mtime))
                .map_err(|e| SyncError::from_io(part, e))?;
        }
        CopyMode::ContentOnly => {
            if let Ok(dest_metadata) = fs::metadata(dest) {
                fs::set_permissions(part, dest_metadata.permissions())
                    .map_err(|e| SyncError::from_io(part, e))?;
            }
        }
    }

    fs::rename(part, dest).map_err(|e| SyncError::from_io(dest, e))?;

    Ok(total_bytes)
}
