//! Byte-for-byte content comparison

use crate::types::SyncError;
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::Path;

const CHUNK: usize = 64 * 1024;

/// Check whether two regular files hold identical bytes.
///
/// A missing file on either side compares unequal. Sizes are checked
/// first so differing files are usually rejected without reading.
pub fn contents_equal(a: &Path, b: &Path) -> Result<bool, SyncError> {
    let Some(meta_a) = metadata_if_exists(a)? else {
        return Ok(false);
    };
    let Some(meta_b) = metadata_if_exists(b)? else {
        return Ok(false);
    };

    if !meta_a.is_file() || !meta_b.is_file() || meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut file_a = File::open(a).map_err(|e| SyncError::from_io(a, e))?;
    let mut file_b = File::open(b).map_err(|e| SyncError::from_io(b, e))?;
    let mut buf_a = vec![0u8; CHUNK];
    let mut buf_b = vec![0u8; CHUNK];

    loop {
        let read_a = fill(&mut file_a, &mut buf_a).map_err(|e| SyncError::from_io(a, e))?;
        let read_b = fill(&mut file_b, &mut buf_b).map_err(|e| SyncError::from_io(b, e))?;

        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

fn metadata_if_exists(path: &Path) -> Result<Option<fs::Metadata>, SyncError> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::from_io(path, e)),
    }
}

/// Read until `buf` is full or EOF; returns bytes read.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_identical_files_are_equal() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let payload = vec![7u8; CHUNK * 2 + 13];
        fs::write(&a, &payload).unwrap();
        fs::write(&b, &payload).unwrap();

        assert!(contents_equal(&a, &b).unwrap());
    }

    #[test]
    fn test_same_size_different_tail() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let mut payload = vec![1u8; CHUNK + 5];
        fs::write(&a, &payload).unwrap();
        *payload.last_mut().unwrap() = 2;
        fs::write(&b, &payload).unwrap();

        assert!(!contents_equal(&a, &b).unwrap());
    }

    #[test]
    fn test_missing_side_is_unequal() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        fs::write(&a, b"hi").unwrap();

        assert!(!contents_equal(&a, &temp.path().join("missing")).unwrap());
        assert!(!contents_equal(&temp.path().join("missing"), &a).unwrap());
    }

    #[test]
    fn test_empty_files_are_equal() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, b"").unwrap();
        fs::write(&b, b"").unwrap();

        assert!(contents_equal(&a, &b).unwrap());
    }
}
