//! Iterative pairing walk over two directory trees

use std::cmp::Ordering;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Walk two corresponding directories and return every pairing below them.
///
/// Each side's immediate subdirectory names are sorted and merge-joined.
/// A name present on only one side is paired against the same name on the
/// other side even though it does not exist there yet; listing a missing
/// directory yields nothing, so such a pairing ends as a leaf.
///
/// The first returned pair is always `(left, right)`.
pub fn collect_pairs(left: &Path, right: &Path) -> Vec<(PathBuf, PathBuf)> {
    let mut pairs = Vec::new();
    let mut worklist = vec![(left.to_path_buf(), right.to_path_buf())];

    while let Some((l, r)) = worklist.pop() {
        let left_names = subdir_names(&l);
        let right_names = subdir_names(&r);

        // Reverse so the stack pops names in ascending order
        for name in merge_join(&left_names, &right_names).into_iter().rev() {
            worklist.push((l.join(&name), r.join(&name)));
        }
        pairs.push((l, r));
    }

    pairs
}

/// Sorted merge-join of two sorted name lists.
///
/// Equal names are emitted once and advance both lists; otherwise the
/// smaller name is emitted and only its list advances. Leftovers of either
/// list are emitted as-is.
pub fn merge_join(left: &[OsString], right: &[OsString]) -> Vec<OsString> {
    let mut joined = Vec::with_capacity(left.len().max(right.len()));
    let (mut i, mut j) = (0, 0);

    while i < left.len() && j < right.len() {
        match left[i].cmp(&right[j]) {
            Ordering::Equal => {
                joined.push(left[i].clone());
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                joined.push(left[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                joined.push(right[j].clone());
                j += 1;
            }
        }
    }

    joined.extend_from_slice(&left[i..]);
    joined.extend_from_slice(&right[j..]);
    joined
}

/// Sorted names of the immediate subdirectories of `dir`.
///
/// Symlinks are not followed. A missing directory has no subdirectories;
/// other listing errors are logged and treated the same way.
pub fn subdir_names(dir: &Path) -> Vec<OsString> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("Failed to list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut names: Vec<OsString> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => entry
                .file_type()
                .ok()
                .filter(|ft| ft.is_dir())
                .map(|_| entry.file_name()),
            Err(e) => {
                warn!("Failed to read entry in {}: {}", dir.display(), e);
                None
            }
        })
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_merge_join_interleaves_and_dedups() {
        let joined = merge_join(&names(&["a", "c", "d"]), &names(&["b", "c", "e", "f"]));
        assert_eq!(joined, names(&["a", "b", "c", "d", "e", "f"]));
    }

    #[test]
    fn test_merge_join_with_empty_side() {
        assert_eq!(merge_join(&names(&["x", "y"]), &[]), names(&["x", "y"]));
        assert_eq!(merge_join(&[], &names(&["z"])), names(&["z"]));
    }

    #[test]
    fn test_subdir_names_skips_files_and_sorts() {
        let temp = TempDir::new().expect("create tempdir");
        fs::create_dir(temp.path().join("zeta")).expect("mkdir zeta");
        fs::create_dir(temp.path().join("alpha")).expect("mkdir alpha");
        fs::write(temp.path().join("file.txt"), b"x").expect("write file");

        assert_eq!(subdir_names(temp.path()), names(&["alpha", "zeta"]));
    }

    #[test]
    fn test_subdir_names_missing_dir_is_empty() {
        let temp = TempDir::new().expect("create tempdir");
        assert!(subdir_names(&temp.path().join("missing")).is_empty());
    }

    #[test]
    fn test_collect_pairs_includes_speculative_leaves() {
        let left = TempDir::new().expect("create left");
        let right = TempDir::new().expect("create right");
        fs::create_dir_all(left.path().join("shared/inner")).expect("mkdir left shared");
        fs::create_dir_all(right.path().join("shared")).expect("mkdir right shared");
        fs::create_dir_all(left.path().join("only_left/deep")).expect("mkdir only_left");
        fs::create_dir_all(right.path().join("only_right")).expect("mkdir only_right");

        let pairs = collect_pairs(left.path(), right.path());
        let rel: Vec<PathBuf> = pairs
            .iter()
            .map(|(l, r)| {
                let rel = l.strip_prefix(left.path()).expect("left prefix");
                assert_eq!(r.strip_prefix(right.path()).expect("right prefix"), rel);
                rel.to_path_buf()
            })
            .collect();

        assert_eq!(pairs[0], (left.path().to_path_buf(), right.path().to_path_buf()));
        for expected in ["shared", "shared/inner", "only_left", "only_left/deep", "only_right"] {
            assert!(rel.contains(&PathBuf::from(expected)), "missing pairing {expected}");
        }
        assert_eq!(rel.len(), 6);
    }
}
