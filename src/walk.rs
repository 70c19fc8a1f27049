//! Deterministic file ordering for archive input.
//!
//! Archive bytes depend on entry order, so the order must not depend on the
//! filesystem or platform: names use `/` separators and are sorted by their
//! case-folded form, with the exact name breaking ties.

use std::io::{Error, ErrorKind, Result};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

/// A file to add, with its archive name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub path: PathBuf,
}

/// Recursively collect regular files under `root` in archive order.
///
/// `root` must be a directory. Any traversal error aborts the walk.
pub fn collect_files(root: &Path) -> Result<Vec<SourceFile>> {
    if !std::fs::metadata(root)?.is_dir() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("{root:?} is not a directory"),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::other(format!("{:?} is outside {:?}", entry.path(), root)))?;
        let name = archive_name(relative)?;
        trace!(%name, "found file");
        files.push(SourceFile {
            name,
            path: entry.into_path(),
        });
    }

    sort_for_archive(&mut files);
    debug!(count = files.len(), root = ?root, "collected files");
    Ok(files)
}

/// Sort by case-folded name, then by exact name.
pub fn sort_for_archive(files: &mut [SourceFile]) {
    files.sort_by_cached_key(|file| (file.name.to_lowercase(), file.name.clone()));
}

/// Join the normal components of `relative` with `/`.
fn archive_name(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            let part = part.to_str().ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidData,
                    format!("file name {relative:?} is not valid UTF-8"),
                )
            })?;
            parts.push(part);
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn case_insensitive_order_with_forward_slashes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Sub/inner")).unwrap();
        fs::create_dir(root.join("empty")).unwrap();
        for name in ["b.txt", "A.txt", "a.txt", "Sub/Z.bin", "Sub/inner/y", "c"] {
            fs::write(root.join(name), name).unwrap();
        }

        let files = collect_files(root).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            ["A.txt", "a.txt", "b.txt", "c", "Sub/inner/y", "Sub/Z.bin"]
        );
        assert_eq!(files[4].path, root.join("Sub").join("inner").join("y"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_files(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn file_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("single.txt");
        fs::write(&file, "x").unwrap();

        let err = collect_files(&file).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
