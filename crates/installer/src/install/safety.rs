//! Extraction tree validation
//!
//! Every entry under an extraction root must resolve, with symlinks followed,
//! to a path inside that root. One bad entry rejects the whole extraction.

use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::downloader::core::{DownloadError, FileOperation, Result};

/// Walk `root` and reject the tree if any entry escapes it
///
/// Returns the number of entries vetted.
pub fn validate_extraction_root(root: &Path) -> Result<usize> {
    let canonical_root = root
        .canonicalize()
        .map_err(|e| DownloadError::fs(root, FileOperation::Metadata, e))?;

    let mut checked = 0usize;
    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| DownloadError::PathSafetyViolation {
            entry: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
            reason: format!("entry could not be inspected: {}", e),
        })?;
        let path = entry.path();

        let relative = path.strip_prefix(root).map_err(|_| violation(path, "entry is not under the extraction root"))?;
        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(violation(path, "entry path contains traversal components"));
        }

        if entry.path_is_symlink() {
            check_symlink(path, &canonical_root)?;
        } else {
            let resolved = path
                .canonicalize()
                .map_err(|e| DownloadError::fs(path, FileOperation::Metadata, e))?;
            if !resolved.starts_with(&canonical_root) {
                return Err(violation(path, "entry resolves outside the extraction root"));
            }
        }

        checked += 1;
    }

    debug!("Validated {} entries under {}", checked, root.display());
    Ok(checked)
}

/// A symlink is safe only if both its literal target and its fully resolved
/// target stay inside the root
fn check_symlink(link: &Path, canonical_root: &Path) -> Result<()> {
    let target = std::fs::read_link(link).map_err(|e| DownloadError::fs(link, FileOperation::Read, e))?;

    let parent = link
        .parent()
        .and_then(|p| p.canonicalize().ok())
        .ok_or_else(|| violation(link, "symlink parent cannot be resolved"))?;
    let literal = normalize_lexically(&parent.join(&target));
    if !literal.starts_with(canonical_root) {
        return Err(violation(
            link,
            &format!("symlink points outside the extraction root ({})", target.display()),
        ));
    }

    // Dangling links are judged on their literal target alone.
    if let Ok(resolved) = link.canonicalize() {
        if !resolved.starts_with(canonical_root) {
            return Err(violation(
                link,
                &format!("symlink chain resolves outside the extraction root ({})", resolved.display()),
            ));
        }
    }

    Ok(())
}

/// Resolve `.` and `..` without touching the file system
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn violation(entry: &Path, reason: &str) -> DownloadError {
    DownloadError::PathSafetyViolation {
        entry: entry.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn plain_tree_passes() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/mod.otr"), b"x").unwrap();
        std::fs::write(dir.path().join("top.o2r"), b"x").unwrap();

        assert_eq!(validate_extraction_root(dir.path()).unwrap(), 4);
    }

    #[test]
    fn lexical_normalization_collapses_parent_components() {
        assert_eq!(
            normalize_lexically(Path::new("/root/x/./y/../../evil")),
            PathBuf::from("/root/evil")
        );
        assert_eq!(normalize_lexically(Path::new("/a/../../..")), PathBuf::from("/"));
    }

    #[cfg(unix)]
    mod symlinks {
        use super::*;
        use std::os::unix::fs::symlink;

        #[test]
        fn absolute_symlink_outside_root_is_rejected() {
            let outside = tempdir().unwrap();
            std::fs::write(outside.path().join("secret"), b"s").unwrap();
            let root = tempdir().unwrap();
            symlink(outside.path().join("secret"), root.path().join("mod.otr")).unwrap();

            let err = validate_extraction_root(root.path()).unwrap_err();
            assert!(matches!(err, DownloadError::PathSafetyViolation { .. }));
        }

        #[test]
        fn relative_symlink_climbing_out_is_rejected() {
            let root = tempdir().unwrap();
            std::fs::create_dir(root.path().join("inner")).unwrap();
            symlink("../../../../etc/passwd", root.path().join("inner/mod.otr")).unwrap();

            let err = validate_extraction_root(root.path()).unwrap_err();
            assert!(err.is_security_violation());
        }

        #[test]
        fn dangling_symlink_outside_is_rejected() {
            let root = tempdir().unwrap();
            symlink("/nonexistent/elsewhere", root.path().join("ghost.otr")).unwrap();

            assert!(validate_extraction_root(root.path()).is_err());
        }

        #[test]
        fn directory_symlink_to_outside_is_rejected() {
            let outside = tempdir().unwrap();
            std::fs::write(outside.path().join("mod.otr"), b"x").unwrap();
            let root = tempdir().unwrap();
            symlink(outside.path(), root.path().join("linked")).unwrap();

            assert!(validate_extraction_root(root.path()).is_err());
        }

        #[test]
        fn symlink_inside_root_is_accepted() {
            let root = tempdir().unwrap();
            std::fs::create_dir(root.path().join("data")).unwrap();
            std::fs::write(root.path().join("data/real.otr"), b"x").unwrap();
            symlink("data/real.otr", root.path().join("alias.otr")).unwrap();

            assert!(validate_extraction_root(root.path()).is_ok());
        }
    }
}
