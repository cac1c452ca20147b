use crate::error::StorageError;
use std::path::{Component, Path, PathBuf};

fn traversal(key: &Path, reason: &'static str) -> StorageError {
    StorageError::PathTraversalAttempt {
        message: key.display().to_string().into(),
        context: Some(reason.into()),
    }
}

/// Collapses `.` / `..` lexically, refusing to climb above the storage path.
fn normalize_key(key: &Path) -> Result<PathBuf, StorageError> {
    let mut out = PathBuf::new();

    for component in key.components() {
        match component {
            Component::CurDir => {},
            Component::Normal(segment) => out.push(segment),
            Component::ParentDir => {
                if !out.pop() {
                    return Err(traversal(key, "Key attempted to escape the storage path via '..'"));
                }
            },
            Component::RootDir | Component::Prefix(_) => {
                return Err(traversal(key, "Absolute keys are not allowed"));
            },
        }
    }

    Ok(out)
}

/// Maps a storage key onto a physical path confined to `root`.
///
/// `root` must already be canonical. Existing targets are canonicalized (catching
/// symlinks that point outside); missing targets are validated through the deepest
/// entry that exists on their way, without following links.
pub(crate) fn resolve_key(root: &Path, key: impl AsRef<Path>) -> Result<PathBuf, StorageError> {
    let key = key.as_ref();
    let relative = normalize_key(key)?;
    if relative.as_os_str().is_empty() {
        return Err(StorageError::InvalidInput {
            message: format!("'{}' does not name a file", key.display()).into(),
            context: None,
        });
    }

    let joined = root.join(relative);
    match joined.canonicalize() {
        Ok(canonical) if canonical.starts_with(root) => Ok(canonical),
        Ok(canonical) => Err(traversal(&canonical, "Key resolves outside the storage path")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => validate_missing(root, joined),
        Err(e) => Err(StorageError::Io {
            source: e,
            context: Some(format!("Failed to resolve {}", key.display()).into()),
        }),
    }
}

/// Verifies a not-yet-existing path.
///
/// Walks from the target towards `root` with `symlink_metadata`, so a dangling link
/// (at the target itself or on the way) is seen as an entry rather than skipped.
/// The first entry found must resolve inside `root`.
fn validate_missing(root: &Path, joined: PathBuf) -> Result<PathBuf, StorageError> {
    for path in joined.ancestors() {
        if path == root {
            return Ok(joined);
        }

        match std::fs::symlink_metadata(path) {
            Ok(_) => return confine_existing(root, path).map(|()| joined),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => {
                return Err(StorageError::Io {
                    source: e,
                    context: Some(format!("Failed to inspect {}", path.display()).into()),
                });
            },
        }
    }

    Err(traversal(&joined, "No parent directory found within the storage path"))
}

fn confine_existing(root: &Path, path: &Path) -> Result<(), StorageError> {
    match path.canonicalize() {
        Ok(canonical) if canonical.starts_with(root) => Ok(()),
        Ok(canonical) => Err(traversal(&canonical, "Existing entry is a symlink outside")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(traversal(path, "Key passes through a dangling symlink"))
        },
        Err(e) => Err(StorageError::Io {
            source: e,
            context: Some(format!("Failed to verify {}", path.display()).into()),
        }),
    }
}

/// Turns a physical path under `root` back into a `/`-separated storage key.
pub(crate) fn key_of(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<_> = relative
        .components()
        .map(|c| match c {
            Component::Normal(segment) => segment.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;
    (!segments.is_empty()).then(|| segments.join("/"))
}
