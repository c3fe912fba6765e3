//! Confined directory snapshot transfer.
//!
//! A snapshot serializes a subtree of the filesystem into a nested structure
//! of directories and raw file payloads, so it can be carried across a
//! session as a single payload and materialized on the other side.
//!
//! Both directions are confined to a root directory. Every path visited
//! during a walk, including every descendant, must resolve to a descendant
//! of the confining root; any violation fails the whole request with the
//! single non-descriptive error `access denied`. The error is identical for
//! nonexistent paths, traversal attempts and symlinked escapes so that
//! nothing about the host filesystem is leaked to the remote end.
//!
//! Entries that are neither regular files nor directories (symlinks, pipes,
//! sockets) are skipped during serialization, not reported.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors from snapshot serialization and materialization.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The request touched a path outside the confinement root, or a path
    /// that could not be resolved at all. Deliberately carries no detail.
    #[error("access denied")]
    AccessDenied,

    /// An I/O failure on a path that already passed containment.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// One node of a directory snapshot: either a file's raw bytes or a nested
/// directory keyed by entry name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirEntry {
    /// A regular file's contents, base64-encoded on the wire.
    File {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
    },
    /// A directory and its named children.
    Dir { entries: BTreeMap<String, DirEntry> },
}

impl DirEntry {
    /// Creates an empty directory node.
    pub fn empty_dir() -> Self {
        DirEntry::Dir {
            entries: BTreeMap::new(),
        }
    }

    /// Creates a file node from raw bytes.
    pub fn file(bytes: impl Into<Vec<u8>>) -> Self {
        DirEntry::File {
            bytes: bytes.into(),
        }
    }
}

/// Serializes the subtree at `path` into a snapshot, confined to `root`.
///
/// `path` is resolved and checked against `root` before the walk, and every
/// descendant is re-checked during the walk to defend against renames or
/// symlinks introduced after the initial check.
pub fn snapshot_directory(path: &Path, root: &Path) -> Result<DirEntry, SnapshotError> {
    let root = fs::canonicalize(root).map_err(|_| SnapshotError::AccessDenied)?;
    let target = check_access(path, &root)?;
    if !target.is_dir() {
        return Err(SnapshotError::AccessDenied);
    }
    walk_directory(&target, &root)
}

fn walk_directory(dir: &Path, root: &Path) -> Result<DirEntry, SnapshotError> {
    let mut entries = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if file_type.is_symlink() {
            // Neither a regular file nor a directory: skipped, not an error.
            continue;
        }
        let resolved = check_access(&entry.path(), root)?;
        if file_type.is_dir() {
            entries.insert(name, walk_directory(&resolved, root)?);
        } else if file_type.is_file() {
            entries.insert(name, DirEntry::file(fs::read(&resolved)?));
        }
        // Anything else (pipes, sockets, devices) is skipped.
    }
    Ok(DirEntry::Dir { entries })
}

/// Materializes a snapshot under `dest`, confined to `root`.
///
/// Directories are created as needed and files overwritten. Entry names
/// containing path separators or `..` fail the whole request the same way a
/// containment escape does.
pub fn write_snapshot(entry: &DirEntry, dest: &Path, root: &Path) -> Result<(), SnapshotError> {
    let canonical_root = fs::canonicalize(root).map_err(|_| SnapshotError::AccessDenied)?;
    // The destination does not exist yet, so the first check is lexical
    // against the root as given; resolved checks follow once it does.
    if !is_lexical_descendant(dest, root) {
        return Err(SnapshotError::AccessDenied);
    }
    write_entry(entry, dest, &canonical_root)
}

fn write_entry(entry: &DirEntry, dest: &Path, root: &Path) -> Result<(), SnapshotError> {
    match entry {
        DirEntry::File { bytes } => {
            fs::write(dest, bytes)?;
        }
        DirEntry::Dir { entries } => {
            fs::create_dir_all(dest)?;
            // The created directory must still resolve inside the root.
            let resolved = check_access(dest, root)?;
            for (name, child) in entries {
                if !is_plain_name(name) {
                    return Err(SnapshotError::AccessDenied);
                }
                write_entry(child, &resolved.join(name), root)?;
            }
        }
    }
    Ok(())
}

/// Resolves `path` and verifies it is a descendant of `root`.
///
/// The last defense against handing the remote end access to arbitrary host
/// files; kept deliberately strict and deliberately quiet about why a path
/// was refused.
fn check_access(path: &Path, root: &Path) -> Result<PathBuf, SnapshotError> {
    let resolved = fs::canonicalize(path).map_err(|_| SnapshotError::AccessDenied)?;
    if resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(SnapshotError::AccessDenied)
    }
}

fn is_lexical_descendant(path: &Path, root: &Path) -> bool {
    if !path.starts_with(root) {
        return false;
    }
    path.components()
        .all(|c| !matches!(c, Component::ParentDir))
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir(root.join("world")).unwrap();
        fs::write(root.join("world/level.dat"), b"level-bytes").unwrap();
        fs::create_dir(root.join("world/region")).unwrap();
        fs::write(root.join("world/region/r.0.0.mca"), b"region-bytes").unwrap();
        fs::write(root.join("server.properties"), b"motd=hi").unwrap();
        dir
    }

    #[test]
    fn snapshot_captures_nested_tree() {
        let dir = fixture();
        let snap = snapshot_directory(dir.path(), dir.path()).expect("snapshot");
        let DirEntry::Dir { entries } = snap else {
            panic!("expected directory root");
        };
        assert!(entries.contains_key("server.properties"));
        let DirEntry::Dir {
            entries: world_entries,
        } = &entries["world"]
        else {
            panic!("expected world dir");
        };
        assert_eq!(
            world_entries["level.dat"],
            DirEntry::file(b"level-bytes".to_vec())
        );
    }

    #[test]
    fn snapshot_of_subdirectory_is_confined_view() {
        let dir = fixture();
        let snap = snapshot_directory(&dir.path().join("world"), dir.path()).expect("snapshot");
        let DirEntry::Dir { entries } = snap else {
            panic!("expected directory root");
        };
        assert!(entries.contains_key("level.dat"));
        assert!(!entries.contains_key("server.properties"));
    }

    #[test]
    fn escape_attempts_all_fail_identically() {
        let dir = fixture();
        let root = dir.path();

        // Traversal outside the root.
        let traversal = snapshot_directory(&root.join("world/../../etc"), root).unwrap_err();
        // A nonexistent path.
        let missing = snapshot_directory(&root.join("no-such-dir"), root).unwrap_err();
        // An absolute path far outside the root.
        let absolute = snapshot_directory(Path::new("/"), root).unwrap_err();

        // Identical message for every cause; existence must not leak.
        assert_eq!(traversal.to_string(), "access denied");
        assert_eq!(missing.to_string(), "access denied");
        assert_eq!(absolute.to_string(), "access denied");
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped_not_followed() {
        let dir = fixture();
        let root = dir.path();
        std::os::unix::fs::symlink("/etc", root.join("sneaky")).unwrap();
        let snap = snapshot_directory(root, root).expect("snapshot");
        let DirEntry::Dir { entries } = snap else {
            panic!("expected directory root");
        };
        assert!(!entries.contains_key("sneaky"));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let dir = fixture();
        let snap = snapshot_directory(dir.path(), dir.path()).expect("snapshot");
        let encoded = serde_json::to_string(&snap).expect("encode");
        let decoded: DirEntry = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(snap, decoded);
    }

    #[test]
    fn write_snapshot_materializes_tree() {
        let src = fixture();
        let snap = snapshot_directory(src.path(), src.path()).expect("snapshot");

        let dst = tempfile::tempdir().expect("tempdir");
        let target = dst.path().join("restored");
        write_snapshot(&snap, &target, dst.path()).expect("write");
        assert_eq!(
            fs::read(target.join("world/level.dat")).unwrap(),
            b"level-bytes"
        );
        assert_eq!(
            fs::read(target.join("server.properties")).unwrap(),
            b"motd=hi"
        );
    }

    #[test]
    fn write_snapshot_rejects_escaping_names() {
        let dst = tempfile::tempdir().expect("tempdir");
        let mut entries = BTreeMap::new();
        entries.insert("../evil".to_string(), DirEntry::file(b"x".to_vec()));
        let snap = DirEntry::Dir { entries };
        let err = write_snapshot(&snap, &dst.path().join("out"), dst.path()).unwrap_err();
        assert_eq!(err.to_string(), "access denied");

        let err = write_snapshot(
            &DirEntry::empty_dir(),
            Path::new("/somewhere/else"),
            dst.path(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "access denied");
    }
}
