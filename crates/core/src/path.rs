//! Entry path validation for MemVault
//!
//! Entry paths are `/`-separated strings relative to the entries root.
//! They name a document inside exactly one shard namespace.
//!
//! ## Rules
//!
//! - Paths must not be empty
//! - Paths must not contain NUL bytes
//! - Paths must be relative (no leading `/`, no drive prefix)
//! - Paths must not contain `..` components
//! - Paths must not fall inside a reserved system/plugin namespace
//! - File names must not collide with shard files, split manifests or
//!   split parts kept alongside documents
//!
//! Backslashes are treated as separators, and empty or `.` components are
//! dropped, so `notes//./a.md` and `notes\a.md` both canonicalize to `notes/a.md`.

use crate::error::ValidationError;
use crate::index::ROOT_INDEX_FILE;
use crate::manifest::SPLIT_MANIFEST_FILE;

/// Directory (relative to the data directory) holding all entries
pub const ENTRIES_ROOT: &str = "entries";

/// Canonicalize and validate an entry path
///
/// Returns the canonical form: components joined by `/`, no leading or
/// trailing separator.
///
/// # Examples
///
/// ```
/// use memvault_core::path::canonicalize_entry_path;
///
/// assert_eq!(canonicalize_entry_path("notes/./a.md").unwrap(), "notes/a.md");
/// assert!(canonicalize_entry_path("../secrets").is_err());
/// assert!(canonicalize_entry_path("/etc/passwd").is_err());
/// ```
pub fn canonicalize_entry_path(path: &str) -> Result<String, ValidationError> {
    if path.is_empty() {
        return Err(ValidationError::EmptyPath);
    }

    if path.contains('\x00') {
        return Err(ValidationError::ContainsNul);
    }

    let normalized = path.replace('\\', "/");
    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(ValidationError::AbsolutePath(path.to_string()));
    }

    let mut components = Vec::new();
    for component in normalized.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(ValidationError::Traversal(path.to_string())),
            other => components.push(other),
        }
    }

    if components.is_empty() {
        return Err(ValidationError::EmptyPath);
    }

    Ok(components.join("/"))
}

/// Canonicalize a path and reject it if it lies in a reserved namespace
/// or names a file the store manages itself
pub fn validate_entry_path(path: &str, reserved: &[String]) -> Result<String, ValidationError> {
    let canonical = canonicalize_entry_path(path)?;
    if is_reserved_file_name(file_name(&canonical)) {
        return Err(ValidationError::ReservedFileName(canonical));
    }
    for namespace in reserved {
        if in_namespace(&canonical, namespace) {
            return Err(ValidationError::ReservedNamespace {
                path: canonical,
                namespace: namespace.clone(),
            });
        }
    }
    Ok(canonical)
}

/// Whether `name` is kept next to documents by the store itself
///
/// Shard primaries (`index.json`), split manifests (`memory_index.json`) and
/// anything shaped like a part (`index.part2.json`, `doc.part1.md`).
pub fn is_reserved_file_name(name: &str) -> bool {
    if name == ROOT_INDEX_FILE || name == SPLIT_MANIFEST_FILE {
        return true;
    }
    let (stem, _) = split_extension(name);
    has_part_suffix(stem) || has_part_suffix(name)
}

fn has_part_suffix(name: &str) -> bool {
    match name.rfind(".part") {
        Some(idx) => {
            let digits = &name[idx + ".part".len()..];
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Whether `path` lies inside `namespace`
///
/// A namespace is a directory prefix. `notes` and `notes/` are equivalent,
/// and `notes-old/a.md` is not inside `notes`.
pub fn in_namespace(path: &str, namespace: &str) -> bool {
    let ns = namespace.trim_matches('/');
    if ns.is_empty() {
        return true;
    }
    path.len() > ns.len() && path.starts_with(ns) && path.as_bytes()[ns.len()] == b'/'
}

/// Parent directory of a path, or `""` at the top level
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Final component of a path
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Split a file name into stem and extension (extension includes the dot)
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => (&name[..idx], &name[idx..]),
    }
}

/// Join a directory and a relative path with `/`
pub fn join(dir: &str, rest: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    if dir.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        dir.to_string()
    } else {
        format!("{}/{}", dir, rest)
    }
}

/// Storage key of an entry path (relative to the data directory)
pub fn entry_storage_key(entry_path: &str) -> String {
    join(ENTRIES_ROOT, entry_path)
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
