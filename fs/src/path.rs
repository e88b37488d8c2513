//! Path normalization and root-relative resolution.
//!
//! Paths are `/`-separated byte strings. Resolution is purely lexical:
//! `.` segments vanish, `..` pops the previous segment and is clamped at
//! the root, so no input can name anything above the prefix it is joined
//! to. The storage layer below never sees a `.` or `..` segment.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{FsError, FsResult};
use crate::types::MAX_PATH;

/// Normalize an absolute path: collapse separators, resolve `.` and `..`
/// (clamped at `/`). Returns a path that starts with `/` and contains no
/// empty or dot segments.
pub fn normalize(path: &str) -> FsResult<String> {
    if path.len() > MAX_PATH {
        return Err(FsError::NameTooLong);
    }
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                // Clamp at the root rather than escaping it.
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return Ok(String::from("/"));
    }
    let mut out = String::with_capacity(path.len());
    for seg in segments {
        out.push('/');
        out.push_str(seg);
    }
    Ok(out)
}

/// Resolve a caller-supplied path against a task's root and (in-root)
/// working directory, producing the real path handed to the store.
///
/// `root` must be a normalized absolute path; `cwd` is interpreted inside
/// the root. Relative inputs are joined to `cwd` first; the combined path
/// is normalized and then prefixed with the root, so the result can never
/// ascend above `root`.
pub fn resolve(root: &str, cwd: &str, path: &str) -> FsResult<String> {
    let inner = if path.starts_with('/') {
        normalize(path)?
    } else {
        let mut joined = String::with_capacity(cwd.len() + path.len() + 1);
        joined.push_str(cwd);
        joined.push('/');
        joined.push_str(path);
        normalize(&joined)?
    };
    let real = join_under(root, &inner);
    if real.len() > MAX_PATH {
        return Err(FsError::NameTooLong);
    }
    Ok(real)
}

/// Prefix a normalized in-root path with the root itself.
pub fn join_under(root: &str, inner: &str) -> String {
    if root == "/" {
        return String::from(inner);
    }
    let mut out = String::with_capacity(root.len() + inner.len());
    out.push_str(root.trim_end_matches('/'));
    if inner != "/" {
        out.push_str(inner);
    }
    out
}

/// Final component of a path ("" for the root).
pub fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Parent directory of a normalized path (the root is its own parent).
pub fn parent(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &trimmed[..idx],
    }
}
