// SPDX-License-Identifier: MIT

//! Path helpers for volume paths.
//!
//! Volume paths are `/`-separated; empty components are ignored, so `""`,
//! `"/"` and `"//"` all name the root directory.

/// Splits a path into its non-empty components.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

/// Join two path components with `/`, ensuring no duplicate slash
pub fn join_paths(base: &str, part: &str) -> String {
    let mut out = String::with_capacity(base.len() + part.len() + 1);
    out.push_str(base.trim_end_matches('/'));
    out.push('/');
    out.push_str(part.trim_start_matches('/'));
    out
}

/// Splits `path` into its parent components and final name.
///
/// Returns `None` for paths naming the root.
pub fn split_parent(path: &str) -> Option<(Vec<&str>, &str)> {
    let mut parts = split_path(path);
    let name = parts.pop()?;
    Some((parts, name))
}

/// Extracts the last component of the path (file or directory name).
///
/// Example: `path/to/file.txt` → `file.txt`.
pub fn extract_name_from_path(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or("")
}
