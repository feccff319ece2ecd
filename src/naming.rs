// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File name cleanup for model output

use std::path::{Path, PathBuf};

/// Longest stem kept from a model response, in characters
pub const MAX_NAME_CHARS: usize = 100;

/// Turn a raw model response into a usable file stem
pub fn clean_filename(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '"'))
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '<' | '>' | '|' => '_',
            other => other,
        })
        .take(MAX_NAME_CHARS)
        .collect()
}

/// Whether `stem` names a file in the same directory: no separators, not
/// empty, and not a `.` or `..` component
pub fn is_plain_stem(stem: &str) -> bool {
    let stem = stem.trim();
    !stem.is_empty()
        && stem != "."
        && stem != ".."
        && !stem.contains(['/', '\\', '\0'])
}

/// Path `original` would have after renaming to `stem`, keeping its extension
pub fn renamed_path(original: &Path, stem: &str) -> PathBuf {
    let file_name = match original.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", stem, ext),
        _ => stem.to_string(),
    };
    original.with_file_name(file_name)
}
