// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Image file discovery on disk

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::images::NewImage;

/// Extensions accepted as images (lowercase)
pub const IMAGE_EXTENSIONS: [&str; 11] = [
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif", "heic", "heif", "avif",
];

/// Check if a file should be picked up at all
pub fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Skip hidden files
    if filename.starts_with('.') {
        return false;
    }

    // Skip partial downloads
    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    if temp_extensions.iter().any(|ext| filename.ends_with(ext)) {
        return false;
    }

    let skip_names = ["desktop.ini", "thumbs.db", ".ds_store"];
    if skip_names.iter().any(|n| filename.eq_ignore_ascii_case(n)) {
        return false;
    }

    true
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand files and directories into image entries, in argument order.
///
/// Directory contents are sorted by path. Links to files are followed while
/// walking, links to directories are not. Paths that do not exist are
/// logged and skipped.
pub fn collect_images(paths: &[PathBuf], recursive: bool) -> Vec<NewImage> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = walk(path, recursive);
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            warn!("Skipping {:?}: not a file or directory", path);
        }
    }

    let images: Vec<NewImage> = files
        .into_iter()
        .filter(|p| should_process(p) && is_image(p))
        .map(NewImage::from_path)
        .collect();
    debug!("Collected {} images", images.len());
    images
}

fn walk(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let p = entry.path();
            if file_type.is_dir() {
                if recursive {
                    files.extend(walk(&p, recursive));
                }
            } else if file_type.is_file() || (file_type.is_symlink() && p.is_file()) {
                files.push(p);
            } else if file_type.is_symlink() {
                debug!("Not following directory link {:?}", p);
            }
        }
    }

    files
}
