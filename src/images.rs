// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Image collection and per-image lifecycle

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{ImagesaidError, Result};

/// Lifecycle status of a single image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl ImageStatus {
    /// Legal moves are `pending -> processing -> {completed, error}`.
    /// Staying in the same status is always allowed.
    pub fn can_transition_to(self, next: ImageStatus) -> bool {
        use ImageStatus::*;
        self == next
            || matches!(
                (self, next),
                (Pending, Processing) | (Processing, Completed) | (Processing, Error)
            )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ImageStatus::Completed | ImageStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageStatus::Pending => "pending",
            ImageStatus::Processing => "processing",
            ImageStatus::Completed => "completed",
            ImageStatus::Error => "error",
        }
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One image's workflow record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEntry {
    pub id: String,
    pub source_path: PathBuf,
    pub original_name: String,
    pub suggested_name: String,
    pub status: ImageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_millis: Option<u64>,
}

impl ImageEntry {
    fn new(file: NewImage) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_path: file.path,
            original_name: file.name,
            suggested_name: String::new(),
            status: ImageStatus::Pending,
            error: None,
            elapsed_millis: None,
        }
    }

    /// Trimmed suggestion, if there is one worth renaming to
    pub fn rename_target(&self) -> Option<&str> {
        let name = self.suggested_name.trim();
        (self.status == ImageStatus::Completed && !name.is_empty()).then_some(name)
    }
}

/// A file submitted by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewImage {
    pub path: PathBuf,
    pub name: String,
}

impl NewImage {
    /// Build from a path, using its file name for display
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, name }
    }
}

/// Partial update merged into an entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePatch {
    #[serde(default)]
    pub status: Option<ImageStatus>,
    #[serde(default)]
    pub suggested_name: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub elapsed_millis: Option<u64>,
}

impl ImagePatch {
    pub fn status(status: ImageStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn completed(name: impl Into<String>, elapsed_millis: u64) -> Self {
        Self {
            status: Some(ImageStatus::Completed),
            suggested_name: Some(name.into()),
            elapsed_millis: Some(elapsed_millis),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(ImageStatus::Error),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn suggested_name(name: impl Into<String>) -> Self {
        Self {
            suggested_name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Counts shown while a batch runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub percent_complete: f64,
}

/// Ordered set of submitted images
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageCollection {
    entries: Vec<ImageEntry>,
}

impl ImageCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one pending entry per file, in order. Duplicates are kept.
    pub fn add(&mut self, files: impl IntoIterator<Item = NewImage>) -> Vec<String> {
        let start = self.entries.len();
        self.entries.extend(files.into_iter().map(ImageEntry::new));
        self.entries[start..].iter().map(|e| e.id.clone()).collect()
    }

    /// Merge `patch` into the entry with `id`
    pub fn update(&mut self, id: &str, patch: ImagePatch) -> Result<&ImageEntry> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ImagesaidError::not_found("image", id))?;

        let next = patch.status.unwrap_or(entry.status);
        if !entry.status.can_transition_to(next) {
            return Err(ImagesaidError::InvalidTransition {
                id: id.to_string(),
                from: entry.status,
                to: next,
            });
        }

        // The processor's own completion patch carries the status change;
        // a bare name edit on an in-flight entry is a user edit.
        if patch.suggested_name.is_some()
            && entry.status == ImageStatus::Processing
            && next == ImageStatus::Processing
        {
            return Err(ImagesaidError::Validation(format!(
                "image {} is being processed and cannot be renamed",
                id
            )));
        }

        entry.status = next;
        if let Some(name) = patch.suggested_name {
            entry.suggested_name = name;
        }
        match next {
            ImageStatus::Completed => {
                entry.error = None;
                if patch.elapsed_millis.is_some() {
                    entry.elapsed_millis = patch.elapsed_millis;
                }
            }
            ImageStatus::Error => {
                entry.elapsed_millis = None;
                if patch.error.is_some() {
                    entry.error = patch.error;
                }
            }
            _ => {}
        }

        Ok(entry)
    }

    /// User edit of the suggested name
    pub fn rename_suggestion(&mut self, id: &str, name: impl Into<String>) -> Result<&ImageEntry> {
        self.update(id, ImagePatch::suggested_name(name))
    }

    /// Delete an entry at any status
    pub fn remove(&mut self, id: &str) -> Result<ImageEntry> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| ImagesaidError::not_found("image", id))?;
        Ok(self.entries.remove(idx))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, id: &str) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[ImageEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids and paths of pending entries, in collection order
    pub fn pending(&self) -> Vec<(String, PathBuf)> {
        self.entries
            .iter()
            .filter(|e| e.status == ImageStatus::Pending)
            .map(|e| (e.id.clone(), e.source_path.clone()))
            .collect()
    }

    pub fn summary(&self) -> ProgressSummary {
        let mut summary = ProgressSummary {
            total: self.entries.len(),
            ..ProgressSummary::default()
        };
        for entry in &self.entries {
            match entry.status {
                ImageStatus::Pending => summary.pending += 1,
                ImageStatus::Processing => summary.processing += 1,
                ImageStatus::Completed => summary.completed += 1,
                ImageStatus::Error => summary.failed += 1,
            }
        }
        if summary.total > 0 {
            summary.percent_complete = summary.completed as f64 / summary.total as f64 * 100.0;
        }
        summary
    }
}

/// Human readable duration: `850ms`, `12.3s`, `2m 5.0s`
pub fn format_duration(millis: u64) -> String {
    if millis < 1_000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", millis as f64 / 1_000.0)
    } else {
        let minutes = millis / 60_000;
        let seconds = (millis % 60_000) as f64 / 1_000.0;
        format!("{}m {:.1}s", minutes, seconds)
    }
}
