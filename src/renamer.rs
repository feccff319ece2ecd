// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File system rename backend

use async_trait::async_trait;
use tracing::info;

use crate::backend::{RenameBackend, RenameRequest};
use crate::history::{History, HistoryEntry};
use crate::naming::{is_plain_stem, renamed_path};
use crate::{ImagesaidError, Result};

/// Renames files in place, keeping their extension.
///
/// Stops at the first failure; earlier renames in the batch stay applied
/// and are recorded in the history log.
pub struct FsRenamer {
    history: Option<History>,
}

impl FsRenamer {
    pub fn new() -> Self {
        Self { history: None }
    }

    /// Record every rename so it can be undone later
    pub fn with_history(history: History) -> Self {
        Self {
            history: Some(history),
        }
    }

    fn rename_one(&self, request: &RenameRequest) -> Result<()> {
        let original = &request.original_path;
        if !original.is_file() {
            return Err(ImagesaidError::Rename(format!(
                "File not found: {}",
                original.display()
            )));
        }

        if !is_plain_stem(&request.new_name) {
            return Err(ImagesaidError::Rename(format!(
                "Invalid file name {:?} for {}",
                request.new_name,
                original.display()
            )));
        }

        let target = renamed_path(original, &request.new_name);
        if target.parent() != original.parent() {
            return Err(ImagesaidError::Rename(format!(
                "Target leaves the directory of {}: {}",
                original.display(),
                target.display()
            )));
        }
        if target != *original && target.exists() {
            return Err(ImagesaidError::Rename(format!(
                "Target already exists: {}",
                target.display()
            )));
        }

        std::fs::rename(original, &target).map_err(|e| {
            ImagesaidError::Rename(format!("Cannot rename {}: {}", original.display(), e))
        })?;
        info!("Renamed {:?} -> {:?}", original, target);

        if let Some(history) = &self.history {
            let entry = HistoryEntry::new(original.clone(), target, request.new_name.clone());
            if let Err(e) = history.append(&entry) {
                tracing::warn!("Failed to record rename in history: {}", e);
            }
        }
        Ok(())
    }
}

impl Default for FsRenamer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenameBackend for FsRenamer {
    async fn apply_rename_batch(&self, batch: &[RenameRequest]) -> Result<()> {
        for request in batch {
            self.rename_one(request)?;
        }
        Ok(())
    }
}
