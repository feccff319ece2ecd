// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Collaborators the workflow engine drives

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::DiscoveredModel;
use crate::Result;

/// A file name produced for one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedName {
    pub name: String,
    pub elapsed_millis: u64,
}

/// Everything one inference call needs
#[derive(Debug, Clone, Copy)]
pub struct NameRequest<'a> {
    pub image_path: &'a Path,
    pub prompt: &'a str,
    pub endpoint: &'a str,
    pub model: &'a str,
    pub context_length: u32,
}

/// Vision-language model service
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Check the endpoint is reachable; the message is shown to the user
    async fn test_connection(&self, endpoint: &str) -> Result<String>;

    async fn list_models(&self, endpoint: &str) -> Result<Vec<DiscoveredModel>>;

    /// Suggest a file name for one image
    async fn generate_name(&self, request: NameRequest<'_>) -> Result<GeneratedName>;
}

/// One rename in a batch: keep the directory and extension, change the stem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    pub original_path: PathBuf,
    pub new_name: String,
}

/// Applies a batch of renames
#[async_trait]
pub trait RenameBackend: Send + Sync {
    async fn apply_rename_batch(&self, batch: &[RenameRequest]) -> Result<()>;
}
