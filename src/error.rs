// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for imagesaid

use thiserror::Error;

use crate::images::ImageStatus;

/// Result type alias for imagesaid operations
pub type Result<T> = std::result::Result<T, ImagesaidError>;

/// imagesaid error types
#[derive(Error, Debug)]
pub enum ImagesaidError {
    #[error("Connection failed: {0}")]
    Connectivity(String),

    #[error("Model discovery failed: {0}")]
    Discovery(String),

    #[error("{0}")]
    Inference(String),

    #[error("Rename failed: {0}")]
    Rename(String),

    #[error("Invalid argument: {0}")]
    Validation(String),

    #[error("Protected: {0}")]
    Protected(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Illegal status change for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ImageStatus,
        to: ImageStatus,
    },

    #[error("A batch is already being processed")]
    BatchInFlight,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings store error: {0}")]
    Settings(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl ImagesaidError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// Whether the error came from bad caller input rather than a collaborator
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Protected(_)
                | Self::NotFound { .. }
                | Self::InvalidTransition { .. }
                | Self::BatchInFlight
        )
    }
}
