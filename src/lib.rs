// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! imagesaid: batch image renaming with a local vision model
//!
//! Images are queued, named one at a time by a vision-language model served
//! over HTTP (Ollama), reviewed, and then renamed on disk in one batch.
//! Prompt templates, the model registry and connection settings persist
//! between runs.

pub mod backend;
pub mod config;
pub mod error;
pub mod history;
pub mod images;
pub mod imaging;
pub mod intake;
pub mod models;
pub mod naming;
pub mod ollama;
pub mod renamer;
pub mod settings;
pub mod templates;
pub mod web;
pub mod workflow;

pub use config::AppConfig;
pub use error::{ImagesaidError, Result};
pub use workflow::Workflow;
