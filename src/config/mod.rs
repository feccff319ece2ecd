// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for imagesaid

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::models::ModelRegistry;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "qwen2.5vl:3b-32k";

/// Connectivity to the inference backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Testing,
    Success,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Testing => "testing",
            ConnectionState::Success => "success",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Backend connection and model settings.
///
/// Every field has a default so documents written by older versions
/// merge into the current defaults.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub api_endpoint: String,
    pub active_model_name: String,
    pub connection_state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_message: Option<String>,
    pub models_loading: bool,
    pub available_models: ModelRegistry,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_ENDPOINT.to_string(),
            active_model_name: DEFAULT_MODEL.to_string(),
            connection_state: ConnectionState::Idle,
            connection_message: None,
            models_loading: false,
            available_models: ModelRegistry::default(),
        }
    }
}

impl AppConfig {
    /// Reset in-flight flags that cannot survive a restart
    pub fn normalize_transient(&mut self) {
        self.models_loading = false;
        if self.connection_state == ConnectionState::Testing {
            self.connection_state = ConnectionState::Idle;
            self.connection_message = None;
        }
    }
}

/// Partial update to the connection settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub active_model_name: Option<String>,
}

/// Runtime knobs that are not persisted
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Delay between a mutation and the settings write it triggers
    pub save_debounce: Duration,
    pub connect_timeout: Duration,
    pub inference_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            save_debounce: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(10),
            inference_timeout: Duration::from_secs(120),
        }
    }
}
