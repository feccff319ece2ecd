// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Registry of models discovered from the inference backend

use serde::{Deserialize, Serialize};

use crate::{ImagesaidError, Result};

/// Context length used when neither the model nor the user gives one
pub const FALLBACK_CONTEXT_LENGTH: u32 = 4096;

/// Structural details reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDetails {
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub parameter_size: String,
    #[serde(default)]
    pub quantization_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u32>,
}

/// A model as fetched from the backend, before user settings are attached
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredModel {
    pub name: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub details: ModelDetails,
}

/// A registry entry: discovered data plus user settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub details: ModelDetails,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_context_length")]
    pub custom_context_length: u32,
    #[serde(default)]
    pub is_default: bool,
}

fn default_true() -> bool { true }
fn default_context_length() -> u32 { FALLBACK_CONTEXT_LENGTH }

impl ModelDescriptor {
    /// Fresh entry for a model seen for the first time
    pub fn from_discovered(model: DiscoveredModel, active_model: &str) -> Self {
        let is_default = model.name == active_model;
        Self {
            custom_context_length: model
                .details
                .context_length
                .unwrap_or(FALLBACK_CONTEXT_LENGTH),
            name: model.name,
            size_bytes: model.size_bytes,
            digest: model.digest,
            details: model.details,
            enabled: true,
            is_default,
        }
    }

    /// Parameter size and quantization, e.g. `3.8B Q4_K_M`
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.details.parameter_size.is_empty() {
            parts.push(self.details.parameter_size.as_str());
        }
        if !self.details.quantization_level.is_empty() {
            parts.push(self.details.quantization_level.as_str());
        }
        parts.join(" ")
    }
}

/// Models currently available from the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        Self { models }
    }

    /// Replace the registry with a fresh fetch.
    ///
    /// User settings carry over for models that are still present. Models
    /// missing from the fetch are dropped.
    pub fn reconcile(&mut self, fetched: Vec<DiscoveredModel>, active_model: &str) {
        let models = fetched
            .into_iter()
            .map(|model| match self.get(&model.name) {
                Some(old) => ModelDescriptor {
                    enabled: old.enabled,
                    custom_context_length: old.custom_context_length,
                    is_default: old.is_default,
                    name: model.name,
                    size_bytes: model.size_bytes,
                    digest: model.digest,
                    details: model.details,
                },
                None => ModelDescriptor::from_discovered(model, active_model),
            })
            .collect();
        self.models = models;
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        self.get_mut(name)?.enabled = enabled;
        Ok(())
    }

    pub fn set_context_length(&mut self, name: &str, length: i64) -> Result<()> {
        if length <= 0 {
            return Err(ImagesaidError::Validation(format!(
                "context length must be positive, got {}",
                length
            )));
        }
        let length = u32::try_from(length).map_err(|_| {
            ImagesaidError::Validation(format!("context length {} is too large", length))
        })?;
        self.get_mut(name)?.custom_context_length = length;
        Ok(())
    }

    /// Make `name` the only default model
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        self.get_mut(name)?;
        for model in &mut self.models {
            model.is_default = model.name == name;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut ModelDescriptor> {
        self.models
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or_else(|| ImagesaidError::not_found("model", name))
    }

    pub fn default_model(&self) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.is_default)
    }

    /// Context length of the default model, or the fallback
    pub fn active_context_length(&self) -> u32 {
        self.default_model()
            .map(|m| m.custom_context_length)
            .unwrap_or(FALLBACK_CONTEXT_LENGTH)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).is_some_and(|m| m.enabled)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
