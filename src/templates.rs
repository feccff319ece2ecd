// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Prompt templates and the active prompt text

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ImagesaidError, Result};

/// Reserved id of the built-in template
pub const DEFAULT_TEMPLATE_ID: &str = "default";

pub const DEFAULT_TEMPLATE_NAME: &str = "Default";

pub const DEFAULT_PROMPT: &str = "Describe the image as a concise file name in the form \
    scene_subject_action, for example: lawn_golden_retriever_catching_frisbee.";

/// A named, reusable prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl PromptTemplate {
    pub fn builtin() -> Self {
        Self {
            id: DEFAULT_TEMPLATE_ID.to_string(),
            name: DEFAULT_TEMPLATE_NAME.to_string(),
            content: DEFAULT_PROMPT.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.id == DEFAULT_TEMPLATE_ID
    }
}

/// Fields a template edit may change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplatePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Templates plus the current selection and active prompt.
///
/// The active prompt is freely editable, so every change to the current
/// template or its content re-syncs `prompt`.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRegistry {
    templates: Vec<PromptTemplate>,
    current: Option<String>,
    prompt: String,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self {
            templates: vec![PromptTemplate::builtin()],
            current: Some(DEFAULT_TEMPLATE_ID.to_string()),
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl TemplateRegistry {
    /// Rebuild from persisted parts, repairing what an older or hand-edited
    /// document may have broken.
    pub fn restore(
        mut templates: Vec<PromptTemplate>,
        current: Option<String>,
        prompt: Option<String>,
    ) -> Self {
        if !templates.iter().any(PromptTemplate::is_builtin) {
            templates.insert(0, PromptTemplate::builtin());
        }
        let current = match current {
            Some(id) if templates.iter().any(|t| t.id == id) => Some(id),
            Some(id) => {
                tracing::warn!("Current template {} no longer exists, using default", id);
                Some(DEFAULT_TEMPLATE_ID.to_string())
            }
            None => None,
        };
        let prompt = prompt.unwrap_or_else(|| {
            current
                .as_deref()
                .and_then(|id| templates.iter().find(|t| t.id == id))
                .map(|t| t.content.clone())
                .unwrap_or_default()
        });
        Self {
            templates,
            current,
            prompt,
        }
    }

    pub fn templates(&self) -> &[PromptTemplate] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&PromptTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&PromptTemplate> {
        self.current.as_deref().and_then(|id| self.get(id))
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Free edit of the active prompt; the current template is untouched
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// Create a template. The current selection does not change.
    pub fn add(&mut self, name: &str, content: &str) -> Result<&PromptTemplate> {
        let name = non_blank("name", name)?;
        let content = non_blank("content", content)?;
        self.templates.push(PromptTemplate {
            id: Uuid::new_v4().to_string(),
            name,
            content,
            created_at: Utc::now(),
        });
        Ok(&self.templates[self.templates.len() - 1])
    }

    pub fn update(&mut self, id: &str, patch: TemplatePatch) -> Result<&PromptTemplate> {
        let name = patch.name.as_deref().map(|n| non_blank("name", n)).transpose()?;
        let content = patch
            .content
            .as_deref()
            .map(|c| non_blank("content", c))
            .transpose()?;

        let is_current = self.current.as_deref() == Some(id);
        let idx = self.index_of(id)?;
        let template = &mut self.templates[idx];
        if let Some(name) = name {
            template.name = name;
        }
        if let Some(content) = content {
            template.content = content;
        }
        if is_current {
            self.prompt = template.content.clone();
        }
        Ok(&self.templates[idx])
    }

    /// Remove a template. The built-in one is protected.
    pub fn delete(&mut self, id: &str) -> Result<PromptTemplate> {
        if id == DEFAULT_TEMPLATE_ID {
            return Err(ImagesaidError::Protected(
                "the built-in template cannot be deleted".to_string(),
            ));
        }
        let idx = self.index_of(id)?;
        let removed = self.templates.remove(idx);

        if self.current.as_deref() == Some(id) {
            let next = self.templates.first().map(|t| t.id.clone());
            self.sync_current(next);
        }
        Ok(removed)
    }

    /// Select a template (or none) and load its content as the active prompt
    pub fn set_current(&mut self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            self.index_of(id)?;
        }
        self.sync_current(id.map(str::to_string));
        Ok(())
    }

    /// Write the active prompt back into the current template
    pub fn save_prompt_to_current(&mut self) -> Result<&PromptTemplate> {
        let id = self
            .current
            .clone()
            .ok_or_else(|| ImagesaidError::not_found("template", "<none selected>"))?;
        let content = self.prompt.clone();
        self.update(
            &id,
            TemplatePatch {
                name: None,
                content: Some(content),
            },
        )
    }

    /// Store the active prompt as a new template
    pub fn save_prompt_as(&mut self, name: &str) -> Result<&PromptTemplate> {
        let content = self.prompt.clone();
        self.add(name, &content)
    }

    fn sync_current(&mut self, id: Option<String>) {
        self.prompt = id
            .as_deref()
            .and_then(|id| self.get(id))
            .map(|t| t.content.clone())
            .unwrap_or_default();
        self.current = id;
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.templates
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| ImagesaidError::not_found("template", id))
    }
}

fn non_blank(field: &str, value: &str) -> Result<String> {
    if value.trim().is_empty() {
        Err(ImagesaidError::Validation(format!(
            "template {} must not be empty",
            field
        )))
    } else {
        Ok(value.to_string())
    }
}
