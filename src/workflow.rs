// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! The image renaming workflow engine.
//!
//! [`Workflow`] owns the image collection, prompt templates, model registry
//! and connection settings, and is the only way to mutate them. It is a cheap
//! cloneable handle; state lives behind one lock that is only held between
//! suspension points, so a running batch does not block edits to the list.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::backend::{InferenceBackend, NameRequest, RenameBackend, RenameRequest};
use crate::config::{AppConfig, ConfigPatch, ConnectionState, EngineOptions};
use crate::images::{ImageCollection, ImageEntry, ImagePatch, ImageStatus, NewImage, ProgressSummary};
use crate::models::DiscoveredModel;
use crate::settings::{load_document, SettingsDocument, SettingsStore, SettingsSync};
use crate::templates::{PromptTemplate, TemplatePatch, TemplateRegistry};
use crate::{ImagesaidError, Result};

/// Global processing indicator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Idle,
    Processing,
    Done,
}

/// Outcome of one `start_processing` run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Entries in the snapshot taken at batch start
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
    /// Entries removed from the collection before their turn finished
    pub skipped: usize,
    pub total_elapsed_millis: u64,
    pub model: String,
    pub context_length: u32,
}

/// Result of the test-then-discover sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCheck {
    pub state: ConnectionState,
    pub message: Option<String>,
    /// Models found, when discovery ran and succeeded
    pub models_found: Option<usize>,
    pub discovery_error: Option<String>,
}

/// Read-only view of the whole state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub images: Vec<ImageEntry>,
    pub config: AppConfig,
    pub prompt: String,
    pub prompt_templates: Vec<PromptTemplate>,
    pub current_template_id: Option<String>,
    pub processing_status: ProcessingStatus,
    pub total_elapsed_millis: u64,
    pub summary: ProgressSummary,
}

struct WorkflowState {
    images: ImageCollection,
    config: AppConfig,
    templates: TemplateRegistry,
    processing: ProcessingStatus,
    total_elapsed_millis: u64,
}

struct Shared {
    state: Mutex<WorkflowState>,
    inference: Arc<dyn InferenceBackend>,
    renamer: Arc<dyn RenameBackend>,
    settings: SettingsSync,
}

/// Handle to the workflow engine
#[derive(Clone)]
pub struct Workflow {
    shared: Arc<Shared>,
}

impl Workflow {
    /// Build an engine, loading saved settings from `store`
    pub fn new(
        inference: Arc<dyn InferenceBackend>,
        renamer: Arc<dyn RenameBackend>,
        store: Arc<dyn SettingsStore>,
        options: &EngineOptions,
    ) -> Self {
        let (config, templates) = load_document(store.as_ref()).into_parts();
        info!(
            "Settings loaded: endpoint={} model={} templates={}",
            config.api_endpoint,
            config.active_model_name,
            templates.templates().len()
        );

        let state = WorkflowState {
            images: ImageCollection::new(),
            config,
            templates,
            processing: ProcessingStatus::Idle,
            total_elapsed_millis: 0,
        };

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                inference,
                renamer,
                settings: SettingsSync::new(store, options.save_debounce),
            }),
        }
    }

    // State is consistent between suspension points, so a poisoned lock
    // still guards valid data.
    fn state(&self) -> MutexGuard<'_, WorkflowState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &WorkflowState) {
        self.shared
            .settings
            .schedule(SettingsDocument::capture(&state.config, &state.templates));
    }

    /// Run a settings mutation and queue a save if it succeeded
    fn mutate_settings<T>(&self, f: impl FnOnce(&mut WorkflowState) -> Result<T>) -> Result<T> {
        let mut state = self.state();
        let value = f(&mut state)?;
        self.persist(&state);
        Ok(value)
    }

    // === Images ===

    /// Append pending entries; returns their ids in order
    pub fn add_images(&self, files: Vec<NewImage>) -> Vec<String> {
        let ids = self.state().images.add(files);
        debug!("Added {} images", ids.len());
        ids
    }

    pub fn update_image(&self, id: &str, patch: ImagePatch) -> Result<ImageEntry> {
        self.state().images.update(id, patch).cloned()
    }

    /// User edit of a suggested name; refused while the image is processing
    pub fn rename_suggestion(&self, id: &str, name: &str) -> Result<ImageEntry> {
        self.state().images.rename_suggestion(id, name).cloned()
    }

    pub fn remove_image(&self, id: &str) -> Result<ImageEntry> {
        self.state().images.remove(id)
    }

    /// Empty the list and reset the aggregate processing time
    pub fn clear_images(&self) {
        let mut state = self.state();
        state.images.clear();
        state.total_elapsed_millis = 0;
    }

    pub fn image(&self, id: &str) -> Option<ImageEntry> {
        self.state().images.get(id).cloned()
    }

    pub fn images(&self) -> Vec<ImageEntry> {
        self.state().images.entries().to_vec()
    }

    pub fn summary(&self) -> ProgressSummary {
        self.state().images.summary()
    }

    // === Prompt and templates ===

    pub fn prompt(&self) -> String {
        self.state().templates.prompt().to_string()
    }

    pub fn set_prompt(&self, prompt: &str) {
        let mut state = self.state();
        state.templates.set_prompt(prompt);
        self.persist(&state);
    }

    pub fn templates(&self) -> Vec<PromptTemplate> {
        self.state().templates.templates().to_vec()
    }

    pub fn current_template_id(&self) -> Option<String> {
        self.state().templates.current_id().map(str::to_string)
    }

    pub fn add_template(&self, name: &str, content: &str) -> Result<PromptTemplate> {
        self.mutate_settings(|s| s.templates.add(name, content).cloned())
    }

    pub fn update_template(&self, id: &str, patch: TemplatePatch) -> Result<PromptTemplate> {
        self.mutate_settings(|s| s.templates.update(id, patch).cloned())
    }

    pub fn delete_template(&self, id: &str) -> Result<PromptTemplate> {
        self.mutate_settings(|s| s.templates.delete(id))
    }

    pub fn set_current_template(&self, id: Option<&str>) -> Result<()> {
        self.mutate_settings(|s| s.templates.set_current(id))
    }

    pub fn save_prompt_to_current(&self) -> Result<PromptTemplate> {
        self.mutate_settings(|s| s.templates.save_prompt_to_current().cloned())
    }

    pub fn save_prompt_as(&self, name: &str) -> Result<PromptTemplate> {
        self.mutate_settings(|s| s.templates.save_prompt_as(name).cloned())
    }

    // === Connection and models ===

    pub fn config(&self) -> AppConfig {
        self.state().config.clone()
    }

    pub fn update_config(&self, patch: ConfigPatch) -> AppConfig {
        let mut state = self.state();
        if let Some(endpoint) = patch.api_endpoint {
            state.config.api_endpoint = endpoint;
        }
        if let Some(model) = patch.active_model_name {
            state.config.active_model_name = model;
        }
        self.persist(&state);
        state.config.clone()
    }

    /// Check the backend is reachable. Failures end up in the connection
    /// state rather than as an error. A call while a test is already
    /// running is ignored.
    pub async fn test_connection(&self) -> ConnectionState {
        let endpoint = {
            let mut state = self.state();
            if state.config.connection_state == ConnectionState::Testing {
                debug!("Connection test already running");
                return ConnectionState::Testing;
            }
            state.config.connection_state = ConnectionState::Testing;
            state.config.connection_message = None;
            self.persist(&state);
            state.config.api_endpoint.clone()
        };

        info!("Testing connection to {}", endpoint);
        let result = self.shared.inference.test_connection(&endpoint).await;

        let mut state = self.state();
        match result {
            Ok(message) => {
                state.config.connection_state = ConnectionState::Success;
                state.config.connection_message = Some(message);
            }
            Err(e) => {
                warn!("Connection test failed: {}", e);
                state.config.connection_state = ConnectionState::Failed;
                state.config.connection_message = Some(failure_detail(e));
            }
        }
        self.persist(&state);
        state.config.connection_state
    }

    /// Fetch the model list and reconcile it into the registry. On failure
    /// the registry is left as it was.
    pub async fn discover_models(&self) -> Result<usize> {
        let endpoint = {
            let mut state = self.state();
            if state.config.models_loading {
                debug!("Model discovery already running");
                return Ok(state.config.available_models.len());
            }
            state.config.models_loading = true;
            state.config.api_endpoint.clone()
        };

        let result = self.shared.inference.list_models(&endpoint).await;

        let mut state = self.state();
        state.config.models_loading = false;
        match result {
            Ok(models) => {
                let count = models.len();
                apply_discovery(&mut state.config, models);
                self.persist(&state);
                info!("Discovered {} models", count);
                Ok(count)
            }
            Err(e) => {
                warn!("Model discovery failed: {}", e);
                Err(match e {
                    ImagesaidError::Discovery(_) => e,
                    other => ImagesaidError::Discovery(other.to_string()),
                })
            }
        }
    }

    /// Test the connection, then discover models only if it succeeded.
    /// A discovery failure never changes the connection result.
    pub async fn connect_and_discover(&self) -> ConnectionCheck {
        let state = self.test_connection().await;
        let message = self.state().config.connection_message.clone();
        let mut check = ConnectionCheck {
            state,
            message,
            models_found: None,
            discovery_error: None,
        };
        if state == ConnectionState::Success {
            match self.discover_models().await {
                Ok(count) => check.models_found = Some(count),
                Err(e) => check.discovery_error = Some(e.to_string()),
            }
        }
        check
    }

    pub fn set_model_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.mutate_settings(|s| s.config.available_models.set_enabled(name, enabled))
    }

    /// Flip a model's enabled flag; returns the new value
    pub fn toggle_model_enabled(&self, name: &str) -> Result<bool> {
        self.mutate_settings(|s| {
            let enabled = !s.config.available_models.is_enabled(name);
            s.config.available_models.set_enabled(name, enabled)?;
            Ok(enabled)
        })
    }

    pub fn set_model_context_length(&self, name: &str, length: i64) -> Result<()> {
        self.mutate_settings(|s| s.config.available_models.set_context_length(name, length))
    }

    /// Make `name` the default model and the active model
    pub fn set_default_model(&self, name: &str) -> Result<()> {
        self.mutate_settings(|s| {
            s.config.available_models.set_default(name)?;
            s.config.active_model_name = name.to_string();
            Ok(())
        })
    }

    // === Batch processing ===

    pub fn processing_status(&self) -> ProcessingStatus {
        self.state().processing
    }

    pub fn total_elapsed_millis(&self) -> u64 {
        self.state().total_elapsed_millis
    }

    /// Process every pending image, one at a time, in collection order.
    ///
    /// Returns `None` without doing anything when a batch is already running
    /// or nothing is pending. Model, context length, prompt and endpoint are
    /// fixed when the batch starts. A failed image is recorded on its entry
    /// and the batch moves on.
    pub async fn start_processing(&self) -> Option<BatchReport> {
        let (batch, prompt, endpoint, mut report) = {
            let mut state = self.state();
            if state.processing == ProcessingStatus::Processing {
                debug!("Batch already running, ignoring start request");
                return None;
            }
            let batch = state.images.pending();
            if batch.is_empty() {
                debug!("No pending images");
                return None;
            }
            state.processing = ProcessingStatus::Processing;
            state.total_elapsed_millis = 0;

            let report = BatchReport {
                processed: batch.len(),
                model: state.config.active_model_name.clone(),
                context_length: state.config.available_models.active_context_length(),
                ..BatchReport::default()
            };
            (
                batch,
                state.templates.prompt().to_string(),
                state.config.api_endpoint.clone(),
                report,
            )
        };

        info!(
            "Processing {} images with {} (context {})",
            batch.len(),
            report.model,
            report.context_length
        );

        for (id, path) in &batch {
            {
                let mut state = self.state();
                if let Err(e) = state.images.update(id, ImagePatch::status(ImageStatus::Processing)) {
                    debug!("Skipping {}: {}", id, e);
                    report.skipped += 1;
                    continue;
                }
            }

            let result = self
                .shared
                .inference
                .generate_name(NameRequest {
                    image_path: path,
                    prompt: &prompt,
                    endpoint: &endpoint,
                    model: &report.model,
                    context_length: report.context_length,
                })
                .await;

            let mut state = self.state();
            match result {
                Ok(generated) => {
                    let name = generated.name.trim().to_string();
                    let elapsed = generated.elapsed_millis;
                    let applied = state
                        .images
                        .update(id, ImagePatch::completed(name.as_str(), elapsed))
                        .is_ok();
                    if applied {
                        debug!("{:?} -> {} ({}ms)", path, name, elapsed);
                        state.total_elapsed_millis += elapsed;
                        report.total_elapsed_millis += elapsed;
                        report.completed += 1;
                    } else {
                        report.skipped += 1;
                    }
                }
                Err(e) => {
                    let detail = failure_detail(e);
                    warn!("Failed to name {:?}: {}", path, detail);
                    if state.images.update(id, ImagePatch::failed(detail)).is_ok() {
                        report.failed += 1;
                    } else {
                        report.skipped += 1;
                    }
                }
            }
        }

        self.state().processing = ProcessingStatus::Done;
        info!(
            "Batch done: {} completed, {} failed, {} skipped in {}ms",
            report.completed, report.failed, report.skipped, report.total_elapsed_millis
        );
        Some(report)
    }

    // === Renaming ===

    /// Rename every completed image with a non-empty suggestion in one batch.
    ///
    /// On success the whole collection is cleared. On failure nothing in the
    /// collection changes and the error is returned. Returns the number of
    /// renames requested.
    pub async fn apply_renames(&self) -> Result<usize> {
        let batch: Vec<RenameRequest> = {
            let state = self.state();
            if state.processing == ProcessingStatus::Processing {
                return Err(ImagesaidError::BatchInFlight);
            }
            state
                .images
                .iter()
                .filter_map(|e| {
                    e.rename_target().map(|name| RenameRequest {
                        original_path: e.source_path.clone(),
                        new_name: name.to_string(),
                    })
                })
                .collect()
        };

        info!("Applying {} renames", batch.len());
        self.shared
            .renamer
            .apply_rename_batch(&batch)
            .await
            .map_err(|e| match e {
                ImagesaidError::Rename(_) => e,
                other => ImagesaidError::Rename(other.to_string()),
            })?;

        let mut state = self.state();
        state.images.clear();
        state.processing = ProcessingStatus::Idle;
        state.total_elapsed_millis = 0;
        Ok(batch.len())
    }

    // === Settings ===

    /// Back to built-in defaults. Images are kept, and a running batch keeps
    /// its status and elapsed time.
    pub fn reset_all_settings(&self) {
        let mut state = self.state();
        state.config = AppConfig::default();
        state.templates = TemplateRegistry::default();
        if state.processing != ProcessingStatus::Processing {
            state.processing = ProcessingStatus::Idle;
            state.total_elapsed_millis = 0;
        }
        self.persist(&state);
        info!("Settings reset to defaults");
    }

    /// Write any queued settings now
    pub fn flush_settings(&self) -> Result<()> {
        self.shared.settings.flush()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let state = self.state();
        StateSnapshot {
            images: state.images.entries().to_vec(),
            config: state.config.clone(),
            prompt: state.templates.prompt().to_string(),
            prompt_templates: state.templates.templates().to_vec(),
            current_template_id: state.templates.current_id().map(str::to_string),
            processing_status: state.processing,
            total_elapsed_millis: state.total_elapsed_millis,
            summary: state.images.summary(),
        }
    }
}

fn apply_discovery(config: &mut AppConfig, models: Vec<DiscoveredModel>) {
    let active = config.active_model_name.clone();
    config.available_models.reconcile(models, &active);
}

/// Message stored for the user: the collaborator's own text when it has one
fn failure_detail(e: ImagesaidError) -> String {
    match e {
        ImagesaidError::Inference(msg)
        | ImagesaidError::Connectivity(msg)
        | ImagesaidError::Discovery(msg) => msg,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GeneratedName;
    use crate::models::ModelDetails;
    use crate::settings::{MemoryStore, SETTINGS_KEY};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct ScriptedBackend {
        replies: HashMap<PathBuf, std::result::Result<GeneratedName, String>>,
        connection: Option<std::result::Result<String, String>>,
        models: Mutex<Vec<std::result::Result<Vec<DiscoveredModel>, String>>>,
        calls: Mutex<Vec<(PathBuf, String, u32)>>,
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl ScriptedBackend {
        fn reply(mut self, path: &str, reply: std::result::Result<(&str, u64), &str>) -> Self {
            self.replies.insert(
                PathBuf::from(path),
                reply
                    .map(|(name, ms)| GeneratedName { name: name.into(), elapsed_millis: ms })
                    .map_err(str::to_string),
            );
            self
        }

        fn calls(&self) -> Vec<(PathBuf, String, u32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        async fn test_connection(&self, _endpoint: &str) -> Result<String> {
            match self.connection.clone().unwrap_or_else(|| Ok("ok".into())) {
                Ok(msg) => Ok(msg),
                Err(msg) => Err(ImagesaidError::Connectivity(msg)),
            }
        }

        async fn list_models(&self, _endpoint: &str) -> Result<Vec<DiscoveredModel>> {
            let next = self.models.lock().unwrap().remove(0);
            next.map_err(ImagesaidError::Discovery)
        }

        async fn generate_name(&self, request: NameRequest<'_>) -> Result<GeneratedName> {
            self.calls.lock().unwrap().push((
                request.image_path.to_path_buf(),
                request.model.to_string(),
                request.context_length,
            ));
            if let Some((started, release)) = &self.gate {
                started.notify_one();
                release.notified().await;
            }
            match self.replies.get(request.image_path) {
                Some(Ok(name)) => Ok(name.clone()),
                Some(Err(msg)) => Err(ImagesaidError::Inference(msg.clone())),
                None => Ok(GeneratedName { name: "unnamed".into(), elapsed_millis: 1 }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingRenamer {
        batches: Mutex<Vec<Vec<RenameRequest>>>,
        fail: bool,
    }

    #[async_trait]
    impl RenameBackend for RecordingRenamer {
        async fn apply_rename_batch(&self, batch: &[RenameRequest]) -> Result<()> {
            self.batches.lock().unwrap().push(batch.to_vec());
            if self.fail {
                Err(ImagesaidError::Rename("disk full".into()))
            } else {
                Ok(())
            }
        }
    }

    fn model(name: &str) -> DiscoveredModel {
        DiscoveredModel {
            name: name.into(),
            details: ModelDetails::default(),
            ..DiscoveredModel::default()
        }
    }

    fn engine(backend: Arc<ScriptedBackend>, renamer: Arc<RecordingRenamer>) -> (Workflow, MemoryStore) {
        let store = MemoryStore::new();
        let workflow = Workflow::new(backend, renamer, Arc::new(store.clone()), &EngineOptions::default());
        (workflow, store)
    }

    fn images(paths: &[&str]) -> Vec<NewImage> {
        paths.iter().map(|p| NewImage::from_path(*p)).collect()
    }

    #[tokio::test]
    async fn batch_records_success_and_failure() {
        let backend = Arc::new(
            ScriptedBackend {
                models: Mutex::new(vec![Ok(vec![model("m")])]),
                ..ScriptedBackend::default()
            }
            .reply("/in/a.jpg", Ok(("  cat_sitting \n", 500)))
            .reply("/in/b.jpg", Err("timeout")),
        );
        let (workflow, _) = engine(backend.clone(), Arc::default());
        workflow.discover_models().await.unwrap();
        workflow.set_default_model("m").unwrap();
        workflow.set_model_context_length("m", 8192).unwrap();
        let ids = workflow.add_images(images(&["/in/a.jpg", "/in/b.jpg"]));

        let report = workflow.start_processing().await.unwrap();

        let a = workflow.image(&ids[0]).unwrap();
        assert_eq!(a.status, ImageStatus::Completed);
        assert_eq!(a.suggested_name, "cat_sitting");
        assert_eq!(a.elapsed_millis, Some(500));
        let b = workflow.image(&ids[1]).unwrap();
        assert_eq!(b.status, ImageStatus::Error);
        assert_eq!(b.error.as_deref(), Some("timeout"));
        assert_eq!(b.suggested_name, "");

        assert_eq!(workflow.total_elapsed_millis(), 500);
        assert_eq!(workflow.processing_status(), ProcessingStatus::Done);
        assert_eq!((report.completed, report.failed, report.skipped), (1, 1, 0));
        assert!(backend.calls().iter().all(|(_, m, ctx)| m == "m" && *ctx == 8192));
    }

    #[tokio::test]
    async fn failure_in_the_middle_does_not_stop_the_batch() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .reply("/in/1.jpg", Ok(("one", 10)))
                .reply("/in/2.jpg", Err("model crashed"))
                .reply("/in/3.jpg", Ok(("three", 30))),
        );
        let (workflow, _) = engine(backend.clone(), Arc::default());
        workflow.add_images(images(&["/in/1.jpg", "/in/2.jpg", "/in/3.jpg"]));

        workflow.start_processing().await.unwrap();

        let statuses: Vec<_> = workflow.images().iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            [ImageStatus::Completed, ImageStatus::Error, ImageStatus::Completed]
        );
        let order: Vec<_> = backend.calls().into_iter().map(|(p, _, _)| p).collect();
        assert_eq!(order, [PathBuf::from("/in/1.jpg"), "/in/2.jpg".into(), "/in/3.jpg".into()]);
        assert_eq!(workflow.total_elapsed_millis(), 40);
    }

    #[tokio::test]
    async fn fallback_context_without_default_model() {
        let backend = Arc::new(ScriptedBackend::default());
        let (workflow, _) = engine(backend.clone(), Arc::default());
        workflow.add_images(images(&["/in/a.jpg"]));
        let report = workflow.start_processing().await.unwrap();
        assert_eq!(report.context_length, 4096);
        assert_eq!(backend.calls()[0].2, 4096);
    }

    #[tokio::test]
    async fn nothing_pending_is_a_no_op() {
        let (workflow, _) = engine(Arc::default(), Arc::default());
        assert!(workflow.start_processing().await.is_none());
        assert_eq!(workflow.processing_status(), ProcessingStatus::Idle);
    }

    #[tokio::test]
    async fn edits_interleave_with_a_running_batch() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let backend = Arc::new(ScriptedBackend {
            gate: Some((started.clone(), release.clone())),
            ..ScriptedBackend::default()
        });
        let (workflow, _) = engine(backend.clone(), Arc::default());
        let ids = workflow.add_images(images(&["/in/a.jpg", "/in/b.jpg"]));

        let running = tokio::spawn({
            let workflow = workflow.clone();
            async move { workflow.start_processing().await }
        });
        started.notified().await;

        assert_eq!(workflow.processing_status(), ProcessingStatus::Processing);
        assert!(workflow.start_processing().await.is_none());
        assert!(matches!(
            workflow.rename_suggestion(&ids[0], "mine"),
            Err(ImagesaidError::Validation(_))
        ));
        assert!(matches!(workflow.apply_renames().await, Err(ImagesaidError::BatchInFlight)));
        let late = workflow.add_images(images(&["/in/c.jpg"]));
        workflow.remove_image(&ids[1]).unwrap();
        release.notify_one();

        let report = running.await.unwrap().unwrap();
        assert_eq!((report.processed, report.completed, report.skipped), (2, 1, 1));
        assert_eq!(workflow.image(&late[0]).unwrap().status, ImageStatus::Pending);
        assert_eq!(backend.calls().len(), 1);
        assert_eq!(workflow.processing_status(), ProcessingStatus::Done);
    }

    #[tokio::test]
    async fn reset_during_batch_keeps_it_exclusive() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let backend = Arc::new(ScriptedBackend {
            gate: Some((started.clone(), release.clone())),
            ..ScriptedBackend::default()
        });
        let (workflow, _) = engine(backend.clone(), Arc::default());
        workflow.add_images(images(&["/in/a.jpg"]));

        let running = tokio::spawn({
            let workflow = workflow.clone();
            async move { workflow.start_processing().await }
        });
        started.notified().await;

        workflow.reset_all_settings();
        assert_eq!(workflow.processing_status(), ProcessingStatus::Processing);
        workflow.add_images(images(&["/in/b.jpg"]));
        assert!(workflow.start_processing().await.is_none());

        release.notify_one();
        let report = running.await.unwrap().unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(backend.calls().len(), 1);
        assert_eq!(workflow.processing_status(), ProcessingStatus::Done);
        assert_eq!(workflow.config(), AppConfig::default());
    }

    #[tokio::test]
    async fn apply_renames_sends_completed_and_clears() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .reply("/in/a.jpg", Ok(("cat", 5)))
                .reply("/in/b.jpg", Err("bad"))
                .reply("/in/c.jpg", Ok(("   ", 5))),
        );
        let renamer = Arc::new(RecordingRenamer::default());
        let (workflow, _) = engine(backend, renamer.clone());
        workflow.add_images(images(&["/in/a.jpg", "/in/b.jpg", "/in/c.jpg"]));
        workflow.start_processing().await.unwrap();

        let count = workflow.apply_renames().await.unwrap();

        assert_eq!(count, 1);
        let batches = renamer.batches.lock().unwrap().clone();
        assert_eq!(
            batches,
            [vec![RenameRequest { original_path: "/in/a.jpg".into(), new_name: "cat".into() }]]
        );
        assert!(workflow.images().is_empty());
        assert_eq!(workflow.processing_status(), ProcessingStatus::Idle);
        assert_eq!(workflow.total_elapsed_millis(), 0);
    }

    #[tokio::test]
    async fn failed_rename_leaves_collection_untouched() {
        let renamer = Arc::new(RecordingRenamer { fail: true, ..RecordingRenamer::default() });
        let (workflow, _) = engine(Arc::default(), renamer);
        workflow.add_images(images(&["/in/a.jpg"]));
        workflow.start_processing().await.unwrap();
        let before = workflow.images();

        let err = workflow.apply_renames().await.unwrap_err();

        assert!(matches!(err, ImagesaidError::Rename(_)));
        assert_eq!(workflow.images(), before);
        assert_eq!(workflow.processing_status(), ProcessingStatus::Done);
    }

    #[tokio::test]
    async fn connection_states() {
        let backend = Arc::new(ScriptedBackend {
            connection: Some(Err("connection refused".into())),
            ..ScriptedBackend::default()
        });
        let (workflow, _) = engine(backend, Arc::default());
        assert_eq!(workflow.config().connection_state, ConnectionState::Idle);

        let check = workflow.connect_and_discover().await;
        assert_eq!(check.state, ConnectionState::Failed);
        assert_eq!(check.message.as_deref(), Some("connection refused"));
        assert_eq!(check.models_found, None);
    }

    #[tokio::test]
    async fn discovery_failure_keeps_registry_and_connection() {
        let backend = Arc::new(ScriptedBackend {
            models: Mutex::new(vec![Ok(vec![model("m"), model("n")]), Err("reset by peer".into())]),
            ..ScriptedBackend::default()
        });
        let (workflow, _) = engine(backend, Arc::default());

        let first = workflow.connect_and_discover().await;
        assert_eq!(first.models_found, Some(2));
        workflow.set_model_enabled("n", false).unwrap();

        let second = workflow.connect_and_discover().await;
        assert_eq!(second.state, ConnectionState::Success);
        assert!(second.discovery_error.unwrap().contains("reset by peer"));

        let config = workflow.config();
        assert_eq!(config.available_models.len(), 2);
        assert!(!config.available_models.is_enabled("n"));
        assert!(!config.models_loading);
    }

    #[tokio::test]
    async fn rediscovery_drops_vanished_models() {
        let backend = Arc::new(ScriptedBackend {
            models: Mutex::new(vec![
                Ok(vec![model("keep"), model("gone")]),
                Ok(vec![model("keep")]),
            ]),
            ..ScriptedBackend::default()
        });
        let (workflow, _) = engine(backend, Arc::default());
        workflow.discover_models().await.unwrap();
        workflow.set_model_enabled("gone", false).unwrap();
        workflow.set_model_enabled("keep", false).unwrap();
        workflow.discover_models().await.unwrap();

        let registry = workflow.config().available_models;
        assert!(registry.get("gone").is_none());
        assert!(!registry.is_enabled("keep"));
    }

    #[tokio::test]
    async fn set_default_updates_active_model() {
        let backend = Arc::new(ScriptedBackend {
            models: Mutex::new(vec![Ok(vec![model("m"), model("n")])]),
            ..ScriptedBackend::default()
        });
        let (workflow, _) = engine(backend, Arc::default());
        workflow.discover_models().await.unwrap();
        workflow.set_default_model("m").unwrap();
        workflow.set_default_model("n").unwrap();

        let config = workflow.config();
        assert_eq!(config.active_model_name, "n");
        let defaults: Vec<_> = config.available_models.iter().filter(|m| m.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].name, "n");
        assert!(workflow.set_default_model("ghost").is_err());
        assert!(!workflow.toggle_model_enabled("m").unwrap());
    }

    #[tokio::test]
    async fn deleting_current_template_resyncs_prompt() {
        let (workflow, _) = engine(Arc::default(), Arc::default());
        let pets = workflow.add_template("Pets", "Name the pet").unwrap();
        let food = workflow.add_template("Food", "Name the dish").unwrap();
        workflow.set_current_template(Some(&food.id)).unwrap();
        workflow.delete_template(&food.id).unwrap();

        let current = workflow.current_template_id().unwrap();
        let content = workflow
            .templates()
            .into_iter()
            .find(|t| t.id == current)
            .unwrap()
            .content;
        assert_eq!(workflow.prompt(), content);
        assert_ne!(current, food.id);
        assert!(workflow.templates().iter().any(|t| t.id == pets.id));
    }

    #[tokio::test]
    async fn settings_survive_a_restart() {
        let backend = Arc::new(ScriptedBackend {
            models: Mutex::new(vec![Ok(vec![model("m")])]),
            ..ScriptedBackend::default()
        });
        let (workflow, store) = engine(backend, Arc::default());
        workflow.connect_and_discover().await;
        workflow.set_model_context_length("m", 16_000).unwrap();
        let custom = workflow.add_template("Custom", "Name it").unwrap();
        workflow.set_current_template(Some(&custom.id)).unwrap();
        workflow.set_prompt("Name it well");
        workflow.flush_settings().unwrap();
        assert!(store.load(SETTINGS_KEY).unwrap().is_some());

        let before = workflow.snapshot();
        let reloaded = Workflow::new(
            Arc::new(ScriptedBackend::default()),
            Arc::new(RecordingRenamer::default()),
            Arc::new(store),
            &EngineOptions::default(),
        );
        let after = reloaded.snapshot();

        assert_eq!(after.config, before.config);
        assert_eq!(after.prompt_templates, before.prompt_templates);
        assert_eq!(after.current_template_id, before.current_template_id);
        assert_eq!(after.prompt, "Name it well");
    }

    #[tokio::test]
    async fn reset_restores_defaults_but_keeps_images() {
        let (workflow, _) = engine(Arc::default(), Arc::default());
        workflow.add_images(images(&["/in/a.jpg"]));
        workflow.add_template("Extra", "x").unwrap();
        workflow.update_config(ConfigPatch {
            api_endpoint: Some("http://elsewhere:1".into()),
            active_model_name: None,
        });

        workflow.reset_all_settings();

        let snapshot = workflow.snapshot();
        assert_eq!(snapshot.config, AppConfig::default());
        assert_eq!(snapshot.prompt_templates.len(), 1);
        assert_eq!(snapshot.images.len(), 1);
    }
}
