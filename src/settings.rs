// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Durable settings and the debounced save queue

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::templates::{PromptTemplate, TemplateRegistry, DEFAULT_TEMPLATE_ID};
use crate::{ImagesaidError, Result};

/// Key of the single settings record
pub const SETTINGS_KEY: &str = "imagesaid-settings";

/// String-keyed durable blob store
pub trait SettingsStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn store(&self, key: &str, value: &str) -> Result<()>;
}

/// Key-value pairs kept as one JSON object on disk
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            ImagesaidError::Settings(format!("Failed to parse {:?}: {}", self.path, e))
        })
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_map()?.remove(key))
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&map)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-process store for tests and throwaway runs
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// The persisted record: connection settings, models and prompts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsDocument {
    #[serde(flatten)]
    pub config: AppConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub prompt_templates: Vec<PromptTemplate>,
    #[serde(default = "default_current_template")]
    pub current_template_id: Option<String>,
}

fn default_current_template() -> Option<String> {
    Some(DEFAULT_TEMPLATE_ID.to_string())
}

impl Default for SettingsDocument {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            prompt: None,
            prompt_templates: vec![PromptTemplate::builtin()],
            current_template_id: default_current_template(),
        }
    }
}

impl SettingsDocument {
    pub fn capture(config: &AppConfig, templates: &TemplateRegistry) -> Self {
        Self {
            config: config.clone(),
            prompt: Some(templates.prompt().to_string()),
            prompt_templates: templates.templates().to_vec(),
            current_template_id: templates.current_id().map(str::to_string),
        }
    }

    /// Split into live state, repairing transient and dangling fields
    pub fn into_parts(self) -> (AppConfig, TemplateRegistry) {
        let mut config = self.config;
        config.normalize_transient();
        let templates =
            TemplateRegistry::restore(self.prompt_templates, self.current_template_id, self.prompt);
        (config, templates)
    }
}

/// Read the settings record, falling back to defaults when it is missing
/// or unreadable.
pub fn load_document(store: &dyn SettingsStore) -> SettingsDocument {
    match store.load(SETTINGS_KEY) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(doc) => {
                debug!("Loaded settings record ({} bytes)", raw.len());
                doc
            }
            Err(e) => {
                warn!("Ignoring unreadable settings record: {}", e);
                SettingsDocument::default()
            }
        },
        Ok(None) => {
            info!("No saved settings, using defaults");
            SettingsDocument::default()
        }
        Err(e) => {
            warn!("Failed to read settings: {}", e);
            SettingsDocument::default()
        }
    }
}

/// Debounced, coalescing writer for the settings record.
///
/// Holds at most one pending snapshot; newer snapshots replace older ones.
/// A background task writes the newest snapshot on the blocking pool once
/// the debounce delay has passed. Without a Tokio runtime every save is written immediately.
pub struct SettingsSync {
    store: Arc<dyn SettingsStore>,
    slot: Arc<Mutex<Option<SettingsDocument>>>,
    wake: Arc<Notify>,
    worker: Option<JoinHandle<()>>,
}

impl SettingsSync {
    pub fn new(store: Arc<dyn SettingsStore>, debounce: Duration) -> Self {
        let slot = Arc::new(Mutex::new(None));
        let wake = Arc::new(Notify::new());

        let worker = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let store = Arc::clone(&store);
            let slot = Arc::clone(&slot);
            let wake = Arc::clone(&wake);
            handle.spawn(async move {
                loop {
                    wake.notified().await;
                    tokio::time::sleep(debounce).await;
                    let (store, slot) = (Arc::clone(&store), Arc::clone(&slot));
                    match tokio::task::spawn_blocking(move || write_pending(store.as_ref(), &slot)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!("Failed to save settings: {}", e),
                        Err(e) => warn!("Settings writer task failed: {}", e),
                    }
                }
            })
        });

        Self {
            store,
            slot,
            wake,
            worker,
        }
    }

    /// Queue a snapshot for writing
    pub fn schedule(&self, doc: SettingsDocument) {
        *lock_slot(&self.slot) = Some(doc);
        if self.worker.is_some() {
            self.wake.notify_one();
        } else if let Err(e) = self.flush() {
            warn!("Failed to save settings: {}", e);
        }
    }

    /// Write the pending snapshot now, if any
    pub fn flush(&self) -> Result<()> {
        write_pending(self.store.as_ref(), &self.slot)
    }

    pub fn has_pending(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }
}

impl Drop for SettingsSync {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        if let Err(e) = self.flush() {
            warn!("Failed to save settings on shutdown: {}", e);
        }
    }
}

fn lock_slot(slot: &Mutex<Option<SettingsDocument>>) -> MutexGuard<'_, Option<SettingsDocument>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

// The slot stays locked through the write so an older snapshot can never
// land after a newer one.
fn write_pending(store: &dyn SettingsStore, slot: &Mutex<Option<SettingsDocument>>) -> Result<()> {
    let mut pending = lock_slot(slot);
    if let Some(doc) = pending.take() {
        let json = serde_json::to_string(&doc)?;
        store.store(SETTINGS_KEY, &json)?;
        debug!("Settings saved");
    }
    Ok(())
}
