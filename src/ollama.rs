// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Ollama API client for local vision inference

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::backend::{GeneratedName, InferenceBackend, NameRequest};
use crate::config::EngineOptions;
use crate::imaging::encode_for_context;
use crate::models::{DiscoveredModel, ModelDetails};
use crate::naming::clean_filename;
use crate::{ImagesaidError, Result};

/// Appended to every user prompt so the reply is a bare file stem
const NAME_ONLY_SUFFIX: &str =
    ". Reply with the file name only, without an extension or any explanation.";

/// Path prefixes that come from a browser drop rather than the file system
const PLACEHOLDER_PREFIXES: [&str; 4] = ["blob:", "dev-", "browser-", "temp-"];

/// Ollama API client
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    connect_timeout: Duration,
    inference_timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    images: Vec<String>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_ctx: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    digest: String,
    #[serde(default)]
    details: TagDetails,
}

#[derive(Deserialize, Default)]
struct TagDetails {
    #[serde(default)]
    format: String,
    #[serde(default)]
    family: String,
    #[serde(default)]
    parameter_size: String,
    #[serde(default)]
    quantization_level: String,
    #[serde(default)]
    context_length: Option<u32>,
}

impl From<TagModel> for DiscoveredModel {
    fn from(m: TagModel) -> Self {
        Self {
            name: m.name,
            size_bytes: m.size,
            digest: m.digest,
            details: ModelDetails {
                format: m.details.format,
                family: m.details.family,
                parameter_size: m.details.parameter_size,
                quantization_level: m.details.quantization_level,
                context_length: m.details.context_length,
            },
        }
    }
}

/// Strip trailing slashes and API paths from a user-entered endpoint
pub fn normalize_endpoint(endpoint: &str) -> String {
    endpoint
        .trim()
        .trim_end_matches('/')
        .replace("/api/generate", "")
        .replace("/api/chat", "")
        .trim_end_matches('/')
        .to_string()
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(options: &EngineOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.inference_timeout)
            .build()?;

        Ok(Self {
            client,
            connect_timeout: options.connect_timeout,
            inference_timeout: options.inference_timeout,
        })
    }

    async fn fetch_tags(&self, endpoint: &str) -> Result<TagsResponse> {
        let base = normalize_endpoint(endpoint);
        let url = format!("{}/api/tags", base);

        let response = self
            .client
            .get(&url)
            .timeout(self.connect_timeout)
            .send()
            .await
            .map_err(|e| ImagesaidError::Discovery(format!("Cannot reach {}: {}", base, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImagesaidError::Discovery(format!(
                "Ollama returned status {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ImagesaidError::Discovery(format!("Invalid model list: {}", e)))
    }
}

fn check_image_path(path: &Path) -> Result<()> {
    let shown = path.to_string_lossy();
    if PLACEHOLDER_PREFIXES.iter().any(|p| shown.starts_with(p)) {
        return Err(ImagesaidError::Inference(format!(
            "{} is not a file on disk; add the image again from the file system",
            shown
        )));
    }
    if !path.is_file() {
        return Err(ImagesaidError::Inference(format!("File not found: {}", shown)));
    }
    Ok(())
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn test_connection(&self, endpoint: &str) -> Result<String> {
        let base = normalize_endpoint(endpoint);
        let url = format!("{}/api/tags", base);

        let response = self
            .client
            .get(&url)
            .timeout(self.connect_timeout)
            .send()
            .await
            .map_err(|e| {
                ImagesaidError::Connectivity(format!("Cannot connect to Ollama at {}: {}", base, e))
            })?;

        if !response.status().is_success() {
            return Err(ImagesaidError::Connectivity(format!(
                "HTTP {}",
                response.status()
            )));
        }

        info!("Ollama is running at {}", base);
        Ok(format!("Connected to Ollama at {}", base))
    }

    async fn list_models(&self, endpoint: &str) -> Result<Vec<DiscoveredModel>> {
        let tags = self.fetch_tags(endpoint).await?;
        debug!("Found {} models", tags.models.len());
        Ok(tags.models.into_iter().map(DiscoveredModel::from).collect())
    }

    async fn generate_name(&self, request: NameRequest<'_>) -> Result<GeneratedName> {
        let started = Instant::now();
        check_image_path(request.image_path)?;

        let path = request.image_path.to_path_buf();
        let context_length = request.context_length;
        let image = tokio::task::spawn_blocking(move || encode_for_context(&path, context_length))
            .await
            .map_err(|e| ImagesaidError::Inference(format!("Image preparation failed: {}", e)))?
            .map_err(|e| ImagesaidError::Inference(format!("Cannot read image: {}", e)))?;

        let body = GenerateRequest {
            model: request.model,
            prompt: format!("{}{}", request.prompt.trim_end(), NAME_ONLY_SUFFIX),
            stream: false,
            images: vec![image],
            options: GenerateOptions {
                num_ctx: request.context_length,
            },
        };

        let url = format!("{}/api/generate", normalize_endpoint(request.endpoint));
        debug!(
            "Sending vision request to Ollama: model={} num_ctx={}",
            request.model, request.context_length
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.inference_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ImagesaidError::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ImagesaidError::Inference(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ImagesaidError::Inference(format!("Invalid response: {}", e)))?;

        Ok(GeneratedName {
            name: clean_filename(&result.response),
            elapsed_millis: started.elapsed().as_millis() as u64,
        })
    }
}
