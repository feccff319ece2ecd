// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! JSON API for a browser front end

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{AppConfig, ConfigPatch, ConnectionState};
use crate::images::ImageEntry;
use crate::imaging::read_image_preview;
use crate::intake::collect_images;
use crate::models::ModelRegistry;
use crate::templates::{PromptTemplate, TemplatePatch};
use crate::workflow::{BatchReport, ConnectionCheck, StateSnapshot, Workflow};
use crate::ImagesaidError;

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub struct ApiError(ImagesaidError);

impl From<ImagesaidError> for ApiError {
    fn from(e: ImagesaidError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ImagesaidError::NotFound { .. } => StatusCode::NOT_FOUND,
            ImagesaidError::BatchInFlight => StatusCode::CONFLICT,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            ImagesaidError::Connectivity(_)
            | ImagesaidError::Discovery(_)
            | ImagesaidError::Inference(_)
            | ImagesaidError::Rename(_)
            | ImagesaidError::Api(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Create the API router
pub fn create_router(workflow: Workflow) -> Router {
    Router::new()
        .route("/api/state", get(api_get_state).delete(api_reset_settings))
        .route(
            "/api/images",
            get(api_get_images).post(api_add_images).delete(api_clear_images),
        )
        .route(
            "/api/images/:id",
            get(api_get_image).patch(api_rename_image).delete(api_remove_image),
        )
        .route("/api/process", post(api_process))
        .route("/api/apply", post(api_apply))
        .route("/api/templates", get(api_get_templates).post(api_add_template))
        .route("/api/templates/current", post(api_use_template))
        .route("/api/templates/save", post(api_save_template))
        .route(
            "/api/templates/:id",
            patch(api_update_template).delete(api_delete_template),
        )
        .route("/api/models", get(api_get_models).post(api_refresh_models))
        .route("/api/models/*name", patch(api_update_model))
        .route(
            "/api/connection",
            get(api_get_connection).post(api_connect).put(api_update_connection),
        )
        .route("/api/prompt", get(api_get_prompt).put(api_set_prompt))
        .route("/api/preview", get(api_preview))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(workflow)
}

// === State ===

async fn api_get_state(State(workflow): State<Workflow>) -> Json<StateSnapshot> {
    Json(workflow.snapshot())
}

async fn api_reset_settings(State(workflow): State<Workflow>) -> Json<StateSnapshot> {
    workflow.reset_all_settings();
    Json(workflow.snapshot())
}

// === Images ===

async fn api_get_images(State(workflow): State<Workflow>) -> Json<Vec<ImageEntry>> {
    Json(workflow.images())
}

#[derive(Debug, Deserialize)]
struct AddImagesRequest {
    paths: Vec<PathBuf>,
    #[serde(default)]
    recursive: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct AddImagesResponse {
    ids: Vec<String>,
}

async fn api_add_images(
    State(workflow): State<Workflow>,
    Json(request): Json<AddImagesRequest>,
) -> Json<AddImagesResponse> {
    let images = collect_images(&request.paths, request.recursive);
    Json(AddImagesResponse {
        ids: workflow.add_images(images),
    })
}

async fn api_clear_images(State(workflow): State<Workflow>) -> StatusCode {
    workflow.clear_images();
    StatusCode::NO_CONTENT
}

async fn api_get_image(State(workflow): State<Workflow>, Path(id): Path<String>) -> ApiResult<ImageEntry> {
    workflow
        .image(&id)
        .map(Json)
        .ok_or_else(|| ImagesaidError::not_found("image", id).into())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameImageRequest {
    suggested_name: String,
}

async fn api_rename_image(
    State(workflow): State<Workflow>,
    Path(id): Path<String>,
    Json(request): Json<RenameImageRequest>,
) -> ApiResult<ImageEntry> {
    Ok(Json(workflow.rename_suggestion(&id, &request.suggested_name)?))
}

async fn api_remove_image(
    State(workflow): State<Workflow>,
    Path(id): Path<String>,
) -> ApiResult<ImageEntry> {
    Ok(Json(workflow.remove_image(&id)?))
}

// === Processing ===

#[derive(Debug, Default, Deserialize)]
struct ProcessQuery {
    #[serde(default)]
    wait: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProcessResponse {
    started: bool,
    report: Option<BatchReport>,
}

/// Start a batch. Runs in the background unless `?wait=true`.
async fn api_process(
    State(workflow): State<Workflow>,
    Query(query): Query<ProcessQuery>,
) -> (StatusCode, Json<ProcessResponse>) {
    if query.wait {
        let report = workflow.start_processing().await;
        return (
            StatusCode::OK,
            Json(ProcessResponse {
                started: report.is_some(),
                report,
            }),
        );
    }

    let snapshot = workflow.snapshot();
    let startable = snapshot.summary.pending > 0
        && snapshot.processing_status != crate::workflow::ProcessingStatus::Processing;
    if startable {
        tokio::spawn(async move {
            workflow.start_processing().await;
        });
    }
    (
        if startable { StatusCode::ACCEPTED } else { StatusCode::OK },
        Json(ProcessResponse {
            started: startable,
            report: None,
        }),
    )
}

#[derive(Debug, Serialize, Deserialize)]
struct ApplyResponse {
    renamed: usize,
}

async fn api_apply(State(workflow): State<Workflow>) -> ApiResult<ApplyResponse> {
    let renamed = workflow.apply_renames().await?;
    Ok(Json(ApplyResponse { renamed }))
}

// === Templates ===

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplatesResponse {
    templates: Vec<PromptTemplate>,
    current_template_id: Option<String>,
}

fn templates_response(workflow: &Workflow) -> Json<TemplatesResponse> {
    Json(TemplatesResponse {
        templates: workflow.templates(),
        current_template_id: workflow.current_template_id(),
    })
}

async fn api_get_templates(State(workflow): State<Workflow>) -> Json<TemplatesResponse> {
    templates_response(&workflow)
}

#[derive(Debug, Deserialize)]
struct NewTemplateRequest {
    name: String,
    content: String,
}

async fn api_add_template(
    State(workflow): State<Workflow>,
    Json(request): Json<NewTemplateRequest>,
) -> std::result::Result<(StatusCode, Json<PromptTemplate>), ApiError> {
    let template = workflow.add_template(&request.name, &request.content)?;
    Ok((StatusCode::CREATED, Json(template)))
}

async fn api_update_template(
    State(workflow): State<Workflow>,
    Path(id): Path<String>,
    Json(patch): Json<TemplatePatch>,
) -> ApiResult<PromptTemplate> {
    Ok(Json(workflow.update_template(&id, patch)?))
}

async fn api_delete_template(
    State(workflow): State<Workflow>,
    Path(id): Path<String>,
) -> ApiResult<TemplatesResponse> {
    workflow.delete_template(&id)?;
    Ok(templates_response(&workflow))
}

#[derive(Debug, Deserialize)]
struct UseTemplateRequest {
    id: Option<String>,
}

async fn api_use_template(
    State(workflow): State<Workflow>,
    Json(request): Json<UseTemplateRequest>,
) -> ApiResult<TemplatesResponse> {
    workflow.set_current_template(request.id.as_deref())?;
    Ok(templates_response(&workflow))
}

#[derive(Debug, Deserialize)]
struct SaveTemplateRequest {
    /// Save as a new template with this name; overwrite the current one if absent
    name: Option<String>,
}

async fn api_save_template(
    State(workflow): State<Workflow>,
    Json(request): Json<SaveTemplateRequest>,
) -> ApiResult<PromptTemplate> {
    let template = match request.name {
        Some(name) => workflow.save_prompt_as(&name)?,
        None => workflow.save_prompt_to_current()?,
    };
    Ok(Json(template))
}

// === Models ===

async fn api_get_models(State(workflow): State<Workflow>) -> Json<ModelRegistry> {
    Json(workflow.config().available_models)
}

async fn api_refresh_models(State(workflow): State<Workflow>) -> ApiResult<ModelRegistry> {
    workflow.discover_models().await?;
    Ok(Json(workflow.config().available_models))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelUpdate {
    enabled: Option<bool>,
    context_length: Option<i64>,
    #[serde(default)]
    make_default: bool,
}

async fn api_update_model(
    State(workflow): State<Workflow>,
    Path(name): Path<String>,
    Json(update): Json<ModelUpdate>,
) -> ApiResult<ModelRegistry> {
    // Check the whole update on a copy so a rejected request changes nothing
    let mut checked = workflow.config().available_models;
    if let Some(enabled) = update.enabled {
        checked.set_enabled(&name, enabled)?;
    }
    if let Some(length) = update.context_length {
        checked.set_context_length(&name, length)?;
    }
    if update.make_default && !checked.is_enabled(&name) {
        return Err(ImagesaidError::Validation(format!(
            "model {} is disabled and cannot be the default",
            name
        ))
        .into());
    }

    if let Some(enabled) = update.enabled {
        workflow.set_model_enabled(&name, enabled)?;
    }
    if let Some(length) = update.context_length {
        workflow.set_model_context_length(&name, length)?;
    }
    if update.make_default {
        workflow.set_default_model(&name)?;
    }
    Ok(Json(workflow.config().available_models))
}

// === Connection and prompt ===

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionResponse {
    api_endpoint: String,
    active_model_name: String,
    state: ConnectionState,
    message: Option<String>,
}

impl From<AppConfig> for ConnectionResponse {
    fn from(config: AppConfig) -> Self {
        Self {
            api_endpoint: config.api_endpoint,
            active_model_name: config.active_model_name,
            state: config.connection_state,
            message: config.connection_message,
        }
    }
}

async fn api_get_connection(State(workflow): State<Workflow>) -> Json<ConnectionResponse> {
    Json(workflow.config().into())
}

async fn api_update_connection(
    State(workflow): State<Workflow>,
    Json(patch): Json<ConfigPatch>,
) -> Json<ConnectionResponse> {
    Json(workflow.update_config(patch).into())
}

async fn api_connect(State(workflow): State<Workflow>) -> Json<ConnectionCheck> {
    Json(workflow.connect_and_discover().await)
}

#[derive(Debug, Serialize, Deserialize)]
struct PromptBody {
    prompt: String,
}

async fn api_get_prompt(State(workflow): State<Workflow>) -> Json<PromptBody> {
    Json(PromptBody {
        prompt: workflow.prompt(),
    })
}

async fn api_set_prompt(
    State(workflow): State<Workflow>,
    Json(body): Json<PromptBody>,
) -> Json<PromptBody> {
    workflow.set_prompt(&body.prompt);
    Json(PromptBody {
        prompt: workflow.prompt(),
    })
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreviewResponse {
    data_url: String,
}

async fn api_preview(Query(query): Query<PreviewQuery>) -> ApiResult<PreviewResponse> {
    let data_url = tokio::task::spawn_blocking(move || read_image_preview(&query.path))
        .await
        .map_err(|e| ImagesaidError::Validation(format!("preview task failed: {}", e)))??;
    Ok(Json(PreviewResponse { data_url }))
}

/// Serve the API on `addr` until the process is stopped
pub async fn start_server(workflow: Workflow, addr: &str) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API available at http://{}", addr);

    axum::serve(listener, create_router(workflow))
        .await
        .map_err(|e| ImagesaidError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GeneratedName, InferenceBackend, NameRequest, RenameBackend, RenameRequest};
    use crate::config::EngineOptions;
    use crate::images::{ImageStatus, NewImage};
    use crate::models::DiscoveredModel;
    use crate::settings::MemoryStore;
    use crate::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct FakeBackend;

    #[async_trait]
    impl InferenceBackend for FakeBackend {
        async fn test_connection(&self, _endpoint: &str) -> Result<String> {
            Ok("Connected".into())
        }

        async fn list_models(&self, _endpoint: &str) -> Result<Vec<DiscoveredModel>> {
            Ok(vec![
                DiscoveredModel { name: "llava:7b".into(), ..DiscoveredModel::default() },
                DiscoveredModel { name: "moondream".into(), ..DiscoveredModel::default() },
            ])
        }

        async fn generate_name(&self, request: NameRequest<'_>) -> Result<GeneratedName> {
            let stem = request
                .image_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(GeneratedName { name: format!("named_{}", stem), elapsed_millis: 3 })
        }
    }

    struct NoopRenamer;

    #[async_trait]
    impl RenameBackend for NoopRenamer {
        async fn apply_rename_batch(&self, _batch: &[RenameRequest]) -> Result<()> {
            Ok(())
        }
    }

    fn workflow() -> Workflow {
        Workflow::new(
            Arc::new(FakeBackend),
            Arc::new(NoopRenamer),
            Arc::new(MemoryStore::new()),
            &EngineOptions::default(),
        )
    }

    async fn call(router: Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn state_reports_defaults() {
        let (status, json) = call(create_router(workflow()), Method::GET, "/api/state", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["processingStatus"], "idle");
        assert_eq!(json["currentTemplateId"], "default");
        assert_eq!(json["config"]["apiEndpoint"], "http://localhost:11434");
    }

    #[tokio::test]
    async fn process_and_apply_round() {
        let workflow = workflow();
        workflow.add_images(vec![NewImage::from_path("/in/cat.jpg")]);
        let router = create_router(workflow.clone());

        let (status, json) = call(router.clone(), Method::POST, "/api/process?wait=true", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["started"], true);
        assert_eq!(json["report"]["completed"], 1);
        assert_eq!(workflow.images()[0].status, ImageStatus::Completed);
        assert_eq!(workflow.images()[0].suggested_name, "named_cat");

        let (status, json) = call(router, Method::POST, "/api/apply", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["renamed"], 1);
        assert!(workflow.images().is_empty());
    }

    #[tokio::test]
    async fn unknown_image_is_404() {
        let (status, json) =
            call(create_router(workflow()), Method::GET, "/api/images/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn builtin_template_cannot_be_deleted() {
        let (status, _) =
            call(create_router(workflow()), Method::DELETE, "/api/templates/default", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn disabled_model_cannot_become_default() {
        let workflow = workflow();
        let router = create_router(workflow.clone());
        let (_, json) = call(router.clone(), Method::POST, "/api/connection", None).await;
        assert_eq!(json["state"], "success");
        assert_eq!(json["modelsFound"], 2);

        let (status, _) = call(
            router.clone(),
            Method::PATCH,
            "/api/models/moondream",
            Some(serde_json::json!({"enabled": false, "makeDefault": true})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(workflow.config().available_models.is_enabled("moondream"));

        let (status, _) = call(
            router.clone(),
            Method::PATCH,
            "/api/models/moondream",
            Some(serde_json::json!({"enabled": false, "contextLength": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(workflow.config().available_models.is_enabled("moondream"));

        let (status, json) = call(
            router,
            Method::PATCH,
            "/api/models/llava:7b",
            Some(serde_json::json!({"contextLength": 8192, "makeDefault": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(workflow.config().active_model_name, "llava:7b");
        assert!(json.as_array().unwrap().iter().any(|m| m["isDefault"] == true
            && m["customContextLength"] == 8192));
    }

    #[tokio::test]
    async fn prompt_round_trip_and_save_as_template() {
        let workflow = workflow();
        let router = create_router(workflow.clone());
        call(
            router.clone(),
            Method::PUT,
            "/api/prompt",
            Some(serde_json::json!({"prompt": "Describe the scene"})),
        )
        .await;
        let (status, json) = call(
            router,
            Method::POST,
            "/api/templates/save",
            Some(serde_json::json!({"name": "Scenes"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["content"], "Describe the scene");
        assert_eq!(workflow.templates().len(), 2);
    }
}
