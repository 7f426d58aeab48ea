use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, get_service, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::{
    config::{self, UpstreamConfig},
    models::{parse_choice, Category, ModelDescriptor, Tier},
    playground::{
        AudioFile, API_KEY_HEADER, DEFAULT_IMAGE_COUNT, DEFAULT_IMAGE_SIZE, DEFAULT_MAX_TOKENS,
        DEFAULT_TEMPERATURE, DEFAULT_VOICE,
    },
    telemetry,
    upstream::Upstream,
};

const KEY_REQUIRED: &str = "API key required. Please add your a4f.co API key.";
const DEFAULT_TRANSCRIBE_MODEL: &str = "whisper-1";

type ApiFailure = (StatusCode, Json<Value>);

/**
 * \brief 启动代理后端：提供 /api 接口并可选地托管静态前端。
 * \param addr 监听地址，如 "127.0.0.1:8001"
 */
pub async fn run(addr: &str) -> Result<()> {
    let upstream = Upstream::new(UpstreamConfig::from_env())?;
    let mut app = router(upstream);

    if let Some(ui_root) = config::ui_dir().filter(|p| p.exists()) {
        let static_handler = ServeDir::new(ui_root).append_index_html_on_directories(true);
        app = app.fallback_service(get_service(static_handler));
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on http://{}", addr);
    telemetry::log_event("server", &format!("listening addr={}", addr));
    axum::serve(listener, app).await?;
    Ok(())
}

/**
 * \brief 构建路由，测试中可直接挂载。
 */
pub fn router(upstream: Upstream) -> Router {
    Router::new()
        .route("/api/models", get(list_models))
        .route("/api/models/{name}", get(get_model))
        .route("/api/playground/text", post(text_completion))
        .route("/api/playground/image", post(image_generation))
        .route("/api/playground/audio/transcribe", post(audio_transcription))
        .route("/api/playground/audio/generate", post(audio_generation))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(upstream))
}

#[derive(Deserialize, Debug)]
struct ModelsQuery {
    tier: Option<String>,
    category: Option<String>,
}

#[derive(Serialize, Debug)]
struct ModelsResponse {
    models: Vec<ModelDescriptor>,
    count: usize,
}

#[derive(Deserialize, Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct ImageRequest {
    model: String,
    prompt: String,
    size: Option<String>,
    n: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct SpeechRequest {
    model: String,
    input: String,
    voice: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TranscribeQuery {
    /** \brief 兼容把模型名放在查询串里的调用方 */
    model: Option<String>,
}

/**
 * \brief GET /api/models?tier=&category=
 */
async fn list_models(
    State(upstream): State<Arc<Upstream>>,
    query: Result<Query<ModelsQuery>, QueryRejection>,
) -> Result<Json<ModelsResponse>, ApiFailure> {
    let Query(q) = query.map_err(|r| rejected(r.status(), r.body_text()))?;
    let tier = parse_choice::<Tier>(q.tier.as_deref().unwrap_or("all")).map_err(bad_request)?;
    let category = parse_choice::<Category>(q.category.as_deref().unwrap_or("all"))
        .map_err(bad_request)?;

    let mut models = upstream.catalog(tier).await;
    if let Some(category) = category {
        models.retain(|m| m.category == category);
    }
    Ok(Json(ModelsResponse {
        count: models.len(),
        models,
    }))
}

/**
 * \brief GET /api/models/{name}，按 base_model 或 name 匹配。
 */
async fn get_model(
    State(upstream): State<Arc<Upstream>>,
    Path(name): Path<String>,
) -> Result<Json<ModelDescriptor>, ApiFailure> {
    upstream
        .catalog(None)
        .await
        .into_iter()
        .find(|m| m.base_model == name || m.name == name)
        .map(Json)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Model not found"))
}

async fn text_completion(
    State(upstream): State<Arc<Upstream>>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiFailure> {
    let api_key = require_key(&headers)?;
    let Json(req) = body.map_err(json_rejected)?;
    let body = json!({
        "model": req.model,
        "messages": req.messages,
        "temperature": req.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });
    telemetry::log_event(
        "server.text",
        &format!("model={} key={}", req.model, telemetry::mask_key(&api_key)),
    );
    upstream
        .chat_completion(&api_key, &body)
        .await
        .map(Json)
        .map_err(|e| upstream_err("server.text", e))
}

async fn image_generation(
    State(upstream): State<Arc<Upstream>>,
    headers: HeaderMap,
    body: Result<Json<ImageRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiFailure> {
    let api_key = require_key(&headers)?;
    let Json(req) = body.map_err(json_rejected)?;
    let body = json!({
        "model": req.model,
        "prompt": req.prompt,
        "size": req.size.as_deref().unwrap_or(DEFAULT_IMAGE_SIZE),
        "n": req.n.unwrap_or(DEFAULT_IMAGE_COUNT),
    });
    telemetry::log_event("server.image", &format!("model={}", req.model));
    upstream
        .image_generation(&api_key, &body)
        .await
        .map(Json)
        .map_err(|e| upstream_err("server.image", e))
}

async fn audio_transcription(
    State(upstream): State<Arc<Upstream>>,
    headers: HeaderMap,
    query: Result<Query<TranscribeQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiFailure> {
    let api_key = require_key(&headers)?;
    let Query(q) = query.map_err(|r| rejected(r.status(), r.body_text()))?;
    let mut multipart = multipart.map_err(|r| rejected(r.status(), r.body_text()))?;

    let mut file = None;
    let mut model = q.model;
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("audio").to_string();
                let mime_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_request)?.to_vec();
                file = Some(AudioFile {
                    file_name,
                    mime_type,
                    bytes,
                });
            }
            Some("model") => model = Some(field.text().await.map_err(bad_request)?),
            _ => {}
        }
    }
    let file = file.ok_or_else(|| detail(StatusCode::UNPROCESSABLE_ENTITY, "file is required"))?;
    let model = model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TRANSCRIBE_MODEL.to_string());

    telemetry::log_event(
        "server.transcribe",
        &format!("model={} bytes={}", model, file.bytes.len()),
    );
    upstream
        .audio_transcription(&api_key, &model, file)
        .await
        .map(Json)
        .map_err(|e| upstream_err("server.transcribe", e))
}

async fn audio_generation(
    State(upstream): State<Arc<Upstream>>,
    headers: HeaderMap,
    body: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiFailure> {
    let api_key = require_key(&headers)?;
    let Json(req) = body.map_err(json_rejected)?;
    let body = json!({
        "model": req.model,
        "input": req.input,
        "voice": req.voice.as_deref().unwrap_or(DEFAULT_VOICE),
    });
    telemetry::log_event("server.speech", &format!("model={}", req.model));
    let audio = upstream
        .audio_speech(&api_key, &body)
        .await
        .map_err(|e| upstream_err("server.speech", e))?;
    Ok(([(CONTENT_TYPE, "audio/mpeg")], audio))
}

fn require_key(headers: &HeaderMap) -> Result<String, ApiFailure> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .ok_or_else(|| detail(StatusCode::UNAUTHORIZED, KEY_REQUIRED))
}

fn detail(status: StatusCode, message: &str) -> ApiFailure {
    (status, Json(json!({ "detail": message })))
}

/**
 * \brief 请求体/查询串解析失败时同样返回 `{detail}`。
 */
fn rejected(status: StatusCode, text: String) -> ApiFailure {
    detail(status, &text)
}

fn json_rejected(r: JsonRejection) -> ApiFailure {
    rejected(r.status(), r.body_text())
}

fn bad_request<E: std::fmt::Display>(e: E) -> ApiFailure {
    detail(StatusCode::BAD_REQUEST, &e.to_string())
}

fn upstream_err(category: &str, e: anyhow::Error) -> ApiFailure {
    telemetry::log_error(category, &e.to_string());
    detail(
        StatusCode::INTERNAL_SERVER_ERROR,
        &format!("API request failed: {}", e),
    )
}
