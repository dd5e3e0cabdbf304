use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    config::AppConfig,
    dispatcher::{GenerationDispatcher, GenerationInput, GenerationStats},
    error::GenerateError,
    prompt::MAX_DESCRIPTION_CHARS,
    providers::ImageOutput,
    size::{AspectRatio, Quality},
    storage::ObjectStore,
};

/// Shared, read-only state behind every request
pub struct AppState {
    dispatcher: GenerationDispatcher,
}

impl AppState {
    pub fn new(config: &AppConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            dispatcher: GenerationDispatcher::new(config, client, store),
        })
    }
}

/// Inbound body of `POST /api/generate`
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(rename = "aspectRatio", default, deserialize_with = "lenient_token")]
    pub aspect_ratio: Option<String>,
    #[serde(default, deserialize_with = "lenient_token")]
    pub quality: Option<String>,
    pub input_image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(rename = "imageUrl", serialize_with = "serialize_image")]
    pub image: ImageOutput,
    pub message: String,
    pub prompt: String,
    pub stats: GenerationStats,
}

/// Option tokens that are not strings are treated as absent, so they fall
/// back to defaults instead of failing the request
fn lenient_token<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(token) => Some(token),
        _ => None,
    })
}

fn serialize_image<S: Serializer>(image: &ImageOutput, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&image.to_display_url())
}

pub fn router(config: &AppConfig, state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route(
            "/api/generate",
            post(generate).layer(DefaultBodyLimit::max(config.body_limit_bytes)),
        )
        .route("/health", get(health))
        .with_state(state);

    let router = match &config.static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };
    router.layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

fn validate(request: GenerateRequest) -> Result<GenerationInput, GenerateError> {
    let description = request.prompt.trim().to_string();
    let input_image = request
        .input_image
        .filter(|value| !value.trim().is_empty());

    if description.is_empty() && input_image.is_none() {
        return Err(GenerateError::Validation(
            "Please enter a scene description or upload a reference image".to_string(),
        ));
    }
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(GenerateError::Validation(format!(
            "The description is limited to {MAX_DESCRIPTION_CHARS} characters"
        )));
    }

    Ok(GenerationInput {
        description,
        aspect_ratio: AspectRatio::from_token(request.aspect_ratio.as_deref()),
        quality: Quality::from_token(request.quality.as_deref()),
        input_image,
    })
}

fn reject_body(rejection: JsonRejection) -> GenerateError {
    match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => GenerateError::PayloadTooLarge(rejection.body_text()),
        _ => GenerateError::Validation(rejection.body_text()),
    }
}

async fn generate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, GenerateError> {
    let Json(request) = payload.map_err(reject_body)?;
    let input = validate(request)?;

    tracing::info!(
        aspect_ratio = input.aspect_ratio.as_token(),
        quality = input.quality.as_str(),
        description_length = input.description.chars().count(),
        with_image = input.input_image.is_some(),
        "generation requested"
    );

    let outcome = state.dispatcher.dispatch(input).await?;
    Ok(Json(GenerateResponse {
        success: true,
        image: outcome.image,
        message: "Image generated".to_string(),
        prompt: outcome.prompt,
        stats: outcome.stats,
    }))
}
