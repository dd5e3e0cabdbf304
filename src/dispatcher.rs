use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use tokio::time::Instant;

use crate::{
    config::{AppConfig, PollingConfig},
    error::{GenerateError, Result},
    prompt::compose_prompt,
    providers::{ImageApiProvider, ImageOutput, PredictionPoller, ReplicateProvider},
    size::{AspectRatio, Quality},
    storage::{ImageUploader, ObjectStore},
};

/// One validated generation request
#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub description: String,
    pub aspect_ratio: AspectRatio,
    pub quality: Quality,
    /// Reference image as a data URL
    pub input_image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub image: ImageOutput,
    pub prompt: String,
    pub stats: GenerationStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStats {
    pub provider: &'static str,
    pub model: String,
    /// Frame sent to the provider: a size, a ratio token or `match_input_image`
    pub size: String,
    pub aspect_ratio: &'static str,
    pub quality: &'static str,
    pub prompt_length: usize,
    pub timings: Timings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timings {
    pub total: String,
}

impl Timings {
    fn since(started: Instant) -> Self {
        Self {
            total: format!("{}ms", started.elapsed().as_millis()),
        }
    }
}

enum Route<'a> {
    Synchronous(&'a ImageApiProvider),
    Prediction(&'a ReplicateProvider),
}

/// Picks a provider for each request and normalizes what comes back
pub struct GenerationDispatcher {
    image_api: Option<ImageApiProvider>,
    replicate: Option<ReplicateProvider>,
    uploader: ImageUploader,
    polling: PollingConfig,
}

impl GenerationDispatcher {
    pub fn new(config: &AppConfig, client: Client, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            image_api: config
                .image_api
                .clone()
                .map(|api| ImageApiProvider::new(client.clone(), api)),
            replicate: config
                .replicate
                .clone()
                .map(|replicate| ReplicateProvider::new(client.clone(), replicate)),
            uploader: ImageUploader::new(config.storage.clone(), store),
            polling: config.polling,
        }
    }

    /// Input images need the prediction provider, which reads images by URL.
    /// Text-only requests prefer the synchronous endpoint.
    fn route(&self, with_image: bool) -> Result<Route<'_>> {
        match (with_image, &self.image_api, &self.replicate) {
            (true, _, Some(replicate)) => Ok(Route::Prediction(replicate)),
            (true, _, None) => Err(GenerateError::Configuration(
                "REPLICATE_API_TOKEN is required to generate from an input image".to_string(),
            )),
            (false, Some(image_api), _) => Ok(Route::Synchronous(image_api)),
            (false, None, Some(replicate)) => Ok(Route::Prediction(replicate)),
            (false, None, None) => Err(GenerateError::Configuration(
                "no image provider configured, set IMAGE_API_KEY or REPLICATE_API_TOKEN"
                    .to_string(),
            )),
        }
    }

    pub async fn dispatch(&self, input: GenerationInput) -> Result<GenerationOutcome> {
        let started = Instant::now();
        match self.route(input.input_image.is_some())? {
            Route::Synchronous(provider) => self.run_synchronous(provider, &input, started).await,
            Route::Prediction(provider) => self.run_prediction(provider, &input, started).await,
        }
    }

    async fn run_synchronous(
        &self,
        provider: &ImageApiProvider,
        input: &GenerationInput,
        started: Instant,
    ) -> Result<GenerationOutcome> {
        let prompt = compose_prompt(&input.description, None);
        let (image, frame) = provider.generate(&prompt, input.aspect_ratio).await?;

        let stats = GenerationStats {
            provider: "openai-compatible",
            model: provider.model().to_string(),
            size: frame,
            aspect_ratio: input.aspect_ratio.as_token(),
            quality: input.quality.as_str(),
            prompt_length: prompt.chars().count(),
            timings: Timings::since(started),
            prediction_id: None,
            poll_attempts: None,
            uploaded_image_url: None,
        };
        tracing::info!(total = %stats.timings.total, "image generated");

        Ok(GenerationOutcome {
            image,
            prompt,
            stats,
        })
    }

    async fn run_prediction(
        &self,
        provider: &ReplicateProvider,
        input: &GenerationInput,
        started: Instant,
    ) -> Result<GenerationOutcome> {
        let uploaded = match input.input_image.as_deref() {
            Some(data_url) => Some(self.uploader.upload_data_url(data_url).await?),
            None => None,
        };
        let reference_url = uploaded.as_ref().map(|asset| asset.public_url.as_str());

        let prompt = compose_prompt(&input.description, reference_url);
        let job = provider
            .create_prediction(&prompt, reference_url, input.aspect_ratio)
            .await?;

        let status_url = provider.status_url(&job);
        let resolved = PredictionPoller::new(provider, self.polling)
            .resolve(&job, &status_url)
            .await?;

        let frame = match reference_url {
            Some(_) => crate::providers::replicate::MATCH_INPUT_IMAGE,
            None => input.aspect_ratio.as_token(),
        };
        let stats = GenerationStats {
            provider: "replicate",
            model: provider.model().to_string(),
            size: frame.to_string(),
            aspect_ratio: input.aspect_ratio.as_token(),
            quality: input.quality.as_str(),
            prompt_length: prompt.chars().count(),
            timings: Timings::since(started),
            prediction_id: Some(job.id.clone()),
            poll_attempts: Some(resolved.attempts),
            uploaded_image_url: uploaded.map(|asset| asset.public_url),
        };
        tracing::info!(
            prediction_id = %job.id,
            attempts = resolved.attempts,
            total = %stats.timings.total,
            "prediction resolved"
        );

        Ok(GenerationOutcome {
            image: ImageOutput::Url(resolved.output_url),
            prompt,
            stats,
        })
    }
}
