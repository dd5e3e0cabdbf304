use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{PredictionSource, assert_ok_response, endpoint, parse_body};
use crate::{
    config::ReplicateConfig,
    error::{GenerateError, Result},
    size::AspectRatio,
};

/// Ratio hint telling the model to keep the input image's frame
pub const MATCH_INPUT_IMAGE: &str = "match_input_image";

/// Replicate-hosted model answering with a prediction job
pub struct ReplicateProvider {
    client: Client,
    config: ReplicateConfig,
}

#[derive(Serialize)]
struct PredictionRequest<'a> {
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_image: Option<&'a str>,
    aspect_ratio: &'a str,
    output_format: &'a str,
    safety_tolerance: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// Models answer with either one URL or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    Single(String),
    Many(Vec<String>),
}

impl PredictionOutput {
    pub fn first_url(&self) -> Option<&str> {
        let first = match self {
            Self::Single(url) => Some(url.as_str()),
            Self::Many(urls) => urls.first().map(String::as_str),
        };
        first.filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionUrls {
    pub get: Option<String>,
}

/// Provider-owned job state; only ever read here
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionJob {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<PredictionOutput>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
}

impl PredictionJob {
    pub fn output_url(&self) -> Option<&str> {
        self.output.as_ref().and_then(PredictionOutput::first_url)
    }

    /// Provider-reported failure reason, or the bare status when none was given
    pub fn error_detail(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(message)) if !message.is_empty() => message.clone(),
            Some(serde_json::Value::Null) | None => match self.status {
                PredictionStatus::Canceled => "prediction was canceled".to_string(),
                _ => "prediction failed without an error message".to_string(),
            },
            Some(other) => other.to_string(),
        }
    }
}

impl ReplicateProvider {
    pub fn new(client: Client, config: ReplicateConfig) -> Self {
        Self { client, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.config.api_token.expose_secret())
    }

    /// Submit a prediction. With an input image the output keeps that image's
    /// frame instead of the requested ratio.
    pub async fn create_prediction(
        &self,
        prompt: &str,
        input_image_url: Option<&str>,
        aspect_ratio: AspectRatio,
    ) -> Result<PredictionJob> {
        let ratio = match input_image_url {
            Some(_) => MATCH_INPUT_IMAGE,
            None => aspect_ratio.as_token(),
        };
        let body = PredictionRequest {
            input: PredictionInput {
                prompt,
                input_image: input_image_url,
                aspect_ratio: ratio,
                output_format: &self.config.output_format,
                safety_tolerance: self.config.safety_tolerance,
            },
        };

        tracing::info!(
            model = %self.config.model,
            aspect_ratio = ratio,
            with_image = input_image_url.is_some(),
            "creating prediction"
        );

        let url = endpoint(
            &self.config.base_url,
            &format!("models/{}/predictions", self.config.model),
        );
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "prediction request failed");
                GenerateError::connection(&err)
            })?;

        let text = assert_ok_response(response).await?;
        let job: PredictionJob = parse_body(&text)?;
        tracing::info!(prediction_id = %job.id, status = ?job.status, "prediction created");
        Ok(job)
    }

    /// Where to poll `job`: its advertised `urls.get` when that shares the
    /// configured API origin, else the canonical prediction path. The token
    /// is never sent to another host.
    pub fn status_url(&self, job: &PredictionJob) -> String {
        let api_origin = Url::parse(&self.config.base_url).ok().map(|url| url.origin());
        job.urls
            .as_ref()
            .and_then(|urls| urls.get.as_deref())
            .and_then(|raw| Url::parse(raw).ok())
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .filter(|url| api_origin.as_ref() == Some(&url.origin()))
            .map(String::from)
            .unwrap_or_else(|| endpoint(&self.config.base_url, &format!("predictions/{}", job.id)))
    }
}

#[async_trait]
impl PredictionSource for ReplicateProvider {
    async fn fetch_prediction(&self, url: &str) -> Result<PredictionJob> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|err| GenerateError::connection(&err))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| GenerateError::connection(&err))?;
        if !status.is_success() {
            return Err(GenerateError::transport(status.as_u16(), &text));
        }
        parse_body(&text)
    }
}
