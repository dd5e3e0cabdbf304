use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{ImageOutput, assert_ok_response, endpoint, parse_body};
use crate::{
    config::{ImageApiConfig, SizeParam},
    error::{GenerateError, Result},
    size::AspectRatio,
};

/// OpenAI-compatible `/v1/images/generations` endpoint that answers
/// synchronously
pub struct ImageApiProvider {
    client: Client,
    config: ImageApiConfig,
}

/// Wire format for the generation request
#[derive(Serialize)]
struct ImagesRequest<'a> {
    prompt: &'a str,
    n: u32,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<&'a str>,
}

#[derive(Deserialize)]
struct ImagesResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: Option<String>,
    b64_json: Option<String>,
}

impl ImageApiProvider {
    pub fn new(client: Client, config: ImageApiConfig) -> Self {
        Self { client, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Generate one image; returns it together with the frame that was
    /// requested (a size such as `1536x1024`, or a ratio token)
    pub async fn generate(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<(ImageOutput, String)> {
        let size = aspect_ratio.output_size();
        let (frame, body) = match self.config.size_param {
            SizeParam::Size => (
                size.as_str(),
                ImagesRequest {
                    prompt,
                    n: 1,
                    model: &self.config.model,
                    size: Some(size.as_str()),
                    aspect_ratio: None,
                },
            ),
            SizeParam::AspectRatio => (
                aspect_ratio.as_token(),
                ImagesRequest {
                    prompt,
                    n: 1,
                    model: &self.config.model,
                    size: None,
                    aspect_ratio: Some(aspect_ratio.as_token()),
                },
            ),
        };

        tracing::info!(
            model = %self.config.model,
            frame,
            prompt_length = prompt.chars().count(),
            "sending image generation request"
        );

        let response = self
            .client
            .post(endpoint(&self.config.base_url, "images/generations"))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "image generation request failed");
                GenerateError::connection(&err)
            })?;

        let text = assert_ok_response(response).await?;
        let payload: ImagesResponse = parse_body(&text)?;

        let image = payload
            .data
            .into_iter()
            .next()
            .and_then(|datum| match (datum.b64_json, datum.url) {
                (Some(b64), _) if !b64.is_empty() => Some(ImageOutput::Base64Png(b64)),
                (_, Some(url)) if !url.is_empty() => Some(ImageOutput::Url(url)),
                _ => None,
            })
            .ok_or_else(|| GenerateError::malformed(&text))?;

        tracing::debug!(
            inline = matches!(image, ImageOutput::Base64Png(_)),
            "image generation request complete"
        );
        Ok((image, frame.to_string()))
    }
}
