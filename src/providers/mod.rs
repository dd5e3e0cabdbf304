pub mod openai;
pub mod poller;
pub mod replicate;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{GenerateError, Result};

pub use openai::ImageApiProvider;
pub use poller::{PredictionPoller, PredictionSource, ResolvedPrediction};
pub use replicate::{PredictionJob, PredictionOutput, PredictionStatus, ReplicateProvider};

/// A generated image as the provider handed it back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutput {
    Url(String),
    /// Raw base64 PNG payload, not yet wrapped in a data URL
    Base64Png(String),
}

impl ImageOutput {
    /// URL the browser can put straight into an `<img>`
    pub fn to_display_url(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Base64Png(payload) => format!("data:image/png;base64,{payload}"),
        }
    }
}

/// Read a generation endpoint's body, classifying non-2xx answers.
///
/// A 400 from an image provider is almost always its safety filter, so it
/// gets its own variant.
async fn assert_ok_response(response: Response) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| GenerateError::connection(&err))?;
    if status.is_success() {
        return Ok(body);
    }
    if status == StatusCode::BAD_REQUEST {
        return Err(GenerateError::rejected(&body));
    }
    Err(GenerateError::transport(status.as_u16(), &body))
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|err| {
        tracing::debug!(error = %err, "provider body did not parse");
        GenerateError::malformed(body)
    })
}

/// Join an API root and a path, tolerating roots given with or without `/v1`
fn endpoint(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);
    format!("{base}/v1/{}", path.trim_start_matches('/'))
}
