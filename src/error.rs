use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenerateError>;

/// Longest provider body excerpt carried in an error
pub const MAX_BODY_SNIPPET: usize = 200;

/// Failures of a single generation request
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The inbound request is unusable (missing prompt, bad data URL)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The request body exceeds the configured size limit
    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    /// A required external credential or endpoint is not configured
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The generation provider answered 400, usually its content-safety filter
    #[error("Provider rejected the request: {body}")]
    ProviderRejected { body: String },

    /// The generation provider answered with any other non-2xx status
    #[error("Provider API error ({status}): {body}")]
    ProviderTransport { status: u16, body: String },

    /// The provider could not be reached at all
    #[error("Connection error: {message}")]
    ProviderConnection { message: String, timed_out: bool },

    /// The provider answered 2xx with a body that does not parse
    #[error("Malformed provider response: {snippet}")]
    MalformedResponse { snippet: String },

    /// Publishing the input image to object storage failed
    #[error("Upload failed: {0}")]
    Upload(String),

    /// The prediction reached `failed` or `canceled`
    #[error("Prediction failed: {0}")]
    ProviderJobFailed(String),

    /// The prediction did not reach a terminal state within the attempt budget
    #[error("Prediction did not finish after {attempts} polls")]
    PollingTimeout { attempts: u32 },
}

impl GenerateError {
    pub fn rejected(body: &str) -> Self {
        Self::ProviderRejected {
            body: truncate_body(body),
        }
    }

    pub fn transport(status: u16, body: &str) -> Self {
        Self::ProviderTransport {
            status,
            body: truncate_body(body),
        }
    }

    pub fn malformed(body: &str) -> Self {
        Self::MalformedResponse {
            snippet: truncate_body(body),
        }
    }

    pub fn connection(err: &reqwest::Error) -> Self {
        Self::ProviderConnection {
            message: err.to_string(),
            timed_out: err.is_timeout(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Configuration(_) => "configuration_error",
            Self::ProviderRejected { .. } => "provider_rejected",
            Self::ProviderTransport { .. } => "provider_error",
            Self::ProviderConnection { .. } => "provider_unreachable",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Upload(_) => "upload_failed",
            Self::ProviderJobFailed(_) => "job_failed",
            Self::PollingTimeout { .. } => "polling_timeout",
        }
    }

    /// Message meant for the person in front of the browser
    pub fn client_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::PayloadTooLarge(_) => {
                "The request is too large, try a smaller reference image".to_string()
            }
            Self::Configuration(_) => {
                "The image service is not configured on this server".to_string()
            }
            Self::ProviderRejected { .. } => {
                "The image provider refused this prompt, most likely because of its content \
                 safety filter. Try rewording the description."
                    .to_string()
            }
            Self::ProviderTransport { status, body } => classify_transport(*status, body),
            Self::ProviderConnection { timed_out: true, .. } => {
                "The request timed out, please try again later".to_string()
            }
            Self::ProviderConnection { .. } => "Could not reach the image provider".to_string(),
            Self::MalformedResponse { .. } => {
                "The image provider returned an unexpected response".to_string()
            }
            Self::Upload(_) => "Uploading the reference image failed".to_string(),
            Self::ProviderJobFailed(detail) => format!("Image generation failed: {detail}"),
            Self::PollingTimeout { .. } => {
                "Image generation took too long, please try again later".to_string()
            }
        }
    }

    /// Diagnostic detail for operators; absent when the message says it all
    pub fn details(&self) -> Option<String> {
        match self {
            Self::Validation(_) | Self::ProviderJobFailed(_) => None,
            Self::Configuration(detail) | Self::Upload(detail) | Self::PayloadTooLarge(detail) => {
                Some(detail.clone())
            }
            Self::ProviderRejected { body } => Some(body.clone()),
            Self::ProviderTransport { status, body } => Some(format!("status {status}: {body}")),
            Self::ProviderConnection { message, .. } => Some(message.clone()),
            Self::MalformedResponse { snippet } => Some(snippet.clone()),
            Self::PollingTimeout { attempts } => Some(format!("gave up after {attempts} polls")),
        }
    }
}

fn classify_transport(status: u16, body: &str) -> String {
    let lowered = body.to_ascii_lowercase();
    match status {
        401 => "The provider rejected the API key, check the account credentials".to_string(),
        403 => "Access denied by the provider, check the API permissions".to_string(),
        429 => "The provider quota is exhausted or rate limited".to_string(),
        _ if lowered.contains("quota") || lowered.contains("billing") => {
            "The provider quota is exhausted or rate limited".to_string()
        }
        _ => format!("Image provider request failed with status {status}"),
    }
}

/// Cut a raw body down to [`MAX_BODY_SNIPPET`] characters
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_SNIPPET) {
        Some((index, _)) => format!("{}…", &body[..index]),
        None => body.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    timestamp: String,
}

impl IntoResponse for GenerateError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "generation request failed");
        } else {
            tracing::warn!(code = self.error_code(), error = %self, "generation request rejected");
        }

        let body = ErrorResponse {
            success: false,
            error: self.error_code(),
            message: self.client_message(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
