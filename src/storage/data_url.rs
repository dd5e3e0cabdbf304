use base64::Engine;

use crate::error::{GenerateError, Result};

/// A decoded `data:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// Declared MIME type, lowercased; empty declarations become
    /// `application/octet-stream`
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Decode `data:<mime>;base64,<payload>`.
///
/// Only base64 payloads are accepted; percent-encoded text data URLs never
/// carry images from the front-end.
pub fn parse_data_url(raw: &str) -> Result<DataUrl> {
    let rest = raw
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| GenerateError::Validation("input_image must be a data URL".to_string()))?;
    let (header, payload) = rest.split_once(',').ok_or_else(|| {
        GenerateError::Validation("input_image data URL has no payload".to_string())
    })?;

    let mut params = header.split(';');
    let mime_type = params
        .next()
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    if !params.any(|param| param.trim().eq_ignore_ascii_case("base64")) {
        return Err(GenerateError::Validation(
            "input_image data URL must be base64 encoded".to_string(),
        ));
    }

    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| {
            GenerateError::Validation(format!("input_image is not valid base64: {err}"))
        })?;
    if bytes.is_empty() {
        return Err(GenerateError::Validation("input_image is empty".to_string()));
    }

    Ok(DataUrl { mime_type, bytes })
}
