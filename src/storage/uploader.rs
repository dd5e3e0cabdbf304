use std::sync::Arc;

use base64::Engine;
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use super::{BucketTarget, ObjectStore, PutObject, get_extension_from_mime_type, parse_data_url};
use crate::{
    config::StorageConfig,
    error::{GenerateError, Result},
    image_processing,
};

/// An input image published to the bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub public_url: String,
    pub content_type: String,
    pub key: String,
}

/// Publishes data-URL images to an S3-compatible bucket so models that only
/// take image URLs can read them
pub struct ImageUploader {
    config: StorageConfig,
    store: Arc<dyn ObjectStore>,
}

struct ResolvedStorage {
    target: BucketTarget,
    public_base_url: String,
}

impl ImageUploader {
    pub fn new(config: StorageConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self { config, store }
    }

    /// Decode `data_url` and store it under a fresh random key.
    ///
    /// Configuration is checked before anything else. Payloads that do not
    /// sniff as a raster image are refused; otherwise a single put-object
    /// call is made and never retried.
    pub async fn upload_data_url(&self, data_url: &str) -> Result<UploadedAsset> {
        let storage = resolve_storage(&self.config)?;
        let decoded = parse_data_url(data_url)?;

        // Stored type comes from the bytes, never from the declaration
        let Some(content_type) = image_processing::detect_mime_type(&decoded.bytes) else {
            return Err(GenerateError::Validation(format!(
                "The reference image must be a PNG, JPEG, GIF, WebP, BMP or AVIF file (declared {})",
                decoded.mime_type
            )));
        };
        if decoded.mime_type.starts_with("image/")
            && !image_processing::same_mime_type(&decoded.mime_type, content_type)
        {
            tracing::warn!(
                declared = %decoded.mime_type,
                detected = content_type,
                "input image content does not match its declared type"
            );
        }
        let content_type = content_type.to_string();

        let key = format!(
            "{}.{}",
            Uuid::new_v4().simple(),
            get_extension_from_mime_type(&content_type)
        );
        let checksum_sha256 =
            base64::engine::general_purpose::STANDARD.encode(Sha256::digest(&decoded.bytes));

        tracing::info!(
            key = %key,
            content_type = %content_type,
            size = decoded.bytes.len(),
            dimensions = ?image_processing::dimensions(&decoded.bytes),
            "uploading input image"
        );

        self.store
            .put_object(
                &storage.target,
                PutObject {
                    key: key.clone(),
                    body: decoded.bytes,
                    content_type: content_type.clone(),
                    checksum_sha256,
                },
            )
            .await
            .map_err(|err| GenerateError::Upload(format!("{err:#}")))?;

        Ok(UploadedAsset {
            public_url: public_url(&storage.public_base_url, &key),
            content_type,
            key,
        })
    }
}

fn resolve_storage(config: &StorageConfig) -> Result<ResolvedStorage> {
    let mut missing = Vec::new();
    if config.account_id.is_none() {
        missing.push("R2_ACCOUNT_ID");
    }
    if config.access_key_id.is_none() {
        missing.push("R2_ACCESS_KEY_ID");
    }
    if config.secret_access_key.is_none() {
        missing.push("R2_SECRET_ACCESS_KEY");
    }
    if config.bucket_name.is_none() {
        missing.push("R2_BUCKET_NAME");
    }
    if config.public_base_url.is_none() {
        missing.push("R2_PUBLIC_URL");
    }

    let (
        Some(account_id),
        Some(access_key_id),
        Some(secret_access_key),
        Some(bucket_name),
        Some(public_base_url),
    ) = (
        &config.account_id,
        &config.access_key_id,
        &config.secret_access_key,
        &config.bucket_name,
        &config.public_base_url,
    )
    else {
        return Err(GenerateError::Configuration(format!(
            "object storage is not configured, missing {}",
            missing.join(", ")
        )));
    };

    let base = Url::parse(public_base_url).map_err(|err| {
        GenerateError::Configuration(format!("R2_PUBLIC_URL is not a valid URL: {err}"))
    })?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(GenerateError::Configuration(
            "R2_PUBLIC_URL must use http or https".to_string(),
        ));
    }

    let endpoint = config
        .endpoint
        .clone()
        .unwrap_or_else(|| format!("https://{account_id}.r2.cloudflarestorage.com"));

    Ok(ResolvedStorage {
        target: BucketTarget {
            endpoint,
            bucket_name: bucket_name.clone(),
            access_key_id: access_key_id.clone(),
            secret_access_key: secret_access_key.clone(),
        },
        public_base_url: public_base_url.clone(),
    })
}

fn public_url(base_url: &str, key: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let key = key.trim_start_matches('/');
    format!("{base}/{key}")
}
