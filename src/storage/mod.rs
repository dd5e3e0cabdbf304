pub mod data_url;
pub mod s3;
pub mod uploader;

use async_trait::async_trait;
use secrecy::SecretString;

pub use data_url::{DataUrl, parse_data_url};
pub use s3::S3ObjectStore;
pub use uploader::{ImageUploader, UploadedAsset};

pub fn get_extension_from_mime_type(mime_type: &str) -> &'static str {
    match mime_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "image/avif" => "avif",
        _ => "bin",
    }
}

/// Fully resolved bucket connection for one put-object call
#[derive(Debug, Clone)]
pub struct BucketTarget {
    pub endpoint: String,
    pub bucket_name: String,
    pub access_key_id: SecretString,
    pub secret_access_key: SecretString,
}

#[derive(Debug, Clone)]
pub struct PutObject {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    /// Base64 SHA-256 of `body`
    pub checksum_sha256: String,
}

/// Write side of an S3-compatible bucket
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, target: &BucketTarget, object: PutObject) -> anyhow::Result<()>;
}
