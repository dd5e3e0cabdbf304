use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
};
use secrecy::ExposeSecret;
use tokio::sync::Mutex;

use super::{BucketTarget, ObjectStore, PutObject};

/// R2 and most S3-compatible stores ignore the region but the SDK requires one
const REGION: &str = "auto";

/// Clients are keyed by where they point and whose credentials they carry
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ClientKey {
    endpoint: String,
    access_key_id: String,
}

/// [`ObjectStore`] backed by the AWS S3 SDK, pointed at any S3-compatible
/// endpoint. SDK clients are built on first use and reused afterwards.
#[derive(Debug, Default)]
pub struct S3ObjectStore {
    clients: Mutex<HashMap<ClientKey, Client>>,
}

impl S3ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self, target: &BucketTarget) -> Client {
        let key = ClientKey {
            endpoint: target.endpoint.clone(),
            access_key_id: target.access_key_id.expose_secret().to_string(),
        };
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&key) {
            return client.clone();
        }

        let client = build_client(target).await;
        tracing::debug!(endpoint = %target.endpoint, "object storage client created");
        clients.insert(key, client.clone());
        client
    }
}

async fn build_client(target: &BucketTarget) -> Client {
    let credentials = Credentials::new(
        target.access_key_id.expose_secret(),
        target.secret_access_key.expose_secret(),
        None,
        None,
        "static",
    );
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(REGION))
        .credentials_provider(credentials)
        .endpoint_url(&target.endpoint)
        .load()
        .await;
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(true)
        .build();
    Client::from_conf(s3_config)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, target: &BucketTarget, object: PutObject) -> Result<()> {
        let client = self.client(target).await;
        let size = object.body.len();

        client
            .put_object()
            .bucket(&target.bucket_name)
            .key(&object.key)
            .content_type(&object.content_type)
            .checksum_sha256(&object.checksum_sha256)
            .body(ByteStream::from(object.body))
            .send()
            .await
            .map_err(|err| anyhow!("put_object {} failed: {}", object.key, DisplayErrorContext(&err)))?;

        tracing::debug!(
            bucket = %target.bucket_name,
            key = %object.key,
            size,
            "object stored"
        );
        Ok(())
    }
}
