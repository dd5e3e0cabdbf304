use std::{collections::HashMap, env, path::PathBuf, time::Duration};

use secrecy::SecretString;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BODY_LIMIT_MB: usize = 50;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

const DEFAULT_IMAGE_API_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";

const DEFAULT_REPLICATE_BASE_URL: &str = "https://api.replicate.com";
const DEFAULT_REPLICATE_MODEL: &str = "black-forest-labs/flux-kontext-pro";
const DEFAULT_OUTPUT_FORMAT: &str = "png";
const DEFAULT_SAFETY_TOLERANCE: u8 = 2;

const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;

/// Process-wide settings, resolved once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub body_limit_bytes: usize,
    pub request_timeout: Duration,
    pub image_api: Option<ImageApiConfig>,
    pub replicate: Option<ReplicateConfig>,
    pub polling: PollingConfig,
    pub storage: StorageConfig,
}

/// OpenAI-compatible synchronous image endpoint
#[derive(Debug, Clone)]
pub struct ImageApiConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub size_param: SizeParam,
}

/// Which body field carries the requested frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeParam {
    #[default]
    Size,
    AspectRatio,
}

/// Replicate-hosted prediction endpoint
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: SecretString,
    pub base_url: String,
    pub model: String,
    pub output_format: String,
    pub safety_tolerance: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct PollingConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

/// S3-compatible bucket connection.
///
/// Every field stays optional here; the uploader checks them when an upload
/// is actually needed so text-only deployments run without a bucket.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub account_id: Option<String>,
    pub access_key_id: Option<SecretString>,
    pub secret_access_key: Option<SecretString>,
    pub bucket_name: Option<String>,
    pub public_base_url: Option<String>,
    pub endpoint: Option<String>,
}

impl AppConfig {
    /// Read the process environment, after loading `.env` if one exists
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_map(values: &HashMap<String, String>) -> Self {
        Self::from_lookup(|key| values.get(key).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let image_api = get("IMAGE_API_KEY").map(|api_key| ImageApiConfig {
            api_key: SecretString::from(api_key),
            base_url: get("IMAGE_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_IMAGE_API_BASE_URL.to_string()),
            model: get("IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            size_param: match get("IMAGE_SIZE_PARAM").as_deref() {
                Some("aspect_ratio") => SizeParam::AspectRatio,
                _ => SizeParam::Size,
            },
        });

        let replicate = get("REPLICATE_API_TOKEN").map(|api_token| ReplicateConfig {
            api_token: SecretString::from(api_token),
            base_url: get("REPLICATE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_REPLICATE_BASE_URL.to_string()),
            model: get("REPLICATE_MODEL").unwrap_or_else(|| DEFAULT_REPLICATE_MODEL.to_string()),
            output_format: get("REPLICATE_OUTPUT_FORMAT")
                .unwrap_or_else(|| DEFAULT_OUTPUT_FORMAT.to_string()),
            safety_tolerance: get("REPLICATE_SAFETY_TOLERANCE")
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_SAFETY_TOLERANCE),
        });

        let polling = PollingConfig {
            interval: get("POLL_INTERVAL_MS")
                .and_then(|value| value.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
            max_attempts: get("POLL_MAX_ATTEMPTS")
                .and_then(|value| value.parse().ok())
                .filter(|attempts: &u32| *attempts > 0)
                .unwrap_or(DEFAULT_POLL_MAX_ATTEMPTS),
        };

        let storage = StorageConfig {
            account_id: get("R2_ACCOUNT_ID"),
            access_key_id: get("R2_ACCESS_KEY_ID").map(SecretString::from),
            secret_access_key: get("R2_SECRET_ACCESS_KEY").map(SecretString::from),
            bucket_name: get("R2_BUCKET_NAME"),
            public_base_url: get("R2_PUBLIC_URL"),
            endpoint: get("R2_ENDPOINT"),
        };

        Self {
            port: get("PORT")
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            static_dir: get("STATIC_DIR").map(PathBuf::from),
            body_limit_bytes: get("BODY_LIMIT_MB")
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(DEFAULT_BODY_LIMIT_MB)
                .saturating_mul(1024 * 1024),
            request_timeout: Duration::from_secs(
                get("REQUEST_TIMEOUT_SECS")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            image_api,
            replicate,
            polling,
            storage,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
