//! Builds the application router against the mock provider

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use ghibli_image_gen::config::AppConfig;
use ghibli_image_gen::web::{self, AppState};
use serde_json::Value;
use tower::ServiceExt;

use super::mock_provider::MockProvider;
use super::store::RecordingStore;

pub const PUBLIC_BASE: &str = "https://img.example.com";

pub struct TestApp {
    pub router: Router,
    pub provider: MockProvider,
    pub store: Arc<RecordingStore>,
    pub events: Arc<Mutex<Vec<String>>>,
}

/// Which parts of the environment a test wants configured
#[derive(Clone, Copy)]
pub struct Setup {
    pub image_api: bool,
    pub replicate: bool,
    pub storage: bool,
}

impl Setup {
    pub fn text_only() -> Self {
        Self {
            image_api: true,
            replicate: false,
            storage: false,
        }
    }

    pub fn everything() -> Self {
        Self {
            image_api: true,
            replicate: true,
            storage: true,
        }
    }
}

impl TestApp {
    pub async fn start(setup: Setup) -> anyhow::Result<Self> {
        Self::start_with(setup, &[]).await
    }

    /// Like [`TestApp::start`], with extra environment entries applied last
    pub async fn start_with(setup: Setup, overrides: &[(&str, &str)]) -> anyhow::Result<Self> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let provider = MockProvider::start(events.clone()).await?;
        let store = Arc::new(RecordingStore::new(events.clone()));

        let mut env = HashMap::new();
        let mut set = |key: &str, value: String| {
            env.insert(key.to_string(), value);
        };
        set("POLL_INTERVAL_MS", "5".to_string());
        set("POLL_MAX_ATTEMPTS", "10".to_string());
        if setup.image_api {
            set("IMAGE_API_KEY", "sk-test".to_string());
            set("IMAGE_API_BASE_URL", provider.base_url());
        }
        if setup.replicate {
            set("REPLICATE_API_TOKEN", "r8-test".to_string());
            set("REPLICATE_BASE_URL", provider.base_url());
            set("REPLICATE_MODEL", "acme/kontext".to_string());
        }
        if setup.storage {
            set("R2_ACCOUNT_ID", "account".to_string());
            set("R2_ACCESS_KEY_ID", "access".to_string());
            set("R2_SECRET_ACCESS_KEY", "secret".to_string());
            set("R2_BUCKET_NAME", "inputs".to_string());
            set("R2_PUBLIC_URL", PUBLIC_BASE.to_string());
        }
        for (key, value) in overrides {
            set(*key, (*value).to_string());
        }

        let config = AppConfig::from_map(&env);
        let state = Arc::new(AppState::new(&config, store.clone())?);
        let router = web::router(&config, state);

        Ok(Self {
            router,
            provider,
            store,
            events,
        })
    }

    /// POST a JSON body to `/api/generate`
    pub async fn generate(&self, body: Value) -> (StatusCode, Value) {
        self.post_raw(body.to_string()).await
    }

    pub async fn post_raw(&self, body: String) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/generate")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}
