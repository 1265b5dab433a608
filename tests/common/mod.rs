#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    middleware,
    response::Response,
    Router,
};
use larder_api::{
    auth::{inject_auth_service, AuthConfig, AuthService},
    config::AppConfig,
    db,
    events::{self, EventSender},
    handlers::AppServices,
    middleware_helpers::request_id_middleware,
    services::report_scheduler::ReportScheduler,
    AppState,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str =
    "k9Vq2LmX7pRt4WzN8sBy3HdF6jGc1QeUa5Zo0Iv_TnKwYxMbErPl-ShJuDgCfAi";

/// Application backed by a temp-file SQLite database and a temp report directory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub business_id: Uuid,
    token: String,
    auth_service: Arc<AuthService>,
    _event_task: tokio::task::JoinHandle<()>,
    // Dropped last so the database file outlives the pool.
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds an app after letting the caller adjust the configuration.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = dir.path().join("larder_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.report_dir = dir.path().join("reports").display().to_string();
        cfg.report_scheduler_enabled = false;
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let services = AppServices::new(db_arc.clone(), event_sender.clone(), &cfg);

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let api_router = larder_api::api_v1_routes().layer(middleware::from_fn_with_state(
            auth_service.clone(),
            inject_auth_service,
        ));

        let router = Router::new()
            .nest("/api/v1", api_router)
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(state.clone());

        let business_id = Uuid::new_v4();
        let token = auth_service
            .issue_token(business_id, Some("Test Bistro".to_string()))
            .expect("issue test token");

        Self {
            router,
            state,
            business_id,
            token,
            auth_service,
            _event_task: event_task,
            _dir: dir,
        }
    }

    /// Bearer token for the default test business.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Token for another business sharing the same database.
    pub fn token_for(&self, business_id: Uuid) -> String {
        self.auth_service
            .issue_token(business_id, None)
            .expect("issue token")
    }

    pub fn scheduler(&self) -> ReportScheduler {
        self.state
            .services
            .report_scheduler(self.state.db.clone(), &self.state.config)
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for requests as the default business.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(self.token())).await
    }

    /// Ingests `detections` as the default business and returns the `data` payload.
    pub async fn ingest(&self, detections: Value) -> Value {
        let response = self
            .request_authenticated(
                Method::POST,
                "/api/v1/inventory/ingest",
                Some(serde_json::json!({ "detections": detections })),
            )
            .await;
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        json_body(response).await["data"].clone()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

pub async fn raw_body(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body")
        .to_vec()
}

/// Default timeout for awaiting spawned test tasks.
pub const TASK_TIMEOUT: Duration = Duration::from_secs(30);
