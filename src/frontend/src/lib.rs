use anyhow::{Context, Result};
use axum::{
    Extension, Json, Router,
    extract::{Form, Request, State, rejection::FormRejection},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use common::config::Configuration;
use common::discovery::Discoverer;
use common::registry::RegistryStore;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub mod client;
pub mod counter;

use client::BackendClient;
use counter::HitCounter;

/// Hit count assigned to the current request by the counting middleware
#[derive(Debug, Clone, Copy)]
pub struct HitCount(pub i64);

/// Shared state for the frontend's route handlers
#[derive(Clone, Debug)]
pub struct FrontendState {
    client: BackendClient,
    counter: HitCounter,
}

impl FrontendState {
    pub fn new(client: BackendClient, counter: HitCounter) -> Self {
        Self { client, counter }
    }

    /// Build the state from configuration, sharing `store` between
    /// discovery and the hit counter.
    pub fn from_config(config: &Configuration, store: Arc<dyn RegistryStore>) -> Result<Self> {
        let discoverer = Discoverer::new(store.clone(), &config.registry);
        let client = BackendClient::new(discoverer, config.http.client_timeout)
            .context("Failed to build backend HTTP client")?;
        let counter = HitCounter::new(store, &config.registry);
        Ok(Self::new(client, counter))
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }
}

/// Create the frontend router. Every route except `/health` counts a hit.
pub fn create_router(state: FrontendState) -> Router {
    Router::new()
        .route("/", get(index).post(submit_entry))
        .route("/backends", get(list_backends))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), count_hit))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn count_hit(State(state): State<FrontendState>, mut request: Request, next: Next) -> Response {
    match state.counter.increment().await {
        Ok(count) => {
            request.extensions_mut().insert(HitCount(count));
            next.run(request).await
        }
        Err(e) => {
            log::error!("Failed to increment hit counter: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn counted(status: StatusCode, count: HitCount, mut body: serde_json::Value) -> Response {
    body["counter"] = json!(count.0);
    (status, Json(body)).into_response()
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn index(State(state): State<FrontendState>, Extension(count): Extension<HitCount>) -> Response {
    match state.client().list_entries().await {
        Ok(entries) => counted(StatusCode::OK, count, json!({ "entries": entries })),
        Err(e) => {
            log::warn!("Failed to fetch entries from backend: {e}");
            counted(
                StatusCode::SERVICE_UNAVAILABLE,
                count,
                json!({ "error": e.to_string() }),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EntryForm {
    #[serde(default)]
    pub text: String,
}

async fn submit_entry(
    State(state): State<FrontendState>,
    Extension(count): Extension<HitCount>,
    form: Result<Form<EntryForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            return counted(
                StatusCode::INTERNAL_SERVER_ERROR,
                count,
                json!({ "error": rejection.body_text() }),
            );
        }
    };

    if !form.text.is_empty() {
        if let Err(e) = state.client().create_entry(&form.text).await {
            log::error!("Failed to forward entry to backend: {e}");
            return counted(
                StatusCode::INTERNAL_SERVER_ERROR,
                count,
                json!({ "error": e.to_string() }),
            );
        }
    }

    (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
}

async fn list_backends(
    State(state): State<FrontendState>,
    Extension(count): Extension<HitCount>,
) -> Response {
    match state.client().discoverer().discover().await {
        Ok(backends) => counted(StatusCode::OK, count, json!({ "backends": backends })),
        Err(e) => {
            log::warn!("Discovery failed: {e}");
            counted(
                StatusCode::SERVICE_UNAVAILABLE,
                count,
                json!({ "error": e.to_string() }),
            )
        }
    }
}

async fn not_found(Extension(count): Extension<HitCount>) -> Response {
    counted(StatusCode::NOT_FOUND, count, json!({ "error": "not found" }))
}

/// Serve the frontend on `listener` until `shutdown` resolves.
pub async fn run(
    config: Configuration,
    store: Arc<dyn RegistryStore>,
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    config.validate().context("Invalid frontend configuration")?;

    let local_addr = listener
        .local_addr()
        .context("Failed to read listener address")?;

    let state = FrontendState::from_config(&config, store)?;
    let app = create_router(state);

    log::info!("Frontend listening on {local_addr}");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("Frontend HTTP server error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use common::registry::MemoryStore;
    use common::testing::{TestConfigBuilder, memory_registrant};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(store: &MemoryStore) -> Router {
        let config = TestConfigBuilder::new().in_memory().build();
        let state = FrontendState::from_config(&config, Arc::new(store.clone())).unwrap();
        create_router(state)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_form(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_index_without_backends_is_unavailable() {
        let store = MemoryStore::new();
        let response = app(&store).oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_json(response).await;
        assert_eq!(body["counter"], 1);
        assert_eq!(body["error"], "No backends available");
    }

    #[tokio::test]
    async fn test_backends_lists_live_addresses_and_counts_hits() {
        let store = MemoryStore::new();
        let config = TestConfigBuilder::new().in_memory().build();
        memory_registrant(&store, &config.registry, "b-1", "10.0.0.1:8080")
            .heartbeat()
            .await
            .unwrap();

        let app = app(&store);
        let response = app.clone().oneshot(get("/backends")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["counter"], 1);
        assert_eq!(body["backends"], json!(["10.0.0.1:8080"]));

        let body = body_json(app.oneshot(get("/backends")).await.unwrap()).await;
        assert_eq!(body["counter"], 2);
    }

    #[tokio::test]
    async fn test_health_is_not_counted() {
        let store = MemoryStore::new();
        let response = app(&store).oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(store.get("hit-counter").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_path_is_counted_not_found() {
        let store = MemoryStore::new();
        let response = app(&store).oneshot(get("/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["counter"], 1);
        assert_eq!(body["error"], "not found");
    }

    #[tokio::test]
    async fn test_counter_failure_is_server_error() {
        let store = MemoryStore::new();
        let app = app(&store);
        store.set_offline(true);

        let response = app.oneshot(get("/backends")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_empty_submission_redirects_without_backend() {
        let store = MemoryStore::new();
        let response = app(&store).oneshot(post_form("text=")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn test_submission_without_backends_fails() {
        let store = MemoryStore::new();
        let response = app(&store).oneshot(post_form("text=hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["counter"], 1);
    }
}
