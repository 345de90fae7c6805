use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Form, State, rejection::FormRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use common::config::Configuration;
use common::registrant::{InstanceIdentity, Registrant};
use common::registry::RegistryStore;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub mod storage;

use storage::EntryStore;

/// Shared state for the backend's route handlers
#[derive(Clone, Debug)]
pub struct BackendState {
    entries: EntryStore,
}

impl BackendState {
    pub fn new(entries: EntryStore) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &EntryStore {
        &self.entries
    }
}

/// Create the backend router with all routes configured
pub fn create_router(state: BackendState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health_check))
        .route("/entries", get(list_entries))
        .route("/entry", post(create_entry))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

async fn welcome() -> impl IntoResponse {
    Json("Welcome to the rollcall backend!")
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn list_entries(State(state): State<BackendState>) -> Response {
    match state.entries().list_entries().await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => {
            log::error!("Failed to list entries: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EntryForm {
    #[serde(default)]
    pub text: String,
}

async fn create_entry(
    State(state): State<BackendState>,
    form: Result<Form<EntryForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, rejection.body_text());
        }
    };

    if form.text.is_empty() {
        return (StatusCode::EXPECTATION_FAILED, Json("No text provided")).into_response();
    }

    match state.entries().insert_entry(&form.text).await {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => {
            log::error!("Failed to insert entry: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// Run a backend instance until `shutdown` resolves: open the entry store,
/// start heartbeating into `store` and serve HTTP on `listener`.
///
/// The advertised address defaults to the listener's port.
pub async fn run(
    config: Configuration,
    store: Arc<dyn RegistryStore>,
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    config.validate().context("Invalid backend configuration")?;

    let local_addr = listener
        .local_addr()
        .context("Failed to read listener address")?;

    let entries = EntryStore::new(&config.database.dsn)
        .await
        .context("Failed to open entry store")?;

    let identity = InstanceIdentity::resolve(&config.instance, local_addr.port());
    let registrant = Registrant::new(store, identity, &config.registry);
    let heartbeat = registrant.spawn(config.registry.heartbeat_interval);

    let app = create_router(BackendState::new(entries));
    log::info!("Backend listening on {local_addr}");
    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("Backend HTTP server error");

    heartbeat.shutdown().await;
    served
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use common::model::Entry;
    use common::registry::MemoryStore;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn app() -> (Router, EntryStore) {
        let entries = EntryStore::new_in_memory().await.unwrap();
        (create_router(BackendState::new(entries.clone())), entries)
    }

    fn post_form(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/entry")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_post_entry_created() {
        let (app, entries) = app().await;
        let response = app.oneshot(post_form("text=hello+there")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let listed = entries.list_entries().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].text, "hello there");
    }

    #[tokio::test]
    async fn test_post_empty_text_is_rejected() {
        let (app, entries) = app().await;
        let response = app.clone().oneshot(post_form("text=")).await.unwrap();
        assert_eq!(response.status(), StatusCode::EXPECTATION_FAILED);

        let response = app.oneshot(post_form("other=1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::EXPECTATION_FAILED);

        assert!(entries.list_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_form_is_server_error() {
        let (app, _) = app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/entry")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_get_entries_newest_first() {
        let (app, entries) = app().await;
        entries.insert_entry("older").await.unwrap();
        entries.insert_entry("newer").await.unwrap();

        let response = app
            .oneshot(Request::get("/entries").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let listed: Vec<Entry> = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(listed[0].text, "newer");
        assert_eq!(listed[1].text, "older");
        assert!(body[0].get("Timestamp").is_some());
        assert!(body[0].get("Text").is_some());
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_configuration() {
        let mut config = common::testing::TestConfigBuilder::new().in_memory().build();
        config.registry.heartbeat_interval = Duration::ZERO;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let store: Arc<dyn RegistryStore> = Arc::new(MemoryStore::new());

        let result = run(config, store.clone(), listener, async {}).await;
        assert!(result.is_err());
        assert!(!store.set_exists("redis-discovery-backends").await.unwrap());
    }

    #[tokio::test]
    async fn test_welcome_and_health() {
        let (app, _) = app().await;
        let response = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!("Welcome to the rollcall backend!")
        );

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
