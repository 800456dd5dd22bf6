//! HTTP surface: shared state, route table and handlers.

pub mod authors;
pub mod books;
pub mod error;
pub mod guard;
pub mod payload;

use crate::auth::{authenticator_from_config, AuthenticatorArc};
use crate::backend::ConfiguredBackend;
use crate::config::{ApiConfig, AppConfig};
use crate::error::Result;
use crate::expander::CacheExpander;
use crate::gateway::QueryGateway;
use crate::observability::{CacheStats, TtlPolicy};
use crate::store::MemoryStore;
use crate::url::UrlGenerator;
use crate::versioning::VersionResolver;
use axum::extract::State;
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

/// Collaborators injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub gateway: QueryGateway<ConfiguredBackend>,
    pub stats: Arc<CacheStats>,
    pub versions: VersionResolver,
    pub urls: UrlGenerator,
    pub authenticator: AuthenticatorArc,
    pub api: ApiConfig,
}

impl AppState {
    /// Wire state from configuration, connecting the configured cache backend.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let backend = ConfiguredBackend::from_config(&config.cache.backend).await?;
        Ok(Self::new(
            config,
            backend,
            Arc::new(MemoryStore::new()),
            authenticator_from_config(&config.auth),
        ))
    }

    /// Wire state around an already built backend, store and authenticator.
    pub fn new(
        config: &AppConfig,
        backend: ConfiguredBackend,
        store: Arc<MemoryStore>,
        authenticator: AuthenticatorArc,
    ) -> Self {
        let stats = Arc::new(CacheStats::new());
        let cache = CacheExpander::new(backend)
            .with_metrics(stats.clone())
            .with_ttl_policy(TtlPolicy::from(config.cache.ttl()));

        AppState {
            store,
            gateway: QueryGateway::new(Arc::new(cache)).with_retry(config.cache.retry),
            stats,
            versions: VersionResolver::new(config.api.default_version.clone()),
            urls: UrlGenerator::new(config.server.public_url.clone()),
            authenticator,
            api: config.api.clone(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let create_book = post(books::create_book).route_layer(middleware::from_fn_with_state(
        state.clone(),
        guard::can_create_book,
    ));

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/author",
            get(authors::list_authors).post(authors::create_author),
        )
        .route(
            "/api/author/{id}",
            get(authors::detail_author)
                .put(authors::update_author)
                .delete(authors::delete_author),
        )
        .route("/api/books", get(books::list_books).merge(create_book))
        .route(
            "/api/books/{id}",
            get(books::detail_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let cache = match state.gateway.health_check().await {
        Ok(true) => "up",
        Ok(false) => "down",
        Err(e) => {
            warn!("Cache health check failed: {}", e);
            "down"
        }
    };

    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": crate::VERSION,
        "cache": cache,
        "cacheStats": state.stats.snapshot(),
    }))
}

fn json_content_type() -> HeaderValue {
    HeaderValue::from_static("application/json")
}

/// Response with an already-serialized JSON body.
fn json_bytes(status: StatusCode, body: Vec<u8>) -> Response {
    (status, [(CONTENT_TYPE, json_content_type())], body).into_response()
}

/// 201 pointing at the created resource.
fn created(location: String, body: Vec<u8>) -> Response {
    let mut response = json_bytes(StatusCode::CREATED, body);
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            response.headers_mut().insert(LOCATION, value);
        }
        Err(e) => warn!("Location {:?} is not a valid header: {}", location, e),
    }
    response
}

/// `application/json; version=N`, plain JSON if `version` cannot be a header.
fn versioned_content_type(version: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("application/json; version={}", version))
        .unwrap_or_else(|_| json_content_type())
}

fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
