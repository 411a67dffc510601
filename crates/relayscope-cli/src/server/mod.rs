pub mod dashboard;
pub mod mcp;
pub mod proxy;
pub mod replay;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, patch, post};
use axum::Router;
use relayscope_engine::SessionResolver;
use relayscope_providers::ProviderRegistry;
use relayscope_runtime::{Config, PricingCache};
use relayscope_sdk::Client;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pricing_source::HttpPricingSource;

/// Everything an axum handler needs, cloned cheaply into each request: the
/// SDK client, the stateless-request session resolver, the provider
/// registry, an HTTP client for upstream forwarding, and the pricing cache
/// `/api/replay` estimates cost from.
#[derive(Clone)]
pub struct AppState {
    pub client: Client,
    pub resolver: Arc<Mutex<SessionResolver>>,
    pub providers: Arc<ProviderRegistry>,
    pub upstream: reqwest::Client,
    pub pricing: Arc<Mutex<PricingCache>>,
    pub span_seq: Arc<AtomicU64>,
    pub upstream_config: relayscope_runtime::UpstreamConfig,
}

impl AppState {
    pub fn next_span_seq(&self) -> u64 {
        self.span_seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// Errors surfaced by axum handlers, rendered as `{"error": "..."}` with an
/// appropriate status. Store/runtime errors never abort in-flight proxy
/// traffic (see [`crate::hook`]); this type is only used by the dashboard
/// and `/mcp` handlers, which are allowed to fail a single request.
pub struct ApiError(StatusCode, anyhow::Error);

impl ApiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self(StatusCode::NOT_FOUND, anyhow::anyhow!(what.into()))
    }

    pub fn bad_request(err: impl Into<anyhow::Error>) -> Self {
        Self(StatusCode::BAD_REQUEST, err.into())
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.1, status = %self.0, "request failed");
        (self.0, Json(json!({ "error": self.1.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(proxy::handle))
        .route("/v1/responses", post(proxy::handle))
        .route("/v1/messages", post(proxy::handle))
        .route("/api/dashboard", get(dashboard::get_dashboard))
        .route("/api/agent/{id}", get(dashboard::get_agent))
        .route("/api/session/{id}", get(dashboard::get_session))
        .route("/api/sessions/list", get(dashboard::list_sessions))
        .route("/api/replay", post(replay::replay))
        .route("/api/findings", post(dashboard::create_finding))
        .route("/api/finding/{id}", patch(dashboard::patch_finding))
        .route("/api/sessions/analysis", post(dashboard::trigger_analysis))
        .route(
            "/api/sessions/analysis/{id}/complete",
            post(dashboard::complete_analysis),
        )
        .route("/api/workflow/{id}/findings", get(dashboard::workflow_findings))
        .route("/mcp", post(mcp::handle))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Builds the `Client`, spawns its background workers and (if configured) a
/// dedicated pricing-refresh thread, then serves the combined proxy +
/// dashboard + `/mcp` router until the process is killed.
pub fn serve(config: Config) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move { serve_async(config).await })
}

async fn serve_async(config: Config) -> anyhow::Result<()> {
    let client = Client::connect(config.clone())?;
    let _monitor = client.start_background_workers();
    client.analysis().recover()?;

    let pricing_cache_path = config.resolved_pricing_cache_path()?;
    let pricing = Arc::new(Mutex::new(PricingCache::load_or_default(pricing_cache_path)));
    if let Some(url) = config.pricing_url.clone() {
        spawn_pricing_refresh(pricing.clone(), url);
    }

    let state = AppState {
        resolver: Arc::new(Mutex::new(SessionResolver::new())),
        providers: Arc::new(ProviderRegistry::new()),
        upstream: reqwest::Client::new(),
        pricing,
        span_seq: Arc::new(AtomicU64::new(0)),
        upstream_config: config.upstream.clone(),
        client,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "relayscope listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Dedicated thread refreshing the pricing cache once a day, the way the
/// session monitor runs on its own thread rather than inside the async
/// server (see [`relayscope_runtime::monitor::SessionMonitor`]).
fn spawn_pricing_refresh(pricing: Arc<Mutex<PricingCache>>, url: String) {
    std::thread::Builder::new()
        .name("relayscope-pricing-refresh".to_string())
        .spawn(move || {
            let source = HttpPricingSource::new(url);
            loop {
                let now = chrono::Utc::now();
                let is_stale = pricing.lock().unwrap().is_stale(now);
                if is_stale {
                    let mut cache = pricing.lock().unwrap();
                    if let Err(err) = cache.refresh(&source, now) {
                        tracing::warn!(error = %err, "pricing refresh failed");
                    }
                }
                std::thread::sleep(std::time::Duration::from_secs(3_600));
            }
        })
        .expect("failed to spawn relayscope-pricing-refresh thread");
}
