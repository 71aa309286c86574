//! LDAP bridge: log users in against LDAP / Active Directory and keep a
//! local account for each of them.

#[forbid(unsafe_code)]
#[deny(missing_docs, unused_mut)]
mod crypto;
mod database;
pub mod error;
mod identity;
pub mod ldap;
mod router;
pub mod telemetry;
mod token;
mod user;

pub mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::handler::Handler;
use axum::http::{Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    app.oneshot(
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub directory: Arc<dyn ldap::Connector>,
    pub provisioner: user::Provisioner,
    pub token: token::TokenManager,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    // Leave room for the directory budget to answer 503 itself.
    let request_timeout = state.config.directory_timeout() + Duration::from_secs(2);

    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `GET /metrics` goes to the Prometheus exporter.
        .route("/metrics", get(router::status::metrics))
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        // Everything else is a login or a connection test.
        .fallback(router::dispatch.layer(AxumMiddleware::from_fn(telemetry::track)))
        .with_state(state)
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file.  let it in memory.
    let mut config = config::Configuration::default();
    if let Ok(path) = std::env::var("CONFIG_PATH") {
        config = config.path(PathBuf::from(path));
    }
    let config = config.read()?;

    let pwd = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);

    // initialize identity store.
    let provisioner = match &config.postgres {
        Some(postgres) => {
            let store = Arc::new(user::PostgresStore::new(
                database::connect(postgres).await?,
            ));
            user::Provisioner::new(store.clone(), store, pwd)
        },
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, accounts are kept in memory"
            );
            let store = Arc::new(user::MemoryStore::new());
            user::Provisioner::new(store.clone(), store, pwd)
        },
    };

    // handle jwt.
    let Some(token_config) = &config.token else {
        tracing::error!("missing `token` entry on `config.yaml` file");
        return Err("missing `token` configuration".into());
    };
    let mut token =
        token::TokenManager::new(&config.url, &token_config.private_key_pem)?;
    if let Some(audience) = &token_config.audience {
        token.audience(audience);
    }
    if let Some(expires_in) = token_config.expires_in {
        token.expires_in(expires_in);
    }

    let directory = Arc::new(ldap::Ldap3Connector::new(config.directory_timeout()));

    Ok(AppState {
        config,
        directory,
        provisioner,
        token,
        metrics,
    })
}
