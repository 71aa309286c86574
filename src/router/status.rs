//! Public status page and Prometheus scrape endpoint.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::AppState;

/// Structured status.
#[derive(Serialize)]
pub struct Status {
    version: String,
    name: String,
}

/// Public server status.
pub async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(Status {
        version: env!("CARGO_PKG_VERSION").into(),
        name: if state.config.name.is_empty() {
            env!("CARGO_CRATE_NAME").into()
        } else {
            state.config.name.clone()
        },
    })
}

/// Render recorded metrics.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use http_body_util::BodyExt;
    use serde_json::Value;

    use super::*;
    use crate::ldap::mock::MockDirectory;
    use crate::router::state;
    use crate::user::MemoryStore;
    use crate::*;

    #[tokio::test]
    async fn test_status() {
        let app = app(state(MockDirectory::new(), MemoryStore::new()));
        let response = make_request(app, Method::GET, "/status.json", String::new()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(value["name"], "Acme CRM");
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let app = app(state(MockDirectory::new(), MemoryStore::new()));
        let response = make_request(app, Method::GET, "/metrics", String::new()).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
