use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::ldap::{self, DirectoryConfig, DirectoryError};
use crate::router::{Data, parse_body};

const SUCCESS: &str = "Connection successful";

#[derive(Debug, Default, Deserialize)]
pub struct Body {
    config: Option<DirectoryConfig>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub message: String,
}

/// Handler to check directory settings before saving them.
///
/// Failures use the error envelope: 503 when the server cannot be reached,
/// 500 when it refuses the service account.
pub async fn handler(state: &AppState, body: &[u8]) -> Result<Json<Data<Response>>> {
    let body: Body = parse_body(body)?;

    let config = match body.config {
        Some(config) if !config.url.trim().is_empty() => config,
        _ => return Err(ServerError::MissingField("LDAP URL is required")),
    };
    config.validate()?;

    tokio::time::timeout(
        state.config.directory_timeout(),
        ldap::test_connection(state.directory.as_ref(), &config),
    )
    .await
    .unwrap_or(Err(DirectoryError::Timeout))
    .map_err(|err| {
        tracing::warn!(url = %config.url, error = %err, "ldap connection test failed");
        err
    })?;

    tracing::info!(url = %config.url, "ldap connection test succeeded");
    Ok(Data::new(Response {
        success: true,
        message: SUCCESS.to_owned(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use super::*;
    use crate::ldap::mock::{Call, MockDirectory};
    use crate::router::state;
    use crate::user::MemoryStore;
    use crate::*;

    async fn call(directory: &MockDirectory, body: Value) -> (StatusCode, Value) {
        let app = app(state(directory.clone(), MemoryStore::new()));
        let response =
            make_request(app, Method::POST, "/ldap-auth/test", body.to_string()).await;
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_success_with_service_account() {
        let directory = MockDirectory::new().with_account("cn=svc,dc=co,dc=com", "secret");

        let (status, value) = call(
            &directory,
            json!({"config": {
                "url": "ldap://dc.co.com",
                "serviceAccountDN": "cn=svc,dc=co,dc=com",
                "serviceAccountPassword": "secret",
            }}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["data"]["success"], true);
        assert_eq!(value["data"]["message"], SUCCESS);
        assert_eq!(
            directory.calls(),
            vec![
                Call::Connect(0),
                Call::Bind(0, "cn=svc,dc=co,dc=com".into()),
                Call::Unbind(0)
            ]
        );
    }

    #[tokio::test]
    async fn test_success_without_bind() {
        let directory = MockDirectory::new();

        let (status, value) =
            call(&directory, json!({"config": {"url": "ldaps://dc.co.com"}})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["data"]["success"], true);
        assert!(directory.bind_dns().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_is_an_error() {
        let (status, value) = call(
            &MockDirectory::new().unreachable(),
            json!({"config": {"url": "ldap://10.0.0.1"}}),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(value["message"], "LDAP server unavailable");
        assert!(value.get("data").is_none());
    }

    #[tokio::test]
    async fn test_bad_service_password() {
        let directory = MockDirectory::new().with_account("cn=svc", "secret");

        let (status, value) = call(
            &directory,
            json!({"config": {
                "url": "ldap://dc.co.com",
                "serviceAccountDN": "cn=svc",
                "serviceAccountPassword": "wrong",
            }}),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        // Development mode shows the cause.
        assert_eq!(value["message"], "service account bind rejected (code 49)");
        assert_eq!(directory.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_server_times_out() {
        let directory = MockDirectory::new().hanging_bind();

        let (status, value) = call(
            &directory,
            json!({"config": {
                "url": "ldap://dc.co.com",
                "serviceAccountDN": "cn=svc",
                "serviceAccountPassword": "secret",
            }}),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(value["message"], "LDAP server unavailable");
        assert_eq!(directory.abandoned(), 1);
        assert_eq!(directory.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_url_required() {
        let directory = MockDirectory::new();

        for body in [json!({}), json!({"config": {}}), json!({"config": {"url": " "}})] {
            let (status, value) = call(&directory, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(value["message"], "LDAP URL is required");
        }

        let (status, _) = call(&directory, json!({"config": {"url": "dc.co.com"}})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(directory.connections(), 0);
    }
}
