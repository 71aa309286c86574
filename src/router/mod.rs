//! HTTP surface.
//!
//! Every POST lands on [`dispatch`]: paths ending in `/test` check a
//! directory, anything else is a login.
pub mod authenticate;
pub mod status;
pub mod test_connection;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::{Result, ServerError};

const TEST_SUFFIX: &str = "/test";

/// Whether a fallback path asks for a connection test.
pub(crate) fn is_test_path(path: &str) -> bool {
    path.trim_end_matches('/').ends_with(TEST_SUFFIX)
}

/// Success envelope.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Data<T> {
    pub data: T,
}

impl<T> Data<T> {
    pub fn new(data: T) -> Json<Self> {
        Json(Self { data })
    }
}

/// Route a request to the login or connection test handler.
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let expose_internal = !state.config.is_production();

    if method != Method::POST {
        return ServerError::MethodNotAllowed.into_response();
    }

    let response = if is_test_path(uri.path()) {
        test_connection::handler(&state, &body)
            .await
            .map(IntoResponse::into_response)
    } else {
        authenticate::handler(&state, &body)
            .await
            .map(IntoResponse::into_response)
    };

    response.unwrap_or_else(|err| err.redact(expose_internal).into_response())
}

/// Parse a JSON body. An empty body reads as `{}`.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };

    serde_json::from_slice(body).map_err(|err| ServerError::ParsingForm(err.to_string()))
}

/// `None` for absent and blank strings.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Application state wired to the scripted directory and in-memory store.
#[cfg(test)]
pub(crate) fn state(
    directory: crate::ldap::mock::MockDirectory,
    store: crate::user::MemoryStore,
) -> AppState {
    use std::sync::Arc;

    state_with(directory, Arc::new(store.clone()), Arc::new(store))
}

/// Same as [`state`], with a chosen profile table.
#[cfg(test)]
pub(crate) fn state_with(
    directory: crate::ldap::mock::MockDirectory,
    accounts: std::sync::Arc<dyn crate::user::AccountStore>,
    profiles: std::sync::Arc<dyn crate::user::ProfileStore>,
) -> AppState {
    use std::sync::Arc;

    use crate::config::{Argon2, Configuration, Environment};
    use crate::crypto::PasswordManager;
    use crate::user::Provisioner;

    let mut config = Configuration::default();
    config.name = "Acme CRM".into();
    config.url = "https://crm.example.com/".into();
    config.environment = Environment::Development;
    config.timeout = 2;

    let pwd = PasswordManager::new(Some(Argon2 {
        memory_cost: 1024,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    }))
    .unwrap();

    AppState {
        config: Arc::new(config),
        directory: Arc::new(directory),
        provisioner: Provisioner::new(accounts, profiles, Arc::new(pwd)),
        token: crate::token::tests::manager(),
        metrics: None,
    }
}
