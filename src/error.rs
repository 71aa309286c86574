//! Error handler for the bridge.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::crypto::CryptoError;
use crate::ldap::DirectoryError;
use crate::user::StoreError;

pub type Result<T> = std::result::Result<T, ServerError>;

const INVALID_CREDENTIALS: &str = "Invalid username or password";
const UNAVAILABLE: &str = "LDAP server unavailable";
const INTERNAL: &str = "Internal server error.";

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    /// A required field is absent; message is shown as is.
    #[error("{0}")]
    MissingField(&'static str),

    #[error("error parsing request body: {0}")]
    ParsingForm(String),

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("LDAP authentication is disabled")]
    LdapDisabled,

    #[error("Account is not provisioned")]
    AccountNotProvisioned,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("cannot sign session: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("internal server error, {details}")]
    Internal { details: String },
}

impl ServerError {
    /// HTTP status chosen for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_)
            | ServerError::MissingField(_)
            | ServerError::ParsingForm(_) => StatusCode::BAD_REQUEST,
            ServerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::Directory(err) => match err {
                DirectoryError::Unavailable(_) | DirectoryError::Timeout => {
                    StatusCode::SERVICE_UNAVAILABLE
                },
                DirectoryError::NotFound | DirectoryError::InvalidCredentials => {
                    StatusCode::UNAUTHORIZED
                },
                DirectoryError::ServiceAccount { .. }
                | DirectoryError::Operation { .. }
                | DirectoryError::Protocol(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                },
            },
            ServerError::LdapDisabled
            | ServerError::AccountNotProvisioned
            | ServerError::AccountDisabled => StatusCode::FORBIDDEN,
            ServerError::Store(_)
            | ServerError::Crypto(_)
            | ServerError::Token(_)
            | ServerError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller. Unexpected failures only carry
    /// their details when `expose_internal` is set.
    pub fn public_message(&self, expose_internal: bool) -> String {
        match self {
            ServerError::Directory(
                DirectoryError::NotFound | DirectoryError::InvalidCredentials,
            ) => INVALID_CREDENTIALS.to_owned(),
            ServerError::Directory(
                DirectoryError::Unavailable(_) | DirectoryError::Timeout,
            ) => UNAVAILABLE.to_owned(),
            err if err.status() == StatusCode::INTERNAL_SERVER_ERROR => {
                if expose_internal {
                    err.to_string()
                } else {
                    INTERNAL.to_owned()
                }
            },
            err => err.to_string(),
        }
    }

    /// Hide internal details, keeping the status.
    pub fn redact(self, expose_internal: bool) -> Self {
        if expose_internal || self.status() != StatusCode::INTERNAL_SERVER_ERROR {
            self
        } else {
            tracing::error!(error = %self, "server returned 500 status");
            ServerError::Internal {
                details: String::default(),
            }
        }
    }
}

/// Error envelope.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    error: String,
    message: String,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue.to_string(),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::Internal { details } if details.is_empty() => {
                INTERNAL.to_owned()
            },
            err => err.public_message(true),
        };
        let errors = match &self {
            ServerError::Validation(errors) => Some(parse_validation_errors(errors)),
            _ => None,
        };

        ResponseError {
            error: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_owned(),
            message,
            status: status.as_u16(),
            errors,
        }
        .into_response()
        .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "error": "Internal Server Error",
                "message": INTERNAL,
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new(INTERNAL.into()))
}
