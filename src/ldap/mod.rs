//! LDAP support.
//!
//! Authenticates a login against an LDAP / Active Directory server using the
//! connection settings supplied with each request.

pub mod client;
pub mod filter;
#[cfg(test)]
pub(crate) mod mock;
pub mod session;
pub mod tester;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

pub use client::Ldap3Connector;
pub use session::{Connection, Connector, SearchScope, authenticate};
pub use tester::test_connection;

const DEFAULT_USER_SEARCH_FILTER: &str = "(userPrincipalName={username})";
const DEFAULT_USERNAME_ATTRIBUTE: &str = "userPrincipalName";
const ADMIN_ROLE: &str = "admin";

/// Bind result codes blaming the credentials: invalidCredentials,
/// insufficientAccessRights, unwillingToPerform (locked or expired accounts).
const CREDENTIAL_CODES: [u32; 3] = [49, 50, 53];
/// busy, unavailable.
const UNAVAILABLE_CODES: [u32; 2] = [51, 52];

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Errors raised while talking to a directory.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DirectoryError {
    /// Endpoint unreachable, refused, reset or TLS handshake failed.
    #[error("cannot connect to LDAP server: {0}")]
    Unavailable(String),
    #[error("directory round trip timed out")]
    Timeout,
    /// Service-account search returned no entry.
    #[error("user not found in LDAP directory")]
    NotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    /// The configured service account could not bind.
    #[error("service account bind rejected (code {code})")]
    ServiceAccount { code: u32 },
    /// Directory answered with a non-success result code.
    #[error("LDAP operation failed (code {code}): {message}")]
    Operation { code: u32, message: String },
    /// Session operations issued out of order.
    #[error("LDAP session misuse: {0}")]
    Protocol(&'static str),
}

impl DirectoryError {
    /// Map a rejected bind into a credential failure. Transport failures and
    /// a directory that is busy or shutting down stay server-side problems.
    pub(crate) fn into_credentials(self) -> Self {
        match self {
            DirectoryError::Operation { code, .. }
                if CREDENTIAL_CODES.contains(&code) =>
            {
                DirectoryError::InvalidCredentials
            },
            DirectoryError::Operation { code, message }
                if UNAVAILABLE_CODES.contains(&code) =>
            {
                DirectoryError::Unavailable(format!("{message} (code {code})"))
            },
            DirectoryError::Protocol(_) => DirectoryError::InvalidCredentials,
            err => err,
        }
    }

    /// Map a rejected service-account bind.
    pub(crate) fn into_service_account(self) -> Self {
        match self {
            DirectoryError::Operation { code, message }
                if UNAVAILABLE_CODES.contains(&code) =>
            {
                DirectoryError::Unavailable(format!("{message} (code {code})"))
            },
            DirectoryError::Operation { code, .. } => {
                DirectoryError::ServiceAccount { code }
            },
            err => err,
        }
    }

    /// Short label used on metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DirectoryError::Unavailable(_) => "unavailable",
            DirectoryError::Timeout => "timeout",
            DirectoryError::NotFound => "not_found",
            DirectoryError::InvalidCredentials => "invalid_credentials",
            DirectoryError::ServiceAccount { .. } => "service_account",
            DirectoryError::Operation { .. } => "operation",
            DirectoryError::Protocol(_) => "protocol",
        }
    }
}

/// Directory connection settings, as sent by the administration screens.
#[derive(Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    /// `ldap://host:389` or `ldaps://host:636`.
    #[serde(default)]
    #[validate(custom(
        function = "validate_ldap_url",
        message = "URL must use the ldap:// or ldaps:// scheme."
    ))]
    pub url: String,
    #[serde(default, rename = "baseDN")]
    pub base_dn: String,
    #[serde(default = "default_user_search_filter")]
    pub user_search_filter: String,
    #[serde(default = "default_username_attribute")]
    pub username_attribute: String,
    #[serde(default = "default_true")]
    pub tls_enabled: bool,
    #[serde(default = "default_true")]
    pub tls_reject_unauthorized: bool,
    #[serde(default, rename = "serviceAccountDN")]
    pub service_account_dn: Option<String>,
    #[serde(default, skip_serializing)]
    pub service_account_password: Option<String>,
    #[serde(default = "default_true")]
    pub auto_create_users: bool,
    #[serde(default)]
    pub default_role: Option<String>,
}

fn default_user_search_filter() -> String {
    DEFAULT_USER_SEARCH_FILTER.to_owned()
}

fn default_username_attribute() -> String {
    DEFAULT_USERNAME_ATTRIBUTE.to_owned()
}

fn default_true() -> bool {
    true
}

fn validate_ldap_url(value: &str) -> std::result::Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(url)
            if matches!(url.scheme(), "ldap" | "ldaps")
                && url.host_str().is_some_and(|h| !h.is_empty()) =>
        {
            Ok(())
        },
        _ => Err(ValidationError::new("ldap_url")),
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            url: String::default(),
            base_dn: String::default(),
            user_search_filter: default_user_search_filter(),
            username_attribute: default_username_attribute(),
            tls_enabled: true,
            tls_reject_unauthorized: true,
            service_account_dn: None,
            service_account_password: None,
            auto_create_users: true,
            default_role: None,
        }
    }
}

impl DirectoryConfig {
    /// Which authentication strategy these settings select.
    ///
    /// Derived on every call; never cached.
    pub fn strategy(&self) -> Strategy<'_> {
        match (
            self.service_account_dn.as_deref().filter(|s| !s.is_empty()),
            self.service_account_password
                .as_deref()
                .filter(|s| !s.is_empty()),
        ) {
            (Some(dn), Some(password)) => {
                Strategy::ServiceAccount { dn, password }
            },
            _ => Strategy::DirectBind,
        }
    }

    /// Whether the administrator switched LDAP login off.
    pub fn is_disabled(&self) -> bool {
        self.enabled == Some(false)
    }

    /// Whether new accounts start as administrators.
    pub fn grants_administrator(&self) -> bool {
        self.default_role
            .as_deref()
            .is_some_and(|role| role.eq_ignore_ascii_case(ADMIN_ROLE))
    }

    /// `ldaps://` carries TLS from the first byte.
    pub fn implicit_tls(&self) -> bool {
        self.url.to_ascii_lowercase().starts_with("ldaps://")
    }
}

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("base_dn", &self.base_dn)
            .field("user_search_filter", &self.user_search_filter)
            .field("username_attribute", &self.username_attribute)
            .field("tls_enabled", &self.tls_enabled)
            .field("tls_reject_unauthorized", &self.tls_reject_unauthorized)
            .field("service_account_dn", &self.service_account_dn)
            .field(
                "service_account_password",
                &self.service_account_password.as_ref().map(|_| "<redacted>"),
            )
            .field("auto_create_users", &self.auto_create_users)
            .field("default_role", &self.default_role)
            .finish()
    }
}

/// How a login is checked against the directory.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Strategy<'a> {
    /// Look the user up with a privileged account, then bind as the user.
    ServiceAccount { dn: &'a str, password: &'a str },
    /// Bind straight away with a DN derived from the login.
    DirectBind,
}

impl fmt::Debug for Strategy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::ServiceAccount { dn, .. } => f
                .debug_struct("ServiceAccount")
                .field("dn", dn)
                .field("password", &"<redacted>")
                .finish(),
            Strategy::DirectBind => f.write_str("DirectBind"),
        }
    }
}

impl Strategy<'_> {
    /// Short label used on logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::ServiceAccount { .. } => "service_account",
            Strategy::DirectBind => "direct_bind",
        }
    }
}

/// Login supplied by the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub email: String,
    password: String,
}

impl Credential {
    /// Create a new [`Credential`].
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Text before the `@`, or the whole identifier without one.
    pub fn local_part(&self) -> &str {
        local_part(&self.email)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub(crate) fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// An attribute value: directories may answer with several values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Single(String),
    Multi(Vec<String>),
}

impl AttributeValue {
    /// First value, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            AttributeValue::Single(value) => Some(value.as_str()),
            AttributeValue::Multi(values) => values.first().map(String::as_str),
        }
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            AttributeValue::Single(values.remove(0))
        } else {
            AttributeValue::Multi(values)
        }
    }
}

pub type Attributes = HashMap<String, AttributeValue>;

/// A directory entry as returned by a search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: Attributes,
}

/// A verified directory user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryIdentity {
    pub distinguished_name: String,
    pub attributes: Attributes,
}
