use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::identity;
use crate::ldap::{self, Credential, DirectoryConfig, DirectoryError};
use crate::router::{Data, non_empty, parse_body};
use crate::telemetry::record_authentication;
use crate::token::TOKEN_TYPE;
use crate::user::ProvisionOptions;

#[derive(Debug, Default, Deserialize)]
pub struct Body {
    email: Option<String>,
    password: Option<String>,
    config: Option<DirectoryConfig>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token_type: String,
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub ldap_authenticated: bool,
    pub created: bool,
    pub session: Session,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Handler to log a user in against the directory.
pub async fn handler(state: &AppState, body: &[u8]) -> Result<Json<Data<Response>>> {
    let body: Body = parse_body(body)?;

    // Passwords are taken verbatim: surrounding spaces are part of them.
    let (Some(email), Some(password)) = (
        non_empty(body.email),
        body.password.filter(|password| !password.is_empty()),
    ) else {
        return Err(ServerError::MissingField(
            "Email and password are required",
        ));
    };
    let config = match body.config {
        Some(config)
            if !config.url.trim().is_empty()
                && !config.base_dn.trim().is_empty() =>
        {
            config
        },
        _ => {
            return Err(ServerError::MissingField(
                "LDAP configuration is incomplete",
            ));
        },
    };
    config.validate()?;

    if config.is_disabled() {
        return Err(ServerError::LdapDisabled);
    }

    let email = email.trim().to_owned();
    let credential = Credential::new(email.clone(), password);
    let strategy = config.strategy().name();

    let verified = tokio::time::timeout(
        state.config.directory_timeout(),
        ldap::authenticate(state.directory.as_ref(), &config, &credential),
    )
    .await
    .unwrap_or(Err(DirectoryError::Timeout));

    let directory_identity = match verified {
        Ok(identity) => {
            record_authentication(strategy, "success");
            tracing::info!(
                strategy,
                dn = %identity.distinguished_name,
                "ldap authentication succeeded"
            );
            identity
        },
        Err(err) => {
            record_authentication(strategy, err.kind());
            tracing::warn!(
                strategy,
                email = %email,
                error = %err,
                "ldap authentication failed"
            );
            return Err(err.into());
        },
    };

    let identity = identity::normalize(&directory_identity.attributes, &email);
    let provisioned = state
        .provisioner
        .provision(
            &identity,
            ProvisionOptions {
                auto_create: config.auto_create_users,
                administrator: config.grants_administrator(),
            },
        )
        .await?;

    let account = provisioned.account;
    if account.disabled {
        tracing::warn!(user_id = %account.id, "disabled account tried to log in");
        return Err(ServerError::AccountDisabled);
    }

    let access_token = state.token.create(&account)?;

    Ok(Data::new(Response {
        user_id: account.id.to_string(),
        email: account.email,
        first_name: account.first_name,
        last_name: account.last_name,
        ldap_authenticated: true,
        created: provisioned.created,
        session: Session {
            token_type: TOKEN_TYPE.to_owned(),
            access_token,
            expires_in: state.token.lifetime(),
        },
        warnings: provisioned.warnings,
    }))
}
