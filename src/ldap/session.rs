//! Directory session lifecycle and the two login strategies.
//!
//! A [`Session`] owns one connection. It is released exactly once, either
//! explicitly through [`Session::release`] or, when the owning future is
//! cancelled, by a detached unbind spawned from `Drop`.

use async_trait::async_trait;

use super::filter;
use super::{
    Attributes, Credential, DirectoryConfig, DirectoryEntry, DirectoryError,
    DirectoryIdentity, Result, Strategy,
};

const SELF_FILTER: &str = "(objectClass=*)";

/// Search depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    Subtree,
}

/// Opens connections to a directory.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &DirectoryConfig,
    ) -> Result<Box<dyn Connection>>;
}

/// One open directory connection.
#[async_trait]
pub trait Connection: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>>;

    async fn unbind(&mut self) -> Result<()>;

    /// Tear the connection down without waiting, used when a session is
    /// dropped before it was released.
    fn abandon(self: Box<Self>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Connected,
    Bound(String),
    Searched(String),
}

/// Guarded connect/bind/search/unbind sequence.
pub struct Session {
    conn: Option<Box<dyn Connection>>,
    state: State,
}

impl Session {
    /// Connect to the directory.
    pub async fn open(
        connector: &dyn Connector,
        config: &DirectoryConfig,
    ) -> Result<Self> {
        let conn = connector.connect(config).await?;
        tracing::debug!(url = %config.url, "ldap connected");

        Ok(Self {
            conn: Some(conn),
            state: State::Connected,
        })
    }

    fn conn(&mut self) -> Result<&mut Box<dyn Connection>> {
        self.conn
            .as_mut()
            .ok_or(DirectoryError::Protocol("connection already released"))
    }

    /// Simple bind. An empty password is refused up front: servers treat it
    /// as an unauthenticated bind and accept it.
    pub async fn bind(&mut self, dn: &str, password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(DirectoryError::Protocol("empty bind password"));
        }

        self.conn()?.simple_bind(dn, password).await?;
        self.state = State::Bound(dn.to_owned());
        Ok(())
    }

    /// Search as the bound identity, requesting every user attribute.
    pub async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>> {
        let bound_as = match &self.state {
            State::Bound(dn) | State::Searched(dn) => dn.clone(),
            State::Connected => {
                return Err(DirectoryError::Protocol("search before bind"));
            },
        };

        let entries = self.conn()?.search(base, scope, filter).await?;
        tracing::debug!(%base, ?scope, results = entries.len(), "ldap search");

        self.state = State::Searched(bound_as);
        Ok(entries)
    }

    /// Unbind and close. Failures are logged and swallowed so they never
    /// replace the outcome of the work done on the session.
    pub async fn release(mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(err) = conn.unbind().await {
                tracing::debug!(error = %err, state = ?self.state, "ldap unbind failed");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::debug!(state = ?self.state, "ldap session dropped before release");
            conn.abandon();
        }
    }
}

/// Check `credential` against the directory described by `config`.
///
/// The strategy is re-derived from `config` on every call.
pub async fn authenticate(
    connector: &dyn Connector,
    config: &DirectoryConfig,
    credential: &Credential,
) -> Result<DirectoryIdentity> {
    match config.strategy() {
        Strategy::ServiceAccount { dn, password } => {
            service_account(connector, config, dn, password, credential).await
        },
        Strategy::DirectBind => direct_bind(connector, config, credential).await,
    }
}

/// Look the user up as the service account, then bind as the user found.
async fn service_account(
    connector: &dyn Connector,
    config: &DirectoryConfig,
    service_dn: &str,
    service_password: &str,
    credential: &Credential,
) -> Result<DirectoryIdentity> {
    let search_filter =
        filter::render(&config.user_search_filter, &credential.email, &credential.email);

    let mut session = Session::open(connector, config).await?;
    let lookup = async {
        session
            .bind(service_dn, service_password)
            .await
            .map_err(DirectoryError::into_service_account)?;

        session
            .search(&config.base_dn, SearchScope::Subtree, &search_filter)
            .await?
            .into_iter()
            .next()
            .ok_or(DirectoryError::NotFound)
    }
    .await;
    session.release().await;
    let entry = lookup?;

    // This bind is the credential check.
    let mut session = Session::open(connector, config).await?;
    let verified = session
        .bind(&entry.dn, credential.password())
        .await
        .map_err(DirectoryError::into_credentials);
    session.release().await;
    verified?;

    Ok(DirectoryIdentity {
        distinguished_name: entry.dn,
        attributes: entry.attributes,
    })
}

/// Bind with a DN built from the login, then read the bound entry.
async fn direct_bind(
    connector: &dyn Connector,
    config: &DirectoryConfig,
    credential: &Credential,
) -> Result<DirectoryIdentity> {
    let bind_dn = filter::render(
        &config.user_search_filter,
        credential.local_part(),
        &credential.email,
    );

    let mut session = Session::open(connector, config).await?;
    let attributes = async {
        session
            .bind(&bind_dn, credential.password())
            .await
            .map_err(DirectoryError::into_credentials)?;

        read_own_entry(&mut session, &bind_dn).await
    }
    .await;
    session.release().await;

    Ok(DirectoryIdentity {
        distinguished_name: bind_dn,
        attributes: attributes?,
    })
}

async fn read_own_entry(session: &mut Session, dn: &str) -> Result<Attributes> {
    match session.search(dn, SearchScope::Base, SELF_FILTER).await {
        Ok(entries) => Ok(entries
            .into_iter()
            .next()
            .map(|entry| entry.attributes)
            .unwrap_or_default()),
        // Bind names such as UPNs are not searchable DNs.
        Err(DirectoryError::Operation { code, message }) => {
            tracing::debug!(code, %message, "ldap self search rejected");
            Ok(Attributes::default())
        },
        Err(err) => Err(err),
    }
}
