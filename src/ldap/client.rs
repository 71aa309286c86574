//! `ldap3` connector.

use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};

use super::session::{Connection, Connector, SearchScope};
use super::{DirectoryConfig, DirectoryEntry, DirectoryError, Result};

const ALL_USER_ATTRIBUTES: &str = "*";

/// Opens real LDAP connections.
#[derive(Debug, Clone)]
pub struct Ldap3Connector {
    timeout: Duration,
}

impl Ldap3Connector {
    /// Create a new [`Ldap3Connector`]. `timeout` bounds the TCP connect.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn settings(&self, config: &DirectoryConfig) -> LdapConnSettings {
        let tls = config.tls_enabled || config.implicit_tls();

        LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_starttls(config.tls_enabled && !config.implicit_tls())
            .set_no_tls_verify(tls && !config.tls_reject_unauthorized)
    }
}

#[async_trait]
impl Connector for Ldap3Connector {
    async fn connect(
        &self,
        config: &DirectoryConfig,
    ) -> Result<Box<dyn Connection>> {
        let (conn, ldap) =
            LdapConnAsync::with_settings(self.settings(config), &config.url)
                .await
                .map_err(classify)?;

        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                tracing::warn!(error = %err, "ldap connection driver stopped");
            }
        });

        Ok(Box::new(Ldap3Connection { ldap }))
    }
}

struct Ldap3Connection {
    ldap: Ldap,
}

#[async_trait]
impl Connection for Ldap3Connection {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.ldap
            .simple_bind(dn, password)
            .await
            .map_err(classify)?
            .success()
            .map_err(classify)?;
        Ok(())
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>> {
        let scope = match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::Subtree => Scope::Subtree,
        };

        let (entries, _) = self
            .ldap
            .search(base, scope, filter, vec![ALL_USER_ATTRIBUTES])
            .await
            .map_err(classify)?
            .success()
            .map_err(classify)?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                DirectoryEntry {
                    dn: entry.dn,
                    attributes: entry
                        .attrs
                        .into_iter()
                        .map(|(name, values)| (name, values.into()))
                        .collect(),
                }
            })
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.ldap.unbind().await.map_err(classify)
    }

    fn abandon(self: Box<Self>) {
        let mut ldap = self.ldap;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = ldap.unbind().await;
            });
        }
    }
}

/// Result codes are directory answers; everything else is transport.
fn classify(err: LdapError) -> DirectoryError {
    match err {
        LdapError::LdapResult { result } => DirectoryError::Operation {
            code: result.rc,
            message: result.text,
        },
        err => DirectoryError::Unavailable(err.to_string()),
    }
}
