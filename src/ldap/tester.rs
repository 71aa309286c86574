//! Connection check for the administration screens.

use super::session::{Connector, Session};
use super::{DirectoryConfig, Result, Strategy};

/// Connect and, when a service account is configured, bind and unbind with
/// it. Never searches.
pub async fn test_connection(
    connector: &dyn Connector,
    config: &DirectoryConfig,
) -> Result<()> {
    let mut session = Session::open(connector, config).await?;

    let outcome = match config.strategy() {
        Strategy::ServiceAccount { dn, password } => session
            .bind(dn, password)
            .await
            .map_err(super::DirectoryError::into_service_account),
        Strategy::DirectBind => Ok(()),
    };
    session.release().await;

    outcome
}
