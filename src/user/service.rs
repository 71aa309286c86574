//! Reconcile a verified directory identity with the local store.

use std::sync::Arc;

use chrono::Utc;

use crate::crypto::PasswordManager;
use crate::error::{Result, ServerError};
use crate::identity::NormalizedIdentity;
use crate::user::{Account, AccountStore, Profile, ProfileStore, StoreError};

const PROFILE_WARNING: &str = "Profile record could not be created.";

/// What the caller allows on first login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionOptions {
    /// Create missing accounts.
    pub auto_create: bool,
    /// New accounts are administrators.
    pub administrator: bool,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            auto_create: true,
            administrator: false,
        }
    }
}

/// Outcome of [`Provisioner::provision`].
#[derive(Debug, Clone, PartialEq)]
pub struct Provisioned {
    pub account: Account,
    pub created: bool,
    /// Non-fatal problems, safe to show to the user.
    pub warnings: Vec<String>,
}

/// Account provisioner.
#[derive(Clone)]
pub struct Provisioner {
    accounts: Arc<dyn AccountStore>,
    profiles: Arc<dyn ProfileStore>,
    pwd: Arc<PasswordManager>,
}

impl Provisioner {
    /// Create a new [`Provisioner`].
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        profiles: Arc<dyn ProfileStore>,
        pwd: Arc<PasswordManager>,
    ) -> Self {
        Self {
            accounts,
            profiles,
            pwd,
        }
    }

    /// Make sure an up to date account and its profile exist for `identity`.
    pub async fn provision(
        &self,
        identity: &NormalizedIdentity,
        options: ProvisionOptions,
    ) -> Result<Provisioned> {
        let (account, created) =
            match self.accounts.find_by_email(&identity.email).await? {
                Some(account) => (self.sync(account, identity).await?, false),
                None if !options.auto_create => {
                    return Err(ServerError::AccountNotProvisioned);
                },
                None => self.create(identity, options).await?,
            };

        let mut warnings = Vec::new();
        if let Err(err) = self.ensure_profile(&account).await {
            tracing::warn!(
                user_id = %account.id,
                error = %err,
                "profile not created"
            );
            warnings.push(PROFILE_WARNING.to_owned());
        }

        Ok(Provisioned {
            account,
            created,
            warnings,
        })
    }

    async fn create(
        &self,
        identity: &NormalizedIdentity,
        options: ProvisionOptions,
    ) -> Result<(Account, bool)> {
        let account = Account::new(
            identity,
            self.pwd.unusable_password()?,
            options.administrator,
            Utc::now(),
        );

        match self.accounts.create(&account).await {
            Ok(()) => {
                tracing::info!(user_id = %account.id, "account created from directory");
                Ok((account, true))
            },
            // Another login for the same email won the race.
            Err(StoreError::Duplicate) => {
                let existing = self
                    .accounts
                    .find_by_email(&identity.email)
                    .await?
                    .ok_or(StoreError::Duplicate)?;
                Ok((self.sync(existing, identity).await?, false))
            },
            Err(err) => Err(err.into()),
        }
    }

    async fn sync(
        &self,
        mut account: Account,
        identity: &NormalizedIdentity,
    ) -> Result<Account> {
        let now = Utc::now();
        self.accounts
            .update_identity(account.id, identity, now)
            .await?;

        account.first_name = identity.first_name.clone();
        account.last_name = identity.last_name.clone();
        account.ldap_synced = true;
        account.synced_at = Some(now);
        Ok(account)
    }

    async fn ensure_profile(
        &self,
        account: &Account,
    ) -> std::result::Result<(), StoreError> {
        if self.profiles.find_by_user_id(account.id).await?.is_some() {
            return Ok(());
        }

        match self.profiles.insert(&Profile::from(account)).await {
            Ok(()) | Err(StoreError::Duplicate) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
