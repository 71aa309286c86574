//! In-process store, used when no database is configured.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::identity::NormalizedIdentity;
use crate::user::{
    Account, AccountStore, Profile, ProfileStore, Result, StoreError,
};

/// Accounts and profiles kept in memory. Lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    profiles: Arc<RwLock<HashMap<Uuid, Profile>>>,
}

impl MemoryStore {
    /// Create a new [`MemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryStore {
    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn profile_count(&self) -> usize {
        self.profiles.read().await.len()
    }

    /// Update flags of an existing account, as an administrator would.
    pub async fn set_flags(&self, email: &str, disabled: bool, administrator: bool) {
        if let Some(account) = self.accounts.write().await.get_mut(email) {
            account.disabled = disabled;
            account.administrator = administrator;
        }
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self.accounts.read().await.get(email).cloned())
    }

    async fn create(&self, account: &Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.email) {
            return Err(StoreError::Duplicate);
        }

        accounts.insert(account.email.clone(), account.clone());
        Ok(())
    }

    async fn update_identity(
        &self,
        id: Uuid,
        identity: &NormalizedIdentity,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.values_mut().find(|a| a.id == id) {
            account.first_name = identity.first_name.clone();
            account.last_name = identity.last_name.clone();
            account.ldap_synced = true;
            account.synced_at = Some(synced_at);
        }

        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<Profile>> {
        Ok(self.profiles.read().await.get(&user_id).cloned())
    }

    async fn insert(&self, profile: &Profile) -> Result<()> {
        let mut profiles = self.profiles.write().await;
        if profiles.contains_key(&profile.user_id) {
            return Err(StoreError::Duplicate);
        }

        profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }
}

/// Profile table that refuses every insert.
#[cfg(test)]
pub struct BrokenProfiles;

#[cfg(test)]
#[async_trait]
impl ProfileStore for BrokenProfiles {
    async fn find_by_user_id(&self, _user_id: Uuid) -> Result<Option<Profile>> {
        Ok(None)
    }

    async fn insert(&self, _profile: &Profile) -> Result<()> {
        Err(StoreError::Unavailable("profiles table rejected insert".into()))
    }
}
