mod memory;
mod repository;
mod service;

pub use memory::*;
pub use repository::*;
pub use service::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::NormalizedIdentity;

/// Local account as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Never usable: accounts are authenticated by the directory.
    #[serde(skip)]
    pub password_hash: String,
    pub disabled: bool,
    pub administrator: bool,
    pub ldap_synced: bool,
    pub created_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Fresh account for a verified directory identity.
    pub fn new(
        identity: &NormalizedIdentity,
        password_hash: String,
        administrator: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: identity.email.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            password_hash,
            disabled: false,
            administrator,
            ldap_synced: true,
            created_at: now,
            synced_at: Some(now),
        }
    }
}

/// Business profile linked to an [`Account`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub disabled: bool,
    pub administrator: bool,
}

impl From<&Account> for Profile {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.id,
            email: account.email.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            disabled: account.disabled,
            administrator: account.administrator,
        }
    }
}
