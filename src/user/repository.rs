//! Handle identity store requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::identity::NormalizedIdentity;
use crate::user::{Account, Profile};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unique constraint hit, typically a concurrent insert.
    #[error("record already exists")]
    Duplicate,
    #[error("SQL request failed: {0}")]
    Sql(sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Duplicate
            },
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_) => StoreError::Unavailable(err.to_string()),
            err => StoreError::Sql(err),
        }
    }
}

/// Local accounts, keyed by email.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Exact match on `email`.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Insert `account`. Returns [`StoreError::Duplicate`] if the email is
    /// taken.
    async fn create(&self, account: &Account) -> Result<()>;

    /// Refresh names and sync timestamp. Flags stay untouched.
    async fn update_identity(
        &self,
        id: Uuid,
        identity: &NormalizedIdentity,
        synced_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Business profiles, one per account.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<Profile>>;

    async fn insert(&self, profile: &Profile) -> Result<()>;
}

const SELECT_ACCOUNT: &str = r#"SELECT
        id,
        email,
        first_name,
        last_name,
        password_hash,
        disabled,
        administrator,
        ldap_synced,
        created_at,
        synced_at
    FROM accounts
    WHERE email = $1"#;

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new [`PostgresStore`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PostgresStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(sqlx::query_as::<_, Account>(SELECT_ACCOUNT)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO accounts (id, email, first_name, last_name, password_hash, disabled, administrator, ldap_synced, created_at, synced_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.password_hash)
        .bind(account.disabled)
        .bind(account.administrator)
        .bind(account.ldap_synced)
        .bind(account.created_at)
        .bind(account.synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_identity(
        &self,
        id: Uuid,
        identity: &NormalizedIdentity,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE accounts
                SET first_name = $1, last_name = $2, ldap_synced = TRUE, synced_at = $3
                WHERE id = $4"#,
        )
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(synced_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ProfileStore for PostgresStore {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<Profile>> {
        Ok(sqlx::query_as::<_, Profile>(
            r#"SELECT user_id, email, first_name, last_name, disabled, administrator
                FROM profiles WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert(&self, profile: &Profile) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO profiles (user_id, email, first_name, last_name, disabled, administrator)
                VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(profile.user_id)
        .bind(&profile.email)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(profile.disabled)
        .bind(profile.administrator)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
