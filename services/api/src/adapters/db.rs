//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `PantryBackend` and `IdentityProvider` ports from the `core` crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.
//!
//! Each user's pantry is a single JSONB document in `pantries`; the counters
//! live on the `users` row. Every pantry write locks the user row first, so id
//! allocation and cardinality updates never interleave for one user.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pantry_core::{
    repair_item_ids, Identity, IdentityProvider, ItemId, PantryBackend, PortError, PortResult,
    ProviderProfile, RawItem, User, UserCredentials,
};
use sqlx::{types::Json, FromRow, PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use super::password::{hash_password, verify_password};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the pantry and identity ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn begin(&self) -> PortResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(unexpected)
    }

    /// Locks the user row and loads the pantry document. Id-less documents are
    /// given ids from the counter; the repair is saved by `store_pantry`.
    async fn lock_pantry(
        tx: &mut Transaction<'static, Postgres>,
        user_id: Uuid,
    ) -> PortResult<(UserRecord, Vec<RawItem>)> {
        let mut user = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, name, email, item_cardinality, next_item_id, created_at \
             FROM users WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;

        let mut items = sqlx::query_as::<_, PantryRecord>("SELECT items FROM pantries WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(unexpected)?
            .map(|r| r.items.0)
            .unwrap_or_default();

        let next_item_id = repair_item_ids(&mut items, user.next_item_id.max(1) as ItemId) as i64;
        if next_item_id != user.next_item_id.max(1) {
            warn!(%user_id, "Assigned ids to stored items without one");
        }
        user.next_item_id = next_item_id;

        Ok((user, items))
    }

    /// Writes the pantry document and counters, then commits.
    async fn store_pantry(
        mut tx: Transaction<'static, Postgres>,
        user: &UserRecord,
        items: &[RawItem],
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO pantries (user_id, items) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET items = EXCLUDED.items, updated_at = now()",
        )
        .bind(user.user_id)
        .bind(Json(items))
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query("UPDATE users SET item_cardinality = $2, next_item_id = $3 WHERE user_id = $1")
            .bind(user.user_id)
            .bind(user.item_cardinality)
            .bind(user.next_item_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)
    }

    async fn insert_user(&self, name: &str, email: &str, hashed_password: Option<&str>) -> PortResult<Identity> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, name, email, hashed_password) VALUES ($1, $2, $3, $4) \
             RETURNING user_id, name, email, item_cardinality, next_item_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                PortError::Conflict(format!("{} is already registered", email))
            } else {
                unexpected(e)
            }
        })?;
        Ok(record.to_identity())
    }

    async fn find_credentials(&self, email: &str) -> PortResult<Option<UserCredentials>> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, name, email, hashed_password FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.and_then(|r| r.to_domain()))
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    name: String,
    email: String,
    item_cardinality: i64,
    next_item_id: i64,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(&self) -> User {
        User {
            user_id: self.user_id,
            name: self.name.clone(),
            email: self.email.clone(),
            item_cardinality: self.item_cardinality.max(0) as u64,
            next_item_id: self.next_item_id.max(1) as ItemId,
            created_at: self.created_at,
        }
    }

    fn to_identity(&self) -> Identity {
        Identity {
            user_id: self.user_id,
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(FromRow)]
struct PantryRecord {
    items: Json<Vec<RawItem>>,
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    name: String,
    email: String,
    hashed_password: Option<String>,
}
impl CredentialsRecord {
    /// Provider-only accounts have no password and cannot sign in with one.
    fn to_domain(self) -> Option<UserCredentials> {
        let hashed_password = self.hashed_password?;
        Some(UserCredentials {
            identity: Identity {
                user_id: self.user_id,
                email: self.email,
                name: self.name,
            },
            hashed_password,
        })
    }
}

#[derive(FromRow)]
struct SessionIdentityRecord {
    user_id: Uuid,
    name: String,
    email: String,
}

//=========================================================================================
// `PantryBackend` Trait Implementation
//=========================================================================================

#[async_trait]
impl PantryBackend for DbAdapter {
    async fn ensure_user(&self, identity: &Identity) -> PortResult<User> {
        sqlx::query(
            "INSERT INTO users (user_id, name, email) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(identity.user_id)
        .bind(&identity.name)
        .bind(&identity.email)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        self.get_user(identity.user_id).await
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, name, email, item_cardinality, next_item_id, created_at \
             FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn load_items(&self, user_id: Uuid) -> PortResult<Vec<RawItem>> {
        let record = sqlx::query_as::<_, PantryRecord>("SELECT items FROM pantries WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        let items = record.map(|r| r.items.0).unwrap_or_default();
        if items.iter().all(|i| i.id.is_some()) {
            return Ok(items);
        }

        let mut tx = self.begin().await?;
        let (user, repaired) = Self::lock_pantry(&mut tx, user_id).await?;
        Self::store_pantry(tx, &user, &repaired).await?;
        Ok(repaired)
    }

    async fn append_items(&self, user_id: Uuid, items: Vec<RawItem>) -> PortResult<Vec<RawItem>> {
        let mut tx = self.begin().await?;
        let (mut user, mut stored) = Self::lock_pantry(&mut tx, user_id).await?;

        let count = items.len() as i64;
        let first_id = user.next_item_id.max(1);
        stored.extend(items.into_iter().zip(first_id..).map(|(mut item, id)| {
            item.id = Some(id as ItemId);
            item
        }));
        user.next_item_id = first_id + count;
        user.item_cardinality += count;

        Self::store_pantry(tx, &user, &stored).await?;
        Ok(stored)
    }

    async fn replace_item(&self, user_id: Uuid, item: RawItem) -> PortResult<Vec<RawItem>> {
        let item_id = item
            .id
            .ok_or_else(|| PortError::NotFound("Item without an id".to_string()))?;
        let mut tx = self.begin().await?;
        let (user, mut stored) = Self::lock_pantry(&mut tx, user_id).await?;

        let slot = stored
            .iter_mut()
            .find(|i| i.id == Some(item_id))
            .ok_or_else(|| PortError::NotFound(format!("Item {} not found", item_id)))?;
        *slot = item;

        Self::store_pantry(tx, &user, &stored).await?;
        Ok(stored)
    }

    async fn remove_item(&self, user_id: Uuid, item_id: ItemId) -> PortResult<Vec<RawItem>> {
        let mut tx = self.begin().await?;
        let (mut user, mut stored) = Self::lock_pantry(&mut tx, user_id).await?;

        let before = stored.len();
        stored.retain(|i| i.id != Some(item_id));
        if stored.len() == before {
            return Err(PortError::NotFound(format!("Item {} not found", item_id)));
        }
        user.item_cardinality = (user.item_cardinality - 1).max(0);

        Self::store_pantry(tx, &user, &stored).await?;
        Ok(stored)
    }

    async fn clear_items(&self, user_id: Uuid) -> PortResult<usize> {
        let mut tx = self.begin().await?;
        let (mut user, stored) = Self::lock_pantry(&mut tx, user_id).await?;
        user.item_cardinality = 0;
        Self::store_pantry(tx, &user, &[]).await?;
        info!(%user_id, removed = stored.len(), "Cleared pantry document");
        Ok(stored.len())
    }
}

//=========================================================================================
// `IdentityProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityProvider for DbAdapter {
    async fn sign_up(&self, name: &str, email: &str, password: &str) -> PortResult<Identity> {
        let hashed = hash_password(password)?;
        self.insert_user(name, email, Some(&hashed)).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<Identity> {
        let credentials = self
            .find_credentials(email)
            .await?
            .ok_or(PortError::Unauthorized)?;
        verify_password(password, &credentials.hashed_password)?;
        Ok(credentials.identity)
    }

    async fn sign_in_with_provider(&self, profile: &ProviderProfile) -> PortResult<Identity> {
        let existing = sqlx::query_as::<_, SessionIdentityRecord>(
            "SELECT user_id, name, email FROM users WHERE lower(email) = lower($1)",
        )
        .bind(&profile.email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        if let Some(r) = existing {
            return Ok(Identity {
                user_id: r.user_id,
                email: r.email,
                name: r.name,
            });
        }
        let identity = self.insert_user(&profile.name, &profile.email, None).await?;
        info!(provider = %profile.provider, user_id = %identity.user_id, "Created account from provider sign-in");
        Ok(identity)
    }

    async fn create_auth_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, token: &str) -> PortResult<Identity> {
        let record = sqlx::query_as::<_, SessionIdentityRecord>(
            "SELECT u.user_id, u.name, u.email FROM auth_sessions s \
             JOIN users u ON u.user_id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > now()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)?;

        Ok(Identity {
            user_id: record.user_id,
            email: record.email,
            name: record.name,
        })
    }

    async fn delete_auth_session(&self, token: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
