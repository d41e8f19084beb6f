//! services/api/src/adapters/memory.rs
//!
//! The local mock store: an in-memory implementation of both the
//! `PantryBackend` and `IdentityProvider` ports, for development without a
//! database. When given a snapshot path, accounts and pantries are written
//! to a JSON file after every change and reloaded at startup. A change only
//! becomes visible once its snapshot has been written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pantry_core::{
    repair_item_ids, Clock, Identity, IdentityProvider, ItemId, PantryBackend, PortError,
    PortResult, ProviderProfile, RawItem, User, UserCredentials,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::password::{hash_password, verify_password};

//=========================================================================================
// Stored State
//=========================================================================================

#[derive(Clone, Default, Serialize, Deserialize)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    pantries: HashMap<Uuid, Vec<RawItem>>,
    /// Password hashes keyed by lowercase email; provider-only accounts have none.
    passwords: HashMap<String, String>,
    #[serde(skip)]
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
}

impl MemoryState {
    fn user_mut(&mut self, user_id: Uuid) -> PortResult<&mut User> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    /// The user's pantry, with any id-less documents given ids from the counter.
    fn pantry_mut(&mut self, user_id: Uuid) -> PortResult<(&mut User, &mut Vec<RawItem>)> {
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        let pantry = self.pantries.entry(user_id).or_default();
        let next_item_id = repair_item_ids(pantry, user.next_item_id);
        if next_item_id != user.next_item_id {
            warn!(%user_id, "Assigned ids to {} stored items without one", next_item_id - user.next_item_id);
            user.next_item_id = next_item_id;
        }
        Ok((user, pantry))
    }

    fn needs_repair(&self, user_id: Uuid) -> bool {
        self.pantries
            .get(&user_id)
            .is_some_and(|items| items.iter().any(|i| i.id.is_none()))
    }

    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    fn credentials(&self, email: &str) -> Option<UserCredentials> {
        let user = self.user_by_email(email)?;
        let hashed_password = self.passwords.get(&email.to_lowercase())?.clone();
        Some(UserCredentials {
            identity: identity_of(user),
            hashed_password,
        })
    }

    fn create_account(
        &mut self,
        name: &str,
        email: &str,
        created_at: DateTime<Utc>,
    ) -> PortResult<User> {
        if self.user_by_email(email).is_some() {
            return Err(PortError::Conflict(format!("{} is already registered", email)));
        }
        let identity = Identity {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
        };
        let user = User::new(&identity, created_at);
        self.users.insert(user.user_id, user.clone());
        Ok(user)
    }
}

fn identity_of(user: &User) -> Identity {
    Identity {
        user_id: user.user_id,
        email: user.email.clone(),
        name: user.name.clone(),
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct MemoryStore {
    state: Mutex<MemoryState>,
    snapshot_path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    bulk_clear: bool,
}

impl MemoryStore {
    /// Creates an empty store that lives only in memory.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            snapshot_path: None,
            clock,
            bulk_clear: true,
        }
    }

    /// Opens a store backed by a snapshot file, loading it if it already exists.
    pub async fn open(path: PathBuf, clock: Arc<dyn Clock>) -> PortResult<Self> {
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                PortError::Unexpected(format!("Corrupt mock store {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No mock store at {}; starting empty", path.display());
                MemoryState::default()
            }
            Err(e) => return Err(PortError::Unexpected(e.to_string())),
        };
        Ok(Self {
            state: Mutex::new(state),
            snapshot_path: Some(path),
            clock,
            bulk_clear: true,
        })
    }

    /// Disables the bulk clear primitive, so delete-all goes item by item.
    pub fn without_bulk_clear(mut self) -> Self {
        self.bulk_clear = false;
        self
    }

    /// Runs `change` against a copy of the state and makes the copy current
    /// only once it has been persisted.
    async fn update<T>(
        &self,
        change: impl FnOnce(&mut MemoryState) -> PortResult<T>,
    ) -> PortResult<T> {
        let mut state = self.state.lock().await;
        let Some(path) = &self.snapshot_path else {
            return change(&mut state);
        };
        let mut next = state.clone();
        let out = change(&mut next)?;

        let bytes = serde_json::to_vec_pretty(&next)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        tokio::fs::write(path, bytes).await.map_err(|e| {
            warn!("Failed to write mock store {}: {}", path.display(), e);
            PortError::Unexpected(e.to_string())
        })?;

        *state = next;
        Ok(out)
    }
}

//=========================================================================================
// `PantryBackend` Trait Implementation
//=========================================================================================

#[async_trait]
impl PantryBackend for MemoryStore {
    async fn ensure_user(&self, identity: &Identity) -> PortResult<User> {
        if let Some(user) = self.state.lock().await.users.get(&identity.user_id) {
            return Ok(user.clone());
        }
        let created_at = self.clock.now();
        self.update(|state| {
            let user = state
                .users
                .entry(identity.user_id)
                .or_insert_with(|| User::new(identity, created_at));
            Ok(user.clone())
        })
        .await
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let mut state = self.state.lock().await;
        state.user_mut(user_id).map(|u| u.clone())
    }

    async fn load_items(&self, user_id: Uuid) -> PortResult<Vec<RawItem>> {
        {
            let state = self.state.lock().await;
            if !state.needs_repair(user_id) {
                return Ok(state.pantries.get(&user_id).cloned().unwrap_or_default());
            }
        }
        self.update(|state| {
            let (_, pantry) = state.pantry_mut(user_id)?;
            Ok(pantry.clone())
        })
        .await
    }

    async fn append_items(&self, user_id: Uuid, items: Vec<RawItem>) -> PortResult<Vec<RawItem>> {
        self.update(|state| {
            let (user, pantry) = state.pantry_mut(user_id)?;
            let first_id = user.next_item_id;
            let count = items.len() as u64;
            user.next_item_id += count;
            user.item_cardinality += count;

            pantry.extend(items.into_iter().zip(first_id..).map(|(mut item, id)| {
                item.id = Some(id);
                item
            }));
            debug!(%user_id, first_id, count, "Appended items to mock pantry");
            Ok(pantry.clone())
        })
        .await
    }

    async fn replace_item(&self, user_id: Uuid, item: RawItem) -> PortResult<Vec<RawItem>> {
        let item_id = item
            .id
            .ok_or_else(|| PortError::NotFound("Item without an id".to_string()))?;
        self.update(|state| {
            let (_, pantry) = state.pantry_mut(user_id)?;
            let slot = pantry
                .iter_mut()
                .find(|i| i.id == Some(item_id))
                .ok_or_else(|| PortError::NotFound(format!("Item {} not found", item_id)))?;
            *slot = item;
            Ok(pantry.clone())
        })
        .await
    }

    async fn remove_item(&self, user_id: Uuid, item_id: ItemId) -> PortResult<Vec<RawItem>> {
        self.update(|state| {
            let (user, pantry) = state.pantry_mut(user_id)?;
            let before = pantry.len();
            pantry.retain(|i| i.id != Some(item_id));
            if pantry.len() == before {
                return Err(PortError::NotFound(format!("Item {} not found", item_id)));
            }
            user.item_cardinality = user.item_cardinality.saturating_sub(1);
            Ok(pantry.clone())
        })
        .await
    }

    async fn clear_items(&self, user_id: Uuid) -> PortResult<usize> {
        if !self.bulk_clear {
            return Err(PortError::Unsupported("clear_items"));
        }
        self.update(|state| {
            let removed = state.pantries.remove(&user_id).map_or(0, |items| items.len());
            if let Ok(user) = state.user_mut(user_id) {
                user.item_cardinality = 0;
            }
            Ok(removed)
        })
        .await
    }
}

//=========================================================================================
// `IdentityProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityProvider for MemoryStore {
    async fn sign_up(&self, name: &str, email: &str, password: &str) -> PortResult<Identity> {
        let hashed = hash_password(password)?;
        let created_at = self.clock.now();
        self.update(|state| {
            let user = state.create_account(name, email, created_at)?;
            state.passwords.insert(email.to_lowercase(), hashed);
            Ok(identity_of(&user))
        })
        .await
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<Identity> {
        let credentials = {
            let state = self.state.lock().await;
            state.credentials(email).ok_or(PortError::Unauthorized)?
        };
        verify_password(password, &credentials.hashed_password)?;
        Ok(credentials.identity)
    }

    async fn sign_in_with_provider(&self, profile: &ProviderProfile) -> PortResult<Identity> {
        if let Some(user) = self.state.lock().await.user_by_email(&profile.email) {
            return Ok(identity_of(user));
        }
        let created_at = self.clock.now();
        let user = self
            .update(|state| match state.user_by_email(&profile.email) {
                Some(user) => Ok(user.clone()),
                None => state.create_account(&profile.name, &profile.email, created_at),
            })
            .await?;
        info!(provider = %profile.provider, user_id = %user.user_id, "Signed in from provider profile");
        Ok(identity_of(&user))
    }

    async fn create_auth_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut state = self.state.lock().await;
        state.sessions.insert(token.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, token: &str) -> PortResult<Identity> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let (user_id, expires_at) = *state.sessions.get(token).ok_or(PortError::Unauthorized)?;
        if expires_at <= now {
            state.sessions.remove(token);
            return Err(PortError::Unauthorized);
        }
        let user = state.users.get(&user_id).ok_or(PortError::Unauthorized)?;
        Ok(identity_of(user))
    }

    async fn delete_auth_session(&self, token: &str) -> PortResult<()> {
        let mut state = self.state.lock().await;
        state.sessions.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pantry_core::{FixedClock, PantryStore};
    use serde_json::json;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap()))
    }

    fn raw(name: &str) -> RawItem {
        RawItem {
            name: Some(json!(name)),
            ..RawItem::default()
        }
    }

    async fn user_with_next_id(store: &MemoryStore, next_item_id: u64) -> Uuid {
        let identity = Identity {
            user_id: Uuid::new_v4(),
            email: "sam@example.com".into(),
            name: "Sam".into(),
        };
        store.ensure_user(&identity).await.unwrap();
        store.state.lock().await.user_mut(identity.user_id).unwrap().next_item_id = next_item_id;
        identity.user_id
    }

    #[tokio::test]
    async fn append_assigns_ids_from_the_counter() {
        let store = MemoryStore::new(clock());
        let user_id = user_with_next_id(&store, 5).await;

        let items = store
            .append_items(user_id, vec![raw("Milk"), raw("Eggs")])
            .await
            .unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![Some(5), Some(6)]);

        let user = store.get_user(user_id).await.unwrap();
        assert_eq!(user.next_item_id, 7);
        assert_eq!(user.item_cardinality, 2);
    }

    #[tokio::test]
    async fn remove_floors_cardinality_at_zero() {
        let store = MemoryStore::new(clock());
        let user_id = user_with_next_id(&store, 1).await;
        store.append_items(user_id, vec![raw("Milk")]).await.unwrap();
        store.state.lock().await.user_mut(user_id).unwrap().item_cardinality = 0;

        store.remove_item(user_id, 1).await.unwrap();
        assert_eq!(store.get_user(user_id).await.unwrap().item_cardinality, 0);
        assert!(matches!(
            store.remove_item(user_id, 1).await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn sessions_expire() {
        let store = MemoryStore::new(clock());
        let identity = store.sign_up("Sam", "sam@example.com", "pw").await.unwrap();
        let now = clock().now();
        store
            .create_auth_session("live", identity.user_id, now + Duration::hours(1))
            .await
            .unwrap();
        store
            .create_auth_session("stale", identity.user_id, now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(store.validate_auth_session("live").await.unwrap(), identity);
        assert!(matches!(
            store.validate_auth_session("stale").await,
            Err(PortError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn duplicate_sign_up_conflicts_and_bad_password_is_rejected() {
        let store = MemoryStore::new(clock());
        store.sign_up("Sam", "sam@example.com", "pw").await.unwrap();
        assert!(matches!(
            store.sign_up("Sam", "SAM@example.com", "pw").await,
            Err(PortError::Conflict(_))
        ));
        assert!(store.sign_in("sam@example.com", "pw").await.is_ok());
        assert!(matches!(
            store.sign_in("sam@example.com", "nope").await,
            Err(PortError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pantry.json");

        let store = MemoryStore::open(path.clone(), clock()).await.unwrap();
        let user_id = user_with_next_id(&store, 1).await;
        store.append_items(user_id, vec![raw("Bread")]).await.unwrap();
        drop(store);

        let reopened = MemoryStore::open(path, clock()).await.unwrap();
        let items = reopened.load_items(user_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, Some(json!("Bread")));
        assert_eq!(reopened.get_user(user_id).await.unwrap().next_item_id, 2);
    }

    #[tokio::test]
    async fn id_less_documents_get_ids_and_can_be_deleted() {
        let store = MemoryStore::new(clock()).without_bulk_clear();
        let user_id = user_with_next_id(&store, 2).await;
        {
            let mut state = store.state.lock().await;
            state.pantries.insert(
                user_id,
                vec![RawItem { id: Some(1), ..raw("Milk") }, raw("legacy")],
            );
            state.user_mut(user_id).unwrap().item_cardinality = 2;
        }

        let pantry = PantryStore::new(Arc::new(store), clock());
        let identity = Identity {
            user_id,
            email: "sam@example.com".into(),
            name: "Sam".into(),
        };
        let items = pantry.get_items(&identity).await.unwrap();
        assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(pantry.user(&identity).await.unwrap().next_item_id, 3);

        let outcome = pantry.delete_all_items(&identity).await.unwrap();
        assert_eq!(outcome.deleted, 2);
        assert!(pantry.get_items(&identity).await.unwrap().is_empty());
        assert_eq!(pantry.user(&identity).await.unwrap().item_cardinality, 0);
    }

    #[tokio::test]
    async fn failed_snapshot_write_leaves_the_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("pantry.json");
        let store = MemoryStore::open(path, clock()).await.unwrap();
        let identity = Identity {
            user_id: Uuid::new_v4(),
            email: "sam@example.com".into(),
            name: "Sam".into(),
        };
        store
            .state
            .lock()
            .await
            .users
            .insert(identity.user_id, User::new(&identity, clock().now()));

        assert!(matches!(
            store.append_items(identity.user_id, vec![raw("Milk")]).await,
            Err(PortError::Unexpected(_))
        ));
        assert!(store.load_items(identity.user_id).await.unwrap().is_empty());
        let user = store.get_user(identity.user_id).await.unwrap();
        assert_eq!((user.next_item_id, user.item_cardinality), (1, 0));

        assert!(matches!(
            store.sign_up("Kim", "kim@example.com", "pw").await,
            Err(PortError::Unexpected(_))
        ));
        assert!(matches!(
            store.sign_in("kim@example.com", "pw").await,
            Err(PortError::Unauthorized)
        ));
    }
}
