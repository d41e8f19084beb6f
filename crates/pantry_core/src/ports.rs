//! crates/pantry_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the pantry's external collaborators.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the document store, identity provider and OCR service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Identity, ItemId, ProviderProfile, RawItem, ScannedReceipt, ShelfLife, User,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The per-user document store: a `users/{userId}` record holding the counters
/// and a `users/{userId}/pantry` document holding the item list.
///
/// Every mutating call returns the full item list as stored afterwards.
#[async_trait]
pub trait PantryBackend: Send + Sync {
    /// Creates the user record if it does not exist yet and returns it.
    async fn ensure_user(&self, identity: &Identity) -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    /// Returns the stored item list; empty if the user has no pantry document.
    async fn load_items(&self, user_id: Uuid) -> PortResult<Vec<RawItem>>;

    /// Appends `items`, assigning ids from `next_item_id` and bumping
    /// `item_cardinality` by `items.len()`, as one atomic step.
    async fn append_items(&self, user_id: Uuid, items: Vec<RawItem>) -> PortResult<Vec<RawItem>>;

    /// Replaces the stored item whose id matches `item.id`.
    async fn replace_item(&self, user_id: Uuid, item: RawItem) -> PortResult<Vec<RawItem>>;

    /// Removes one item by id; `item_cardinality` is decremented, floored at 0.
    async fn remove_item(&self, user_id: Uuid, item_id: ItemId) -> PortResult<Vec<RawItem>>;

    /// Clears the pantry in one step and resets `item_cardinality` to 0,
    /// returning how many items were removed.
    ///
    /// Backends without a bulk primitive keep the default, and callers fall
    /// back to removing items one at a time.
    async fn clear_items(&self, _user_id: Uuid) -> PortResult<usize> {
        Err(PortError::Unsupported("clear_items"))
    }
}

/// Account and auth-session storage behind the Auth Gateway.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, name: &str, email: &str, password: &str) -> PortResult<Identity>;

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<Identity>;

    /// Signs in with a profile asserted by an external provider, creating the
    /// account on first use.
    async fn sign_in_with_provider(&self, profile: &ProviderProfile) -> PortResult<Identity>;

    async fn create_auth_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Resolves a live session token to its identity.
    async fn validate_auth_session(&self, token: &str) -> PortResult<Identity>;

    async fn delete_auth_session(&self, token: &str) -> PortResult<()>;
}

#[async_trait]
pub trait ReceiptScanner: Send + Sync {
    /// Extracts the store, date and line items from a receipt image.
    async fn process_receipt(&self, image: &[u8]) -> PortResult<ScannedReceipt>;
}

#[async_trait]
pub trait ShelfLifeLookup: Send + Sync {
    /// Estimates category, perishability and shelf life for a product name.
    async fn estimate(&self, name: &str) -> PortResult<ShelfLife>;
}
