//! crates/pantry_core/src/auth.rs
//!
//! The Auth Gateway: the single owner of identity lifecycle. It issues and
//! revokes session tokens through the `IdentityProvider` port and broadcasts
//! identity changes to explicit subscribers.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{Identity, ProviderProfile};
use crate::error::{PantryError, PantryResult};
use crate::ports::{IdentityProvider, PortError};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
    SignedIn(Identity),
    SignedOut { user_id: Uuid },
}

/// A live session issued by the gateway.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub identity: Identity,
    pub expires_at: DateTime<Utc>,
}

/// A subscription to identity changes. Dropping it also unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<IdentityChange>,
}

impl Subscription {
    /// Waits for the next change. Returns `None` once the gateway is gone.
    /// Changes missed because the subscriber fell behind are skipped.
    pub async fn next(&mut self) -> Option<IdentityChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Identity subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

#[derive(Clone)]
pub struct AuthGateway {
    provider: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    session_ttl: Duration,
    changes: broadcast::Sender<IdentityChange>,
}

impl AuthGateway {
    pub fn new(provider: Arc<dyn IdentityProvider>, clock: Arc<dyn Clock>, session_ttl: Duration) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            provider,
            clock,
            session_ttl,
            changes,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub fn on_identity_changed(&self) -> Subscription {
        Subscription {
            receiver: self.changes.subscribe(),
        }
    }

    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> PantryResult<AuthSession> {
        let identity = self.provider.sign_up(name, email, password).await?;
        self.open_session(identity).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> PantryResult<AuthSession> {
        let identity = self
            .provider
            .sign_in(email, password)
            .await
            .map_err(rejected_credentials)?;
        self.open_session(identity).await
    }

    pub async fn sign_in_with_provider(&self, profile: &ProviderProfile) -> PantryResult<AuthSession> {
        let identity = self.provider.sign_in_with_provider(profile).await?;
        self.open_session(identity).await
    }

    /// Resolves a session token. Any failure means the caller is not signed in.
    pub async fn resolve(&self, token: &str) -> PantryResult<Identity> {
        self.provider
            .validate_auth_session(token)
            .await
            .map_err(|e| {
                debug!("Session validation failed: {}", e);
                rejected_credentials(e)
            })
    }

    pub async fn sign_out(&self, token: &str) -> PantryResult<()> {
        let identity = self.resolve(token).await?;
        self.provider.delete_auth_session(token).await?;
        info!(user_id = %identity.user_id, "User signed out");
        self.publish(IdentityChange::SignedOut {
            user_id: identity.user_id,
        });
        Ok(())
    }

    async fn open_session(&self, identity: Identity) -> PantryResult<AuthSession> {
        let token = Uuid::new_v4().to_string();
        let expires_at = self.clock.now() + self.session_ttl;
        self.provider
            .create_auth_session(&token, identity.user_id, expires_at)
            .await?;
        info!(user_id = %identity.user_id, "User signed in");
        self.publish(IdentityChange::SignedIn(identity.clone()));
        Ok(AuthSession {
            token,
            identity,
            expires_at,
        })
    }

    fn publish(&self, change: IdentityChange) {
        // No subscribers is not an error.
        let _ = self.changes.send(change);
    }
}

/// Unknown accounts and bad tokens mean "not signed in"; anything else is a
/// backend failure and keeps its own error.
fn rejected_credentials(e: PortError) -> PantryError {
    match e {
        PortError::Unauthorized | PortError::NotFound(_) => PantryError::NotAuthenticated,
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ports::PortResult;
    use async_trait::async_trait;
    use chrono::TimeZone;

    /// An identity provider whose storage is unreachable.
    struct Offline;

    #[async_trait]
    impl IdentityProvider for Offline {
        async fn sign_up(&self, _: &str, _: &str, _: &str) -> PortResult<Identity> {
            Err(PortError::Unexpected("connection refused".into()))
        }

        async fn sign_in(&self, _: &str, _: &str) -> PortResult<Identity> {
            Err(PortError::Unexpected("connection refused".into()))
        }

        async fn sign_in_with_provider(&self, _: &ProviderProfile) -> PortResult<Identity> {
            Err(PortError::Unexpected("connection refused".into()))
        }

        async fn create_auth_session(&self, _: &str, _: Uuid, _: DateTime<Utc>) -> PortResult<()> {
            Err(PortError::Unexpected("connection refused".into()))
        }

        async fn validate_auth_session(&self, token: &str) -> PortResult<Identity> {
            match token {
                "unknown" => Err(PortError::Unauthorized),
                _ => Err(PortError::Unexpected("connection refused".into())),
            }
        }

        async fn delete_auth_session(&self, _: &str) -> PortResult<()> {
            Err(PortError::Unexpected("connection refused".into()))
        }
    }

    fn gateway() -> AuthGateway {
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap()));
        AuthGateway::new(Arc::new(Offline), clock, Duration::days(30))
    }

    #[tokio::test]
    async fn backend_outages_are_not_reported_as_bad_credentials() {
        let gateway = gateway();
        assert!(matches!(
            gateway.sign_in("sam@example.com", "pw").await,
            Err(PantryError::BackendUnavailable(_))
        ));
        assert!(matches!(
            gateway.resolve("some-token").await,
            Err(PantryError::BackendUnavailable(_))
        ));
        assert!(matches!(
            gateway.sign_out("some-token").await,
            Err(PantryError::BackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn unknown_tokens_are_not_authenticated() {
        assert!(matches!(
            gateway().resolve("unknown").await,
            Err(PantryError::NotAuthenticated)
        ));
    }

    #[test]
    fn only_credential_errors_become_not_authenticated() {
        assert!(matches!(
            rejected_credentials(PortError::Unauthorized),
            PantryError::NotAuthenticated
        ));
        assert!(matches!(
            rejected_credentials(PortError::NotFound("sam@example.com".into())),
            PantryError::NotAuthenticated
        ));
        assert!(matches!(
            rejected_credentials(PortError::Conflict("dup".into())),
            PantryError::InvalidOperation(_)
        ));
    }
}
