//! Identity provider: owns the authenticated identity in memory and the raw
//! key material at rest. Constructed once at application boot and passed by
//! reference to whatever needs it; there is no ambient singleton.

pub mod auth;

use std::sync::Arc;

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use parking_lot::RwLock;
use tracing::warn;

use crate::error::{AuthError, PublishError};
use crate::models::Profile;
use crate::relay::EventSource;
use crate::store::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Signing delegated to an external signer (the browser-extension analog)
    External,
    /// Local private key, persisted in the credentials store
    PrivateKey,
}

/// Transient identity snapshot. Never persisted; only its `public_key` feeds
/// the notification cache as the owner key.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    pub public_key: PublicKey,
    /// npub display form
    pub npub: String,
    pub display_name: String,
    pub avatar_url: String,
    /// NIP-05 verified address, if the profile carries one
    pub nip05: Option<String>,
    /// Lightning address for receiving zaps
    pub lud16: Option<String>,
    pub method: AuthMethod,
}

/// Signing delegate supplied by the host when the user authenticates through
/// an external signer rather than an imported key.
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    async fn public_key(&self) -> Result<PublicKey, AuthError>;
    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event, AuthError>;
}

#[derive(Clone)]
pub enum Signer {
    Local(Keys),
    External(Arc<dyn ExternalSigner>),
}

impl Signer {
    pub async fn sign(
        &self,
        builder: EventBuilder,
        public_key: PublicKey,
    ) -> Result<Event, PublishError> {
        match self {
            Signer::Local(keys) => builder
                .sign_with_keys(keys)
                .map_err(|e| PublishError::Signing(e.to_string())),
            Signer::External(signer) => signer
                .sign_event(builder.build(public_key))
                .await
                .map_err(|e| PublishError::Signing(e.to_string())),
        }
    }
}

pub enum AuthState {
    Anonymous,
    Authenticating,
    Authenticated {
        identity: AuthenticatedIdentity,
        signer: Signer,
    },
}

pub struct IdentityProvider {
    db: Database,
    state: RwLock<AuthState>,
}

impl IdentityProvider {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            state: RwLock::new(AuthState::Anonymous),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(&*self.state.read(), AuthState::Authenticated { .. })
    }

    pub fn current(&self) -> Option<AuthenticatedIdentity> {
        match &*self.state.read() {
            AuthState::Authenticated { identity, .. } => Some(identity.clone()),
            _ => None,
        }
    }

    pub fn signer(&self) -> Option<Signer> {
        match &*self.state.read() {
            AuthState::Authenticated { signer, .. } => Some(signer.clone()),
            _ => None,
        }
    }

    /// Import a secret key (bech32 nsec or raw hex). Persists it, encrypted
    /// when a password is given, and resolves the profile.
    pub async fn login_with_nsec(
        &self,
        source: &dyn EventSource,
        nsec: &str,
        password: Option<&str>,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        *self.state.write() = AuthState::Authenticating;
        let keys = match auth::login_with_nsec(nsec, password, &self.db) {
            Ok(keys) => keys,
            Err(e) => {
                *self.state.write() = AuthState::Anonymous;
                return Err(e);
            }
        };
        Ok(self.finish_login(source, keys).await)
    }

    /// Generate a fresh keypair. Returns the identity together with the nsec
    /// so the caller can show it exactly once for backup.
    pub async fn login_with_generated(
        &self,
        source: &dyn EventSource,
        password: Option<&str>,
    ) -> Result<(AuthenticatedIdentity, String), AuthError> {
        *self.state.write() = AuthState::Authenticating;
        let keys = match auth::generate_keys(password, &self.db) {
            Ok(keys) => keys,
            Err(e) => {
                *self.state.write() = AuthState::Anonymous;
                return Err(e);
            }
        };
        let nsec = keys
            .secret_key()
            .to_bech32()
            .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        let identity = self.finish_login(source, keys).await;
        Ok((identity, nsec))
    }

    /// Authenticate through an external signer. Nothing is persisted; the
    /// signer is expected to be available again on the next start.
    pub async fn login_with_external(
        &self,
        source: &dyn EventSource,
        signer: Arc<dyn ExternalSigner>,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        *self.state.write() = AuthState::Authenticating;
        let public_key = match signer.public_key().await {
            Ok(pk) => pk,
            Err(e) => {
                *self.state.write() = AuthState::Anonymous;
                return Err(e);
            }
        };
        let identity = self
            .resolve_identity(source, public_key, AuthMethod::External)
            .await;
        *self.state.write() = AuthState::Authenticated {
            identity: identity.clone(),
            signer: Signer::External(signer),
        };
        Ok(identity)
    }

    /// Silent re-authentication at startup from the persisted key. Absence of
    /// stored credentials leaves the state `Anonymous` without error; an
    /// encrypted entry without (or with a wrong) password surfaces the error
    /// and stays `Anonymous`.
    pub async fn restore_session(
        &self,
        source: &dyn EventSource,
        password: Option<&str>,
    ) -> Result<Option<AuthenticatedIdentity>, AuthError> {
        if !auth::has_stored_credentials(&self.db) {
            return Ok(None);
        }
        *self.state.write() = AuthState::Authenticating;
        match auth::load_stored_keys(password, &self.db) {
            Ok(keys) => Ok(Some(self.finish_login(source, keys).await)),
            Err(e) => {
                *self.state.write() = AuthState::Anonymous;
                Err(e)
            }
        }
    }

    /// Explicit logout: clears persisted key material and returns to
    /// `Anonymous`.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.db.clear_credentials()?;
        *self.state.write() = AuthState::Anonymous;
        Ok(())
    }

    /// Whether `owner` is still the authenticated identity. Key-based
    /// sessions also confirm the credentials row is still present, so a
    /// logout performed by another process over the same database is
    /// observed.
    pub fn session_active(&self, owner: &PublicKey) -> bool {
        match &*self.state.read() {
            AuthState::Authenticated { identity, .. } if identity.public_key == *owner => {
                match identity.method {
                    AuthMethod::External => true,
                    AuthMethod::PrivateKey => self.db.has_stored_credentials(),
                }
            }
            _ => false,
        }
    }

    pub fn credentials_need_password(&self) -> bool {
        auth::credentials_need_password(&self.db)
    }

    pub fn has_stored_credentials(&self) -> bool {
        auth::has_stored_credentials(&self.db)
    }

    async fn finish_login(&self, source: &dyn EventSource, keys: Keys) -> AuthenticatedIdentity {
        let identity = self
            .resolve_identity(source, keys.public_key(), AuthMethod::PrivateKey)
            .await;
        *self.state.write() = AuthState::Authenticated {
            identity: identity.clone(),
            signer: Signer::Local(keys),
        };
        identity
    }

    /// Profile resolution never fails a login: missing or unreachable
    /// profiles fall back to the placeholder avatar and "Anonymous".
    async fn resolve_identity(
        &self,
        source: &dyn EventSource,
        public_key: PublicKey,
        method: AuthMethod,
    ) -> AuthenticatedIdentity {
        let profile = match source.get_user_profile(public_key).await {
            Ok(profile) => profile.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "profile resolution failed, using defaults");
                Profile::default()
            }
        };
        let hex = public_key.to_hex();
        AuthenticatedIdentity {
            public_key,
            npub: public_key.to_bech32().unwrap_or_else(|_| hex.clone()),
            display_name: profile.display_name().to_string(),
            avatar_url: profile.avatar_url(&hex),
            nip05: profile.nip05.clone(),
            lud16: profile.lud16.clone(),
            method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;

    /// Source with no reachable profiles.
    struct NullSource;

    #[async_trait]
    impl EventSource for NullSource {
        async fn get_events(&self, _filter: Filter) -> Result<Vec<Event>, FetchError> {
            Ok(Vec::new())
        }
        async fn get_user_profile(&self, _pk: PublicKey) -> Result<Option<Profile>, FetchError> {
            Ok(None)
        }
    }

    /// Source whose profile fetches always fail.
    struct FailingSource;

    #[async_trait]
    impl EventSource for FailingSource {
        async fn get_events(&self, _filter: Filter) -> Result<Vec<Event>, FetchError> {
            Err(FetchError::Relay("unreachable".to_string()))
        }
        async fn get_user_profile(&self, _pk: PublicKey) -> Result<Option<Profile>, FetchError> {
            Err(FetchError::Relay("unreachable".to_string()))
        }
    }

    struct MockExtension {
        keys: Keys,
    }

    #[async_trait]
    impl ExternalSigner for MockExtension {
        async fn public_key(&self) -> Result<PublicKey, AuthError> {
            Ok(self.keys.public_key())
        }
        async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event, AuthError> {
            unsigned
                .sign_with_keys(&self.keys)
                .map_err(|e| AuthError::SignerUnavailable(e.to_string()))
        }
    }

    fn provider() -> IdentityProvider {
        IdentityProvider::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_login_logout_cycle() {
        let provider = provider();
        assert!(!provider.is_authenticated());

        let keys = Keys::generate();
        let nsec = keys.secret_key().to_bech32().unwrap();
        let identity = provider
            .login_with_nsec(&NullSource, &nsec, None)
            .await
            .unwrap();
        assert!(provider.is_authenticated());
        assert_eq!(identity.public_key, keys.public_key());
        assert_eq!(identity.method, AuthMethod::PrivateKey);
        assert_eq!(identity.display_name, "Anonymous");
        assert!(provider.has_stored_credentials());

        provider.logout().unwrap();
        assert!(!provider.is_authenticated());
        assert!(!provider.has_stored_credentials());
        assert!(provider.current().is_none());
    }

    #[tokio::test]
    async fn test_failed_login_returns_to_anonymous() {
        let provider = provider();
        let err = provider
            .login_with_nsec(&NullSource, "garbage", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidKey(_)));
        assert!(!provider.is_authenticated());
    }

    #[tokio::test]
    async fn test_restore_session_silent_when_no_credentials() {
        let provider = provider();
        let restored = provider.restore_session(&NullSource, None).await.unwrap();
        assert!(restored.is_none());
        assert!(!provider.is_authenticated());
    }

    #[tokio::test]
    async fn test_restore_session_from_stored_key() {
        let db = Database::open_in_memory().unwrap();
        let keys = Keys::generate();
        let nsec = keys.secret_key().to_bech32().unwrap();

        {
            let provider = IdentityProvider::new(db.clone());
            provider
                .login_with_nsec(&NullSource, &nsec, None)
                .await
                .unwrap();
        }

        // New provider over the same database, as on process restart
        let provider = IdentityProvider::new(db);
        let restored = provider
            .restore_session(&NullSource, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restored.public_key, keys.public_key());
        assert!(provider.is_authenticated());
    }

    #[tokio::test]
    async fn test_generated_login_returns_nsec_once() {
        let provider = provider();
        let (identity, nsec) = provider
            .login_with_generated(&NullSource, None)
            .await
            .unwrap();
        assert!(nsec.starts_with("nsec1"));
        let keys = Keys::new(SecretKey::parse(&nsec).unwrap());
        assert_eq!(keys.public_key(), identity.public_key);
    }

    #[tokio::test]
    async fn test_external_login_and_signing() {
        let provider = provider();
        let keys = Keys::generate();
        let signer = Arc::new(MockExtension { keys: keys.clone() });

        let identity = provider
            .login_with_external(&NullSource, signer)
            .await
            .unwrap();
        assert_eq!(identity.method, AuthMethod::External);
        // External logins persist nothing
        assert!(!provider.has_stored_credentials());

        let event = provider
            .signer()
            .unwrap()
            .sign(
                EventBuilder::new(Kind::TextNote, "hi"),
                identity.public_key,
            )
            .await
            .unwrap();
        assert!(event.verify().is_ok());
        assert_eq!(event.pubkey, keys.public_key());
    }

    #[tokio::test]
    async fn test_session_active_tracks_logout_and_stolen_credentials() {
        let db = Database::open_in_memory().unwrap();
        let provider = IdentityProvider::new(db.clone());
        let keys = Keys::generate();
        let nsec = keys.secret_key().to_bech32().unwrap();
        let other = Keys::generate();

        assert!(!provider.session_active(&keys.public_key()));

        provider
            .login_with_nsec(&NullSource, &nsec, None)
            .await
            .unwrap();
        assert!(provider.session_active(&keys.public_key()));
        assert!(!provider.session_active(&other.public_key()));

        // Credentials cleared out of band, as by a logout in another process
        db.clear_credentials().unwrap();
        assert!(!provider.session_active(&keys.public_key()));
    }

    #[tokio::test]
    async fn test_session_active_external_needs_no_credentials() {
        let provider = provider();
        let keys = Keys::generate();
        let signer = Arc::new(MockExtension { keys: keys.clone() });
        provider
            .login_with_external(&NullSource, signer)
            .await
            .unwrap();
        assert!(provider.session_active(&keys.public_key()));

        provider.logout().unwrap();
        assert!(!provider.session_active(&keys.public_key()));
    }

    #[tokio::test]
    async fn test_profile_fetch_failure_degrades_gracefully() {
        let provider = provider();
        let keys = Keys::generate();
        let nsec = keys.secret_key().to_bech32().unwrap();
        let identity = provider
            .login_with_nsec(&FailingSource, &nsec, None)
            .await
            .unwrap();
        assert_eq!(identity.display_name, "Anonymous");
        assert!(identity.avatar_url.contains(&keys.public_key().to_hex()));
        assert!(provider.is_authenticated());
    }
}
