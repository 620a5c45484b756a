pub mod config;
pub mod constants;
pub mod error;
pub mod forum;
pub mod identity;
pub mod models;
pub mod relay;
pub mod store;
pub mod sync;
pub mod views;

pub use config::CoreConfig;
pub use error::{AuthError, FetchError, PublishError, StorageError};
pub use identity::{
    AuthMethod, AuthState, AuthenticatedIdentity, ExternalSigner, IdentityProvider, Signer,
};
pub use relay::{EventSource, RelayPool};
pub use store::{Database, NotificationStore, Subscription};
pub use sync::NotificationSync;
