//! Application-wide constants
//!
//! Centralized location for magic strings and configuration values
//! that are used across multiple modules.

/// Default Nostr relays the pool connects to
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
];

/// Fallback display name when a profile has neither display_name nor name
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// Placeholder avatar service, keyed by pubkey so each user gets a stable image
pub const PLACEHOLDER_AVATAR_URL: &str = "https://robohash.org";

/// How often the notification sync loop ticks
pub const POLL_INTERVAL_SECS: u64 = 30;

/// Lower bound of each tick's fetch window ("now minus lookback")
pub const LOOKBACK_SECS: u64 = 5 * 60;

/// Rolling window of the user's own posts scanned for replies
pub const OWN_POSTS_WINDOW: usize = 100;

/// Per-category fetch limit within a tick
pub const FETCH_LIMIT: usize = 50;

/// Relay fetch timeout
pub const FETCH_TIMEOUT_SECS: u64 = 10;

/// Relay publish timeout
pub const PUBLISH_TIMEOUT_SECS: u64 = 5;

/// Boards the forum knows about
pub const BOARDS: &[&str] = &["general", "bitcoin", "nostr", "tech", "meta"];

// Nostr event kinds used by agora
pub mod kinds {
    /// Text note (comment or short-form thread)
    pub const TEXT_NOTE: u16 = 1;
    /// Metadata (profiles)
    pub const METADATA: u16 = 0;
    /// Contact list (follows)
    pub const CONTACT_LIST: u16 = 3;
    /// NIP-22 comment
    pub const COMMENT: u16 = 1111;
    /// Zap receipt
    pub const ZAP_RECEIPT: u16 = 9735;
    /// Long-form content (thread root)
    pub const LONG_FORM: u16 = 30023;
}
