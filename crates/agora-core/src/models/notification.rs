use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Closed set of notification categories. Records with a kind outside this
/// set never enter the cache; the presentation layer only needs a default
/// glyph for forward compatibility when rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Reply,
    Mention,
    Zap,
    Follow,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Reply => "reply",
            NotificationKind::Mention => "mention",
            NotificationKind::Zap => "zap",
            NotificationKind::Follow => "follow",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "reply" => Ok(NotificationKind::Reply),
            "mention" => Ok(NotificationKind::Mention),
            "zap" => Ok(NotificationKind::Zap),
            "follow" => Ok(NotificationKind::Follow),
            other => Err(StorageError::UnknownKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific structured data attached to a notification.
/// Stored as JSON; fields absent for a given kind stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_pubkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_sats: Option<u64>,
}

/// A cached notification, owned by the Local Event Cache.
///
/// At most one record exists per `(owner, kind, source_event_id)` triple;
/// the store enforces this with a uniqueness constraint.
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    /// Storage row id, assigned on insert
    pub id: i64,
    /// Hex pubkey of the user this notification belongs to
    pub owner: String,
    pub kind: NotificationKind,
    /// Id of the originating network event; dedup key together with
    /// `owner` and `kind`
    pub source_event_id: String,
    /// Human-readable summary, computed at insert time
    pub message: String,
    pub payload: NotificationPayload,
    /// Timestamp of the originating event, not of insertion
    pub created_at: u64,
    pub is_read: bool,
}
