//! Presentation view models over the notification cache: the compact bell
//! summary and per-record display lines. Rendering itself lives in the host
//! (the CLI); these stay string-level so any front end can reuse them.

use crate::error::StorageError;
use crate::models::NotificationRecord;
use crate::store::NotificationStore;

/// Glyph for a notification kind string. Kinds outside the known set render
/// with the default glyph rather than failing.
pub fn glyph(kind: &str) -> &'static str {
    match kind {
        "reply" => "↳",
        "mention" => "@",
        "zap" => "⚡",
        "follow" => "+",
        _ => "•",
    }
}

/// Coarse relative age, newest-friendly: "just now", "5m", "3h", "2d".
pub fn format_age(now: u64, created_at: u64) -> String {
    let secs = now.saturating_sub(created_at);
    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

#[derive(Debug, Clone)]
pub struct NotificationView {
    pub id: i64,
    pub glyph: &'static str,
    pub message: String,
    pub age: String,
    pub is_read: bool,
}

impl NotificationView {
    pub fn from_record(record: &NotificationRecord, now: u64) -> Self {
        Self {
            id: record.id,
            glyph: glyph(record.kind.as_str()),
            message: record.message.clone(),
            age: format_age(now, record.created_at),
            is_read: record.is_read,
        }
    }
}

/// Compact bell-menu view: unread badge plus the most recent records.
#[derive(Debug, Clone)]
pub struct BellSummary {
    pub unread: u64,
    pub items: Vec<NotificationView>,
}

pub fn bell_summary(
    store: &NotificationStore,
    owner: &str,
    limit: usize,
    now: u64,
) -> Result<BellSummary, StorageError> {
    let records = store.get_notifications(owner, limit, false)?;
    Ok(BellSummary {
        unread: store.unread_count(owner)?,
        items: records
            .iter()
            .map(|r| NotificationView::from_record(r, now))
            .collect(),
    })
}
