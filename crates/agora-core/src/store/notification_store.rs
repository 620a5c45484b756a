use std::sync::Arc;

use rusqlite::params;

use crate::error::StorageError;
use crate::models::{
    NotificationKind, NotificationPayload, NotificationRecord, NotificationSettings,
};
use crate::store::db::Database;
use crate::store::live::{CountCallback, ListCallback, LiveRegistry, Subscription};

/// The Local Event Cache: exclusive owner of notification records and
/// per-identity notification settings. The sync loop proposes inserts through
/// this contract; presentation reads through it (directly or via the live
/// handles).
#[derive(Clone)]
pub struct NotificationStore {
    db: Database,
    registry: LiveRegistry,
}

impl NotificationStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            registry: LiveRegistry::default(),
        }
    }

    // ===== Reads =====

    /// Cached notifications for `owner`, newest first, bounded by `limit`.
    pub fn get_notifications(
        &self,
        owner: &str,
        limit: usize,
        unread_only: bool,
    ) -> Result<Vec<NotificationRecord>, StorageError> {
        let rows = self.db.with_conn(|conn| {
            let sql = if unread_only {
                "SELECT id, owner, kind, source_event_id, message, payload, created_at, is_read
                 FROM notifications WHERE owner = ?1 AND is_read = 0
                 ORDER BY created_at DESC, id DESC LIMIT ?2"
            } else {
                "SELECT id, owner, kind, source_event_id, message, payload, created_at, is_read
                 FROM notifications WHERE owner = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2"
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params![owner, limit as i64], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, bool>(7)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(id, owner, kind, source_event_id, message, payload, created_at, is_read)| {
                Ok(NotificationRecord {
                    id,
                    owner,
                    kind: NotificationKind::parse(&kind)?,
                    source_event_id,
                    message,
                    payload: serde_json::from_str(&payload)?,
                    created_at: created_at as u64,
                    is_read,
                })
            })
            .collect()
    }

    /// Whether a record with this dedup key already exists.
    pub fn contains(
        &self,
        owner: &str,
        kind: NotificationKind,
        source_event_id: &str,
    ) -> Result<bool, StorageError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM notifications
                 WHERE owner = ?1 AND kind = ?2 AND source_event_id = ?3)",
                params![owner, kind.as_str(), source_event_id],
                |row| row.get(0),
            )
        })
    }

    pub fn unread_count(&self, owner: &str) -> Result<u64, StorageError> {
        let n: i64 = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE owner = ?1 AND is_read = 0",
                [owner],
                |row| row.get(0),
            )
        })?;
        Ok(n as u64)
    }

    // ===== Mutations =====

    /// Insert a record. The `(owner, kind, source_event_id)` uniqueness
    /// constraint makes a conflicting insert a no-op; the return value says
    /// whether a row was actually written. Callers still check-then-insert,
    /// the constraint is the backstop for interleaved ticks or a second
    /// process sharing the database.
    pub fn add_notification(
        &self,
        owner: &str,
        kind: NotificationKind,
        source_event_id: &str,
        message: &str,
        payload: &NotificationPayload,
        created_at: u64,
    ) -> Result<bool, StorageError> {
        let payload_json = serde_json::to_string(payload)?;
        let inserted = self.db.with_conn(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO notifications
                 (owner, kind, source_event_id, message, payload, created_at, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                params![
                    owner,
                    kind.as_str(),
                    source_event_id,
                    message,
                    payload_json,
                    created_at as i64
                ],
            )?;
            Ok(n > 0)
        })?;
        if inserted {
            self.publish_change(owner);
        }
        Ok(inserted)
    }

    pub fn mark_read(&self, owner: &str, id: i64) -> Result<(), StorageError> {
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE owner = ?1 AND id = ?2",
                params![owner, id],
            )
        })?;
        if changed > 0 {
            self.publish_change(owner);
        }
        Ok(())
    }

    pub fn mark_all_read(&self, owner: &str) -> Result<(), StorageError> {
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE owner = ?1 AND is_read = 0",
                [owner],
            )
        })?;
        if changed > 0 {
            self.publish_change(owner);
        }
        Ok(())
    }

    pub fn delete(&self, owner: &str, id: i64) -> Result<(), StorageError> {
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM notifications WHERE owner = ?1 AND id = ?2",
                params![owner, id],
            )
        })?;
        if changed > 0 {
            self.publish_change(owner);
        }
        Ok(())
    }

    pub fn clear(&self, owner: &str) -> Result<(), StorageError> {
        let changed = self
            .db
            .with_conn(|conn| conn.execute("DELETE FROM notifications WHERE owner = ?1", [owner]))?;
        if changed > 0 {
            self.publish_change(owner);
        }
        Ok(())
    }

    // ===== Settings =====

    pub fn get_settings(&self, owner: &str) -> Result<Option<NotificationSettings>, StorageError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT mentions, replies, zaps, follows
                 FROM notification_settings WHERE owner = ?1",
                [owner],
                |row| {
                    Ok(NotificationSettings {
                        mentions: row.get(0)?,
                        replies: row.get(1)?,
                        zaps: row.get(2)?,
                        follows: row.get(3)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })
    }

    /// Settings for `owner`, lazily created with the defaults on first use.
    pub fn settings_or_default(&self, owner: &str) -> Result<NotificationSettings, StorageError> {
        if let Some(settings) = self.get_settings(owner)? {
            return Ok(settings);
        }
        let defaults = NotificationSettings::default();
        self.put_settings(owner, defaults)?;
        Ok(defaults)
    }

    pub fn put_settings(
        &self,
        owner: &str,
        settings: NotificationSettings,
    ) -> Result<(), StorageError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notification_settings (owner, mentions, replies, zaps, follows)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (owner) DO UPDATE SET
                     mentions = excluded.mentions,
                     replies = excluded.replies,
                     zaps = excluded.zaps,
                     follows = excluded.follows",
                params![
                    owner,
                    settings.mentions,
                    settings.replies,
                    settings.zaps,
                    settings.follows
                ],
            )
            .map(|_| ())
        })
    }

    // ===== Live handles =====

    /// Subscribe to `owner`'s notification list. `cb` fires once immediately
    /// with the current snapshot and again after every mutation for `owner`.
    /// The handle is registered before the snapshot is delivered, so a
    /// mutation landing concurrently is delivered (possibly in addition to
    /// the snapshot) rather than lost.
    pub fn live_notifications(
        &self,
        owner: &str,
        limit: usize,
        cb: impl Fn(&[NotificationRecord]) + Send + Sync + 'static,
    ) -> Result<Subscription, StorageError> {
        let cb: ListCallback = Arc::new(cb);
        let sub = self
            .registry
            .register_list(owner.to_string(), limit, cb.clone());
        let snapshot = self.get_notifications(owner, limit, false)?;
        cb(&snapshot);
        Ok(sub)
    }

    /// Subscribe to `owner`'s unread count; same delivery contract as
    /// [`Self::live_notifications`].
    pub fn live_unread_count(
        &self,
        owner: &str,
        cb: impl Fn(u64) + Send + Sync + 'static,
    ) -> Result<Subscription, StorageError> {
        let cb: CountCallback = Arc::new(cb);
        let sub = self.registry.register_count(owner.to_string(), cb.clone());
        cb(self.unread_count(owner)?);
        Ok(sub)
    }

    fn publish_change(&self, owner: &str) {
        let unread = self.unread_count(owner).unwrap_or(0);
        self.registry.notify(
            owner,
            |limit| {
                self.get_notifications(owner, limit, false)
                    .unwrap_or_default()
            },
            unread,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    fn store() -> NotificationStore {
        NotificationStore::new(Database::open_in_memory().unwrap())
    }

    fn add(store: &NotificationStore, owner: &str, kind: NotificationKind, id: &str, ts: u64) -> bool {
        store
            .add_notification(
                owner,
                kind,
                id,
                "msg",
                &NotificationPayload::default(),
                ts,
            )
            .unwrap()
    }

    #[test]
    fn test_distinct_inserts_newest_first() {
        let store = store();
        add(&store, "alice", NotificationKind::Reply, "e1", 100);
        add(&store, "alice", NotificationKind::Mention, "e2", 300);
        add(&store, "alice", NotificationKind::Zap, "e3", 200);

        let records = store.get_notifications("alice", 10, false).unwrap();
        assert_eq!(records.len(), 3);
        let ids: Vec<_> = records.iter().map(|r| r.source_event_id.as_str()).collect();
        assert_eq!(ids, ["e2", "e3", "e1"]);
    }

    #[test]
    fn test_limit_bounds_result() {
        let store = store();
        for i in 0..5 {
            add(&store, "alice", NotificationKind::Reply, &format!("e{i}"), i);
        }
        assert_eq!(store.get_notifications("alice", 2, false).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_triple_is_noop() {
        // The racy interleaving (two ticks both observing "absent") lands on
        // this constraint: the second insert reports false, one row exists.
        let store = store();
        assert!(add(&store, "alice", NotificationKind::Reply, "e1", 100));
        assert!(!add(&store, "alice", NotificationKind::Reply, "e1", 100));
        assert_eq!(store.get_notifications("alice", 10, false).unwrap().len(), 1);

        // Same event id under a different kind or owner is a distinct record
        assert!(add(&store, "alice", NotificationKind::Mention, "e1", 100));
        assert!(add(&store, "bob", NotificationKind::Reply, "e1", 100));
    }

    #[test]
    fn test_mark_all_read_empties_unread_query() {
        let store = store();
        add(&store, "alice", NotificationKind::Reply, "e1", 1);
        add(&store, "alice", NotificationKind::Zap, "e2", 2);
        assert_eq!(store.unread_count("alice").unwrap(), 2);

        store.mark_all_read("alice").unwrap();
        assert!(store.get_notifications("alice", 10, true).unwrap().is_empty());
        assert_eq!(store.unread_count("alice").unwrap(), 0);
        // Records themselves remain
        assert_eq!(store.get_notifications("alice", 10, false).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_decrements_unread_iff_unread() {
        let store = store();
        add(&store, "alice", NotificationKind::Reply, "e1", 1);
        add(&store, "alice", NotificationKind::Reply, "e2", 2);
        let records = store.get_notifications("alice", 10, false).unwrap();
        let read_id = records[0].id;
        let unread_id = records[1].id;

        store.mark_read("alice", read_id).unwrap();
        assert_eq!(store.unread_count("alice").unwrap(), 1);

        // Deleting an already-read record leaves the count alone
        store.delete("alice", read_id).unwrap();
        assert_eq!(store.unread_count("alice").unwrap(), 1);

        store.delete("alice", unread_id).unwrap();
        assert_eq!(store.unread_count("alice").unwrap(), 0);
        assert!(store.get_notifications("alice", 10, false).unwrap().is_empty());
    }

    #[test]
    fn test_clear_is_scoped_by_owner() {
        let store = store();
        add(&store, "alice", NotificationKind::Reply, "e1", 1);
        add(&store, "bob", NotificationKind::Reply, "e2", 1);

        store.clear("alice").unwrap();
        assert!(store.get_notifications("alice", 10, false).unwrap().is_empty());
        assert_eq!(store.get_notifications("bob", 10, false).unwrap().len(), 1);
    }

    #[test]
    fn test_settings_lazy_defaults_persisted() {
        let store = store();
        assert!(store.get_settings("alice").unwrap().is_none());

        let settings = store.settings_or_default("alice").unwrap();
        assert_eq!(settings, NotificationSettings::default());
        // Now persisted
        assert_eq!(store.get_settings("alice").unwrap(), Some(settings));

        let mut updated = settings;
        updated.set("zaps", false);
        store.put_settings("alice", updated).unwrap();
        assert!(!store.settings_or_default("alice").unwrap().zaps);
    }

    #[test]
    fn test_live_notifications_snapshot_then_updates() {
        let store = store();
        add(&store, "alice", NotificationKind::Reply, "e1", 1);

        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let sub = store
            .live_notifications("alice", 10, move |records| {
                seen_cb.lock().unwrap().push(records.len());
            })
            .unwrap();

        // Immediate snapshot
        assert_eq!(*seen.lock().unwrap(), vec![1]);

        add(&store, "alice", NotificationKind::Mention, "e2", 2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);

        // Mutations for other owners do not fire
        add(&store, "bob", NotificationKind::Reply, "e3", 3);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);

        sub.unsubscribe();
        add(&store, "alice", NotificationKind::Zap, "e4", 4);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_callback_may_mutate_store() {
        // Delivery happens outside the registry lock, so marking records read
        // from inside the callback must not deadlock.
        let store = store();
        let inner = store.clone();
        let _sub = store
            .live_notifications("alice", 10, move |records| {
                for r in records {
                    if !r.is_read {
                        inner.mark_read("alice", r.id).unwrap();
                    }
                }
            })
            .unwrap();

        add(&store, "alice", NotificationKind::Reply, "e1", 1);
        assert_eq!(store.unread_count("alice").unwrap(), 0);
    }

    #[test]
    fn test_mutation_during_snapshot_delivery_is_redelivered() {
        // The handle registers before the snapshot fires, so a mutation made
        // while the snapshot is being delivered reaches the subscriber.
        let store = store();
        add(&store, "alice", NotificationKind::Reply, "e1", 1);

        let unread_per_delivery: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let log = unread_per_delivery.clone();
        let inner = store.clone();
        let _sub = store
            .live_notifications("alice", 10, move |records| {
                log.lock()
                    .unwrap()
                    .push(records.iter().filter(|r| !r.is_read).count());
                for r in records {
                    if !r.is_read {
                        inner.mark_read("alice", r.id).unwrap();
                    }
                }
            })
            .unwrap();

        // Snapshot saw one unread record; the mark-read it performed came
        // back as a second delivery
        assert_eq!(*unread_per_delivery.lock().unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_live_unread_count_follows_mutations() {
        let store = store();
        let last = Arc::new(AtomicU64::new(u64::MAX));
        let last_cb = last.clone();
        let _sub = store
            .live_unread_count("alice", move |n| {
                last_cb.store(n, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(last.load(Ordering::SeqCst), 0);

        add(&store, "alice", NotificationKind::Reply, "e1", 1);
        assert_eq!(last.load(Ordering::SeqCst), 1);

        let id = store.get_notifications("alice", 1, false).unwrap()[0].id;
        store.mark_read("alice", id).unwrap();
        assert_eq!(last.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_payload_roundtrip() {
        let store = store();
        let payload = NotificationPayload {
            thread_id: Some("t1".to_string()),
            excerpt: Some("hey".to_string()),
            sender_pubkey: Some("pk".to_string()),
            sender_name: Some("Bob".to_string()),
            amount_sats: Some(21),
        };
        store
            .add_notification("alice", NotificationKind::Zap, "e1", "Bob zapped you 21 sats", &payload, 1)
            .unwrap();
        let records = store.get_notifications("alice", 1, false).unwrap();
        assert_eq!(records[0].payload, payload);
        assert_eq!(records[0].message, "Bob zapped you 21 sats");
    }
}
