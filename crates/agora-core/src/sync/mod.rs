//! Notification sync loop: periodically reconciles the local cache with
//! newly observed network events relevant to the authenticated identity.

pub mod zap;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use nostr_sdk::prelude::*;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::constants::{kinds, DEFAULT_DISPLAY_NAME, FETCH_LIMIT, OWN_POSTS_WINDOW};
use crate::identity::IdentityProvider;
use crate::models::post::excerpt;
use crate::models::{NotificationKind, NotificationPayload, Post};
use crate::relay::EventSource;
use crate::store::NotificationStore;
use zap::{amount_sats_from_bolt11, attribution_from_description, ZapAttribution};

const EXCERPT_LEN: usize = 120;

pub struct NotificationSync<S> {
    source: Arc<S>,
    store: NotificationStore,
    owner: PublicKey,
    lookback: Duration,
}

impl<S: EventSource> NotificationSync<S> {
    pub fn new(
        source: Arc<S>,
        store: NotificationStore,
        owner: PublicKey,
        lookback: Duration,
    ) -> Self {
        Self {
            source,
            store,
            owner,
            lookback,
        }
    }

    /// Tick on a fixed interval until the shutdown channel flips or the
    /// identity goes away; no tick runs for a logged-out owner. Ticks are
    /// serialized by construction: the next tick cannot start while one is in
    /// flight, which (together with the store's uniqueness constraint) closes
    /// the check-then-insert window within a single process.
    pub async fn run(
        self,
        provider: Arc<IdentityProvider>,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !provider.session_active(&self.owner) {
                        debug!("identity gone, notification sync stopped");
                        return;
                    }
                    self.tick().await
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("notification sync stopped");
                        return;
                    }
                }
            }
        }
    }

    /// One reconciliation pass. Never returns an error: each category is
    /// independently fault-isolated, a relay failure in one never suppresses
    /// the others, and the loop continues on schedule regardless.
    pub async fn tick(&self) {
        let owner_hex = self.owner.to_hex();
        let settings = match self.store.settings_or_default(&owner_hex) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "could not load notification settings, skipping tick");
                return;
            }
        };

        let since = Timestamp::from(
            Timestamp::now()
                .as_u64()
                .saturating_sub(self.lookback.as_secs()),
        );

        if settings.replies {
            if let Err(e) = self.sync_replies(&owner_hex, since).await {
                warn!(error = %e, "reply sync failed");
            }
        }
        if settings.mentions {
            if let Err(e) = self.sync_mentions(&owner_hex, since).await {
                warn!(error = %e, "mention sync failed");
            }
        }
        if settings.zaps {
            if let Err(e) = self.sync_zaps(&owner_hex, since).await {
                warn!(error = %e, "zap sync failed");
            }
        }
        if settings.follows {
            if let Err(e) = self.sync_follows(&owner_hex, since).await {
                warn!(error = %e, "follow sync failed");
            }
        }
    }

    /// Replies to the user's own recent posts.
    async fn sync_replies(&self, owner_hex: &str, since: Timestamp) -> Result<()> {
        let own_posts = self
            .source
            .get_events(
                Filter::new()
                    .author(self.owner)
                    .kinds([Kind::from(kinds::TEXT_NOTE), Kind::from(kinds::LONG_FORM)])
                    .since(since)
                    .limit(OWN_POSTS_WINDOW),
            )
            .await?;

        for post_event in &own_posts {
            let post = Post::from_event(post_event);
            let replies = self
                .source
                .get_events(
                    Filter::new()
                        .kinds([Kind::from(kinds::TEXT_NOTE), Kind::from(kinds::COMMENT)])
                        .event(post_event.id)
                        .since(since)
                        .limit(FETCH_LIMIT),
                )
                .await?;

            for reply in replies {
                if reply.pubkey == self.owner {
                    continue;
                }
                let reply_id = reply.id.to_hex();
                if self
                    .store
                    .contains(owner_hex, NotificationKind::Reply, &reply_id)?
                {
                    continue;
                }
                let name = self.resolve_name(reply.pubkey).await;
                let target = if post.is_thread() { "thread" } else { "reply" };
                let message = format!("{name} replied to your {target}");
                let payload = NotificationPayload {
                    thread_id: Some(post.root.clone().unwrap_or_else(|| post.id.clone())),
                    excerpt: Some(excerpt(&reply.content, EXCERPT_LEN)),
                    sender_pubkey: Some(reply.pubkey.to_hex()),
                    sender_name: Some(name),
                    amount_sats: None,
                };
                self.store.add_notification(
                    owner_hex,
                    NotificationKind::Reply,
                    &reply_id,
                    &message,
                    &payload,
                    reply.created_at.as_u64(),
                )?;
            }
        }
        Ok(())
    }

    /// Events p-tagging the user.
    async fn sync_mentions(&self, owner_hex: &str, since: Timestamp) -> Result<()> {
        let mentions = self
            .source
            .get_events(
                Filter::new()
                    .kind(Kind::from(kinds::TEXT_NOTE))
                    .pubkey(self.owner)
                    .since(since)
                    .limit(FETCH_LIMIT),
            )
            .await?;

        for event in mentions {
            if event.pubkey == self.owner {
                continue;
            }
            let event_id = event.id.to_hex();
            if self
                .store
                .contains(owner_hex, NotificationKind::Mention, &event_id)?
            {
                continue;
            }
            let post = Post::from_event(&event);
            let name = self.resolve_name(event.pubkey).await;
            let message = format!("{name} mentioned you");
            let payload = NotificationPayload {
                thread_id: Some(post.root.clone().unwrap_or_else(|| post.id.clone())),
                excerpt: Some(excerpt(&event.content, EXCERPT_LEN)),
                sender_pubkey: Some(event.pubkey.to_hex()),
                sender_name: Some(name),
                amount_sats: None,
            };
            self.store.add_notification(
                owner_hex,
                NotificationKind::Mention,
                &event_id,
                &message,
                &payload,
                event.created_at.as_u64(),
            )?;
        }
        Ok(())
    }

    /// Zap receipts referencing the user. Receipts are authored by the
    /// payment server, so there is no self-authored check here; the sender is
    /// recovered from the embedded zap request when the description decodes.
    async fn sync_zaps(&self, owner_hex: &str, since: Timestamp) -> Result<()> {
        let receipts = self
            .source
            .get_events(
                Filter::new()
                    .kind(Kind::from(kinds::ZAP_RECEIPT))
                    .pubkey(self.owner)
                    .since(since)
                    .limit(FETCH_LIMIT),
            )
            .await?;

        for receipt in receipts {
            let receipt_id = receipt.id.to_hex();
            if self
                .store
                .contains(owner_hex, NotificationKind::Zap, &receipt_id)?
            {
                continue;
            }

            let amount_sats = tag_value(&receipt, "bolt11")
                .map(amount_sats_from_bolt11)
                .unwrap_or(0);

            let attribution = tag_value(&receipt, "description")
                .map(attribution_from_description)
                .unwrap_or(ZapAttribution::Unattributed);

            let (sender_pubkey, sender_name) = match attribution {
                ZapAttribution::Sender { pubkey } => {
                    let name = match PublicKey::parse(&pubkey) {
                        Ok(pk) => Some(self.resolve_name(pk).await),
                        Err(_) => None,
                    };
                    (Some(pubkey), name)
                }
                ZapAttribution::Unattributed => (None, None),
            };

            let message = match &sender_name {
                Some(name) => format!("{name} zapped you {amount_sats} sats"),
                None => format!("Someone zapped you {amount_sats} sats"),
            };
            let payload = NotificationPayload {
                thread_id: tag_value(&receipt, "e").map(str::to_string),
                excerpt: None,
                sender_pubkey,
                sender_name,
                amount_sats: Some(amount_sats),
            };
            self.store.add_notification(
                owner_hex,
                NotificationKind::Zap,
                &receipt_id,
                &message,
                &payload,
                receipt.created_at.as_u64(),
            )?;
        }
        Ok(())
    }

    /// Contact lists that newly p-tag the user. Off by default.
    async fn sync_follows(&self, owner_hex: &str, since: Timestamp) -> Result<()> {
        let lists = self
            .source
            .get_events(
                Filter::new()
                    .kind(Kind::from(kinds::CONTACT_LIST))
                    .pubkey(self.owner)
                    .since(since)
                    .limit(FETCH_LIMIT),
            )
            .await?;

        for event in lists {
            if event.pubkey == self.owner {
                continue;
            }
            let event_id = event.id.to_hex();
            if self
                .store
                .contains(owner_hex, NotificationKind::Follow, &event_id)?
            {
                continue;
            }
            let name = self.resolve_name(event.pubkey).await;
            let message = format!("{name} followed you");
            let payload = NotificationPayload {
                sender_pubkey: Some(event.pubkey.to_hex()),
                sender_name: Some(name),
                ..Default::default()
            };
            self.store.add_notification(
                owner_hex,
                NotificationKind::Follow,
                &event_id,
                &message,
                &payload,
                event.created_at.as_u64(),
            )?;
        }
        Ok(())
    }

    /// Profile lookup with fallback; a failed lookup never blocks the insert.
    async fn resolve_name(&self, pubkey: PublicKey) -> String {
        match self.source.get_user_profile(pubkey).await {
            Ok(Some(profile)) => profile.display_name().to_string(),
            Ok(None) => DEFAULT_DISPLAY_NAME.to_string(),
            Err(e) => {
                debug!(error = %e, pubkey = %pubkey, "profile lookup failed");
                DEFAULT_DISPLAY_NAME.to_string()
            }
        }
    }
}

/// First value of the named tag, if any.
fn tag_value<'a>(event: &'a Event, name: &str) -> Option<&'a str> {
    event.tags.iter().find_map(|tag| {
        let parts = tag.as_slice();
        if parts.first().map(String::as_str) == Some(name) {
            parts.get(1).map(String::as_str)
        } else {
            None
        }
    })
}
