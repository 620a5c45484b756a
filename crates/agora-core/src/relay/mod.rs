use std::time::Duration;

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use tracing::debug;

use crate::config::CoreConfig;
use crate::error::{FetchError, PublishError};
use crate::models::Profile;

/// The consumed relay capability. The sync loop, identity provider and forum
/// views go through this seam; tests substitute a canned source.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn get_events(&self, filter: Filter) -> Result<Vec<Event>, FetchError>;

    /// Newest kind-0 profile for `pubkey`. `Ok(None)` covers both "no profile
    /// published" and "content failed to parse"; callers fall back to
    /// defaults either way.
    async fn get_user_profile(&self, pubkey: PublicKey) -> Result<Option<Profile>, FetchError>;
}

/// Thin wrapper over the nostr-sdk relay pool. Subscription multiplexing,
/// reconnects and event deduplication across relays stay inside the SDK.
pub struct RelayPool {
    client: Client,
    fetch_timeout: Duration,
    publish_timeout: Duration,
}

impl RelayPool {
    pub async fn connect(config: &CoreConfig) -> Result<Self, FetchError> {
        let client = Client::default();
        for url in &config.relay_urls {
            client
                .add_relay(url)
                .await
                .map_err(|e| FetchError::Relay(format!("{url}: {e}")))?;
        }
        client.connect().await;
        debug!(relays = config.relay_urls.len(), "relay pool connected");
        Ok(Self {
            client,
            fetch_timeout: config.fetch_timeout,
            publish_timeout: config.publish_timeout,
        })
    }

    /// Send a signed event, bounded by the publish timeout so a degraded
    /// relay cannot hang the form.
    pub async fn publish(&self, event: &Event) -> Result<EventId, PublishError> {
        match tokio::time::timeout(self.publish_timeout, self.client.send_event(event)).await {
            Ok(Ok(output)) => Ok(*output.id()),
            Ok(Err(e)) => Err(PublishError::Relay(e.to_string())),
            Err(_) => Err(PublishError::Relay("timed out sending to relays".to_string())),
        }
    }
}

#[async_trait]
impl EventSource for RelayPool {
    async fn get_events(&self, filter: Filter) -> Result<Vec<Event>, FetchError> {
        let events = self
            .client
            .fetch_events(filter, self.fetch_timeout)
            .await
            .map_err(|e| FetchError::Relay(e.to_string()))?;
        Ok(events.into_iter().collect())
    }

    async fn get_user_profile(&self, pubkey: PublicKey) -> Result<Option<Profile>, FetchError> {
        let filter = Filter::new().kind(Kind::Metadata).author(pubkey).limit(1);
        let events = self.get_events(filter).await?;
        Ok(events
            .into_iter()
            .max_by_key(|e| e.created_at)
            .and_then(|e| Profile::from_metadata_json(&e.content)))
    }
}
