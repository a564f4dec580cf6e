//! Subscription-source side: the channels the YouTube account subscribes to.

use crate::feed::{FeedRecord, FeedSet, channel_feed_url};
use crate::reconcile::SubscriptionSource;
use crate::youtube_api::YouTubeClient;
use eyre::Context;
use tokio_stream::StreamExt;

/// Turns each YouTube subscription into the RSS feed of its channel.
#[derive(Debug, Clone)]
pub struct YouTubeSubscriptions {
    client: YouTubeClient,
    page_size: u32,
}

impl YouTubeSubscriptions {
    pub fn new(client: YouTubeClient, page_size: u32) -> Self {
        Self { client, page_size }
    }
}

impl SubscriptionSource for YouTubeSubscriptions {
    async fn list_subscriptions(&mut self) -> eyre::Result<FeedSet> {
        let subscriptions = self.client.list_my_subscriptions(self.page_size);
        let mut subscriptions = std::pin::pin!(subscriptions);

        let mut feeds = FeedSet::new();
        while let Some(subscription) = subscriptions.next().await {
            let subscription = subscription.context("fetch YouTube subscription")?;
            let snippet = subscription.snippet;
            let channel_id = snippet.resource_id.channel_id;
            let record = FeedRecord::new(channel_feed_url(&channel_id), snippet.title);
            if !feeds.insert(record) {
                tracing::debug!(
                    %channel_id,
                    subscribed_at = ?snippet.published_at,
                    "channel listed more than once"
                );
            }
        }

        tracing::info!(count = feeds.len(), "fetched YouTube subscriptions");
        Ok(feeds)
    }
}
