//! YouTube Subscriptions API types.

use crate::youtube_api::types::PageInfo;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Response structure for the `subscriptions.list` API call.
///
/// See: <https://developers.google.com/youtube/v3/docs/subscriptions/list>
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionListResponse {
    /// Identifies the API resource's type.
    ///
    /// The value will be `youtube#subscriptionListResponse`.
    pub kind: String,
    #[serde(default)]
    pub items: VecDeque<Subscription>,
    #[serde(rename = "pageInfo")]
    pub page_info: PageInfo,
    /// Value for the `pageToken` parameter that retrieves the next page.
    ///
    /// Absent on the last page.
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// A `subscription` resource: one channel the user is subscribed to.
///
/// See: <https://developers.google.com/youtube/v3/docs/subscriptions#resource>
#[derive(Debug, Serialize, Deserialize)]
pub struct Subscription {
    /// The ID YouTube uses for the subscription itself (not the channel).
    pub id: String,
    pub snippet: SubscriptionSnippet,
}

/// The subset of the subscription snippet this crate needs.
///
/// See: <https://developers.google.com/youtube/v3/docs/subscriptions#snippet>
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionSnippet {
    /// The title of the channel subscribed to.
    pub title: String,
    /// When the subscription was created.
    #[serde(rename = "publishedAt", default)]
    pub published_at: Option<Timestamp>,
    /// The channel the subscription points at.
    #[serde(rename = "resourceId")]
    pub resource_id: ResourceId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResourceId {
    /// The value will be `youtube#channel`.
    pub kind: String,
    #[serde(rename = "channelId")]
    pub channel_id: String,
}
