//! YouTube Data API v3 client.
//!
//! Only what mirroring subscriptions needs is here: an OAuth-authenticated
//! [`YouTubeClient`] and the `subscriptions.list` endpoint, exposed as a
//! [`PagedStream`] that walks every page of results.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_stream::StreamExt;
//! use youtube_rss::credentials::StoredCredentials;
//! use youtube_rss::youtube_api::{TimeBoundAccessToken, YouTubeClient};
//!
//! # async fn example() -> eyre::Result<()> {
//! let credentials = StoredCredentials::load("conf/youtube-credentials.json".as_ref()).await?;
//! let client = YouTubeClient::new(
//!     TimeBoundAccessToken::expired(credentials.token.clone()),
//!     Arc::new(credentials.oauth_manager()),
//!     reqwest::Client::new(),
//!     youtube_rss::config::DEFAULT_YOUTUBE_API_URL,
//! );
//!
//! let mut subscriptions = std::pin::pin!(client.list_my_subscriptions(50));
//! while let Some(subscription) = subscriptions.next().await {
//!     let snippet = subscription?.snippet;
//!     println!("{} ({})", snippet.title, snippet.resource_id.channel_id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod subscriptions;
pub mod types;

pub use client::{TimeBoundAccessToken, YouTubeClient};
pub use subscriptions::{ResourceId, Subscription, SubscriptionSnippet};
pub use types::{Page, PageInfo, PagedStream};
