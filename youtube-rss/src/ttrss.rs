//! Feed-reader side: the Tiny Tiny RSS JSON API.
//!
//! Every call is a `POST` of a JSON object to `<base>/api/` naming the
//! operation in `op`, plus the session id once logged in. Responses wrap their
//! payload as `{"seq": .., "status": .., "content": ..}` where a non-zero
//! status means the call failed and `content.error` says why.
//!
//! See: <https://tt-rss.org/ApiReference/>

use crate::config::TtRssConfig;
use crate::error::Fatal;
use crate::feed::{FeedId, FeedRecord, TrackedFeed, TrackedFeeds};
use crate::reconcile::FeedReader;
use eyre::Context;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::instrument;

/// A call that reached tt-rss but that tt-rss refused.
#[derive(Debug, Error)]
#[error("tt-rss {op} failed: {error}")]
pub struct ApiError {
    pub op: &'static str,
    pub error: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: i64,
    #[serde(default)]
    content: Value,
}

/// A tt-rss category as returned by `getCategories`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: i64,
    pub title: String,
}

/// A subscribed feed as returned by `getFeeds`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Feed {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: i64,
    pub title: String,
    pub feed_url: String,
}

#[derive(Debug, Deserialize)]
struct Session {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct SubscribeResult {
    status: SubscribeStatus,
}

#[derive(Debug, Deserialize)]
struct SubscribeStatus {
    code: i64,
    #[serde(default)]
    message: Option<String>,
}

/// tt-rss sends ids as numbers, except where it sends them as strings.
fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(i64),
        Text(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Number(n) => Ok(n),
        Id::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// A logged-in tt-rss API session.
#[derive(Debug)]
pub struct TtRssClient {
    http: reqwest::Client,
    endpoint: String,
    session_id: SecretString,
}

impl TtRssClient {
    /// Logs in to the tt-rss installation at `base_url`.
    ///
    /// A refusal from tt-rss (wrong password, API access disabled for the
    /// user) is reported as [`Fatal::Login`]; transport failures are ordinary
    /// errors.
    #[instrument(skip(http, password))]
    pub async fn login(
        http: reqwest::Client,
        base_url: &str,
        username: &str,
        password: &SecretString,
    ) -> eyre::Result<Self> {
        let endpoint = format!("{}/api/", base_url.trim_end_matches('/'));
        let body = json!({
            "op": "login",
            "user": username,
            "password": password.expose_secret(),
        });

        let session: Session = match call(&http, &endpoint, "login", &body).await? {
            Ok(session) => session,
            Err(e) => {
                return Err(Fatal::Login {
                    username: username.to_string(),
                    reason: e.error,
                }
                .into());
            }
        };

        tracing::debug!("logged in to tt-rss");
        Ok(Self {
            http,
            endpoint,
            session_id: SecretString::from(session.session_id),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        op: &'static str,
        mut params: Value,
    ) -> eyre::Result<T> {
        if let Value::Object(map) = &mut params {
            map.insert("op".into(), op.into());
            map.insert("sid".into(), self.session_id.expose_secret().into());
        }
        Ok(call(&self.http, &self.endpoint, op, &params).await??)
    }

    /// Lists all categories, including empty ones.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> eyre::Result<Vec<Category>> {
        let categories: Vec<Category> = self
            .request("getCategories", json!({ "include_empty": true }))
            .await?;
        tracing::debug!(count = categories.len(), "fetched categories");
        Ok(categories)
    }

    /// Lists the feeds filed directly under the category `category_id`.
    #[instrument(skip(self))]
    pub async fn feeds(&self, category_id: i64) -> eyre::Result<Vec<Feed>> {
        let feeds: Vec<Feed> = self
            .request("getFeeds", json!({ "cat_id": category_id }))
            .await?;
        tracing::debug!(count = feeds.len(), "fetched feeds");
        Ok(feeds)
    }

    /// Subscribes to `feed_url` and files it under `category_id`.
    ///
    /// tt-rss answers with a status code: 0 means the feed was already
    /// subscribed and 1 means it was added. Anything else is a failure.
    #[instrument(skip(self))]
    pub async fn subscribe_to_feed(&self, feed_url: &str, category_id: i64) -> eyre::Result<()> {
        let result: SubscribeResult = self
            .request(
                "subscribeToFeed",
                json!({ "feed_url": feed_url, "category_id": category_id }),
            )
            .await?;

        match result.status.code {
            0 => {
                // only feeds missing from the category get here, so tt-rss
                // has it filed somewhere else
                tracing::warn!(
                    feed_url,
                    category_id,
                    "feed is already subscribed outside this category; move it here by hand"
                );
                Ok(())
            }
            1 => Ok(()),
            code => {
                let reason = match code {
                    2 => "invalid URL",
                    3 => "URL content is not a feed",
                    4 => "URL contains multiple feeds",
                    5 => "could not download URL",
                    _ => "unknown error",
                };
                let reason = result.status.message.as_deref().unwrap_or(reason);
                eyre::bail!("tt-rss could not subscribe to {feed_url} (code {code}): {reason}")
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn unsubscribe_feed(&self, feed_id: i64) -> eyre::Result<()> {
        let _: Value = self
            .request("unsubscribeFeed", json!({ "feed_id": feed_id }))
            .await?;
        Ok(())
    }

    /// Ends the session. Failures are only logged since there is nothing left to undo.
    pub async fn logout(self) {
        match self.request::<Value>("logout", json!({})).await {
            Ok(_) => tracing::debug!("logged out of tt-rss"),
            Err(e) => tracing::warn!(error = %e, "failed to log out of tt-rss"),
        }
    }
}

/// Sends one API call. The outer result is transport and decoding failures,
/// the inner one is tt-rss refusing the call.
async fn call<T: DeserializeOwned>(
    http: &reqwest::Client,
    endpoint: &str,
    op: &'static str,
    body: &Value,
) -> eyre::Result<Result<T, ApiError>> {
    let response = http
        .post(endpoint)
        .json(body)
        .send()
        .await
        .with_context(|| format!("send {op} request to tt-rss at {endpoint}"))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        eyre::bail!("tt-rss {op} request failed with status {status}: {error_text}");
    }

    let envelope: Envelope = response
        .json()
        .await
        .with_context(|| format!("parse tt-rss {op} response as JSON"))?;

    if envelope.status != 0 {
        let error = envelope
            .content
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Ok(Err(ApiError { op, error }));
    }

    let content = serde_json::from_value(envelope.content)
        .with_context(|| format!("parse tt-rss {op} response content"))?;
    Ok(Ok(content))
}

/// The tt-rss category that mirrors the YouTube subscriptions.
#[derive(Debug)]
pub struct CategoryReader {
    client: TtRssClient,
    category: Category,
}

impl CategoryReader {
    /// Logs in and locates the configured category.
    ///
    /// The category is never created here. If it does not exist the session
    /// is closed again and [`Fatal::MissingCategory`] returned.
    pub async fn connect(http: reqwest::Client, config: &TtRssConfig) -> eyre::Result<Self> {
        let client =
            TtRssClient::login(http, &config.url, &config.username, &config.password).await?;

        let categories = match client.categories().await {
            Ok(categories) => categories,
            Err(e) => {
                client.logout().await;
                return Err(e.wrap_err("list tt-rss categories"));
            }
        };

        let Some(category) = categories.into_iter().find(|c| c.title == config.category) else {
            client.logout().await;
            return Err(Fatal::MissingCategory(config.category.clone()).into());
        };

        tracing::info!(
            category = %category.title,
            category_id = category.id,
            "found tt-rss category"
        );
        Ok(Self { client, category })
    }

    pub async fn logout(self) {
        self.client.logout().await;
    }
}

impl FeedReader for CategoryReader {
    async fn list_feeds(&mut self) -> eyre::Result<TrackedFeeds> {
        let feeds = self.client.feeds(self.category.id).await?;

        let mut tracked = TrackedFeeds::new();
        for feed in feeds {
            let url = feed.feed_url.clone();
            if !tracked.insert(TrackedFeed {
                id: FeedId(feed.id),
                record: FeedRecord::new(feed.feed_url, feed.title),
            }) {
                tracing::warn!(feed_url = %url, feed_id = feed.id, "feed listed twice in category");
            }
        }

        tracing::info!(
            count = tracked.len(),
            category = %self.category.title,
            "fetched tt-rss feeds"
        );
        Ok(tracked)
    }

    async fn subscribe(&mut self, feed: &FeedRecord) -> eyre::Result<()> {
        self.client
            .subscribe_to_feed(&feed.url, self.category.id)
            .await
    }

    async fn unsubscribe(&mut self, feed: &TrackedFeed) -> eyre::Result<()> {
        self.client.unsubscribe_feed(feed.id.0).await
    }
}
