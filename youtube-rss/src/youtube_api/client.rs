//! Authenticated access to the YouTube Data API.

use crate::error::Fatal;
use crate::oauth::OAuthManager;
use crate::youtube_api::subscriptions::{Subscription, SubscriptionListResponse};
use crate::youtube_api::types::{Page, PagedStream};
use eyre::Context;
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio_stream::Stream;
use tracing::instrument;

/// How long before its stated expiry an access token is already treated as expired.
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// An OAuth token together with the moment its access token stops being usable.
#[derive(Debug, Clone)]
pub struct TimeBoundAccessToken {
    token: BasicTokenResponse,
    expires_at: SystemTime,
}

impl TimeBoundAccessToken {
    /// Wraps a token loaded from storage. Its access token is assumed stale,
    /// so the first API call refreshes it.
    pub fn expired(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: SystemTime::UNIX_EPOCH,
            token,
        }
    }

    /// Wraps a token that was just issued.
    pub fn new(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: Self::calculate_token_expiry(&token),
            token,
        }
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    /// Refreshes the access token, keeping the old refresh token if Google
    /// does not send a new one.
    ///
    /// Returns `Ok(false)` if the refresh grant was refused.
    pub async fn refresh(&mut self, oauth_manager: &OAuthManager) -> eyre::Result<bool> {
        tracing::trace!("refreshing token");
        let Some(new_token) = oauth_manager
            .refresh_token(&self.token)
            .await
            .context("refresh OAuth token")?
        else {
            return Ok(false);
        };

        let old_token = std::mem::replace(&mut self.token, new_token);
        if self.token.refresh_token().is_none() {
            tracing::trace!("new token lacks refresh token, preserving original");
            self.token
                .set_refresh_token(old_token.refresh_token().cloned());
        }
        self.expires_at = Self::calculate_token_expiry(&self.token);
        Ok(true)
    }

    /// `expires_in` minus a safety margin, or 55 minutes if Google did not say.
    fn calculate_token_expiry(token: &BasicTokenResponse) -> SystemTime {
        let lifetime = token
            .expires_in()
            .unwrap_or(Duration::from_secs(3600))
            .saturating_sub(EXPIRY_MARGIN);
        SystemTime::now() + lifetime
    }
}

/// Client for the parts of the YouTube Data API v3 that this crate uses.
///
/// Expired access tokens are refreshed transparently before a request. Clones
/// share the token, so a refresh through one clone is seen by all of them.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    token: Arc<Mutex<TimeBoundAccessToken>>,
    oauth_manager: Arc<OAuthManager>,
    client: reqwest::Client,
    /// Base URL of the Data API, without a trailing slash.
    api_url: String,
}

impl YouTubeClient {
    pub fn new(
        token: TimeBoundAccessToken,
        oauth_manager: Arc<OAuthManager>,
        client: reqwest::Client,
        api_url: &str,
    ) -> Self {
        Self {
            token: Arc::new(Mutex::new(token)),
            oauth_manager,
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// The current OAuth token, including any refresh that happened since construction.
    pub async fn token(&self) -> BasicTokenResponse {
        self.token.lock().await.token.clone()
    }

    /// Returns an access token that is good for at least a few more minutes,
    /// refreshing it first if needed.
    ///
    /// A refused refresh is [`Fatal::CredentialsRejected`].
    #[instrument(skip(self), level = tracing::Level::DEBUG)]
    async fn fresh_access_token(&self) -> eyre::Result<String> {
        let mut token = self.token.lock().await;

        if token.is_expired() {
            tracing::debug!("access token expired, attempting refresh");
            if !token.refresh(&self.oauth_manager).await? {
                tracing::error!("access token refresh was refused");
                return Err(Fatal::CredentialsRejected.into());
            }
            tracing::debug!("access token refreshed");
        }

        Ok(token.token.access_token().secret().to_string())
    }

    /// Makes an authenticated `GET` to `<api_url>/<resource>`.
    ///
    /// A 401 after a fresh token means Google no longer honours the
    /// credentials; other non-2xx statuses are plain errors carrying the body.
    #[instrument(skip(self), level = tracing::Level::TRACE)]
    async fn get(
        &self,
        resource: &str,
        query_params: &[(&str, &str)],
    ) -> eyre::Result<reqwest::Response> {
        let access_token = self.fresh_access_token().await?;
        let url = format!("{}/{}", self.api_url, resource);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(query_params)
            .send()
            .await
            .with_context(|| format!("send GET request to YouTube API: {url}"))?;

        let status_code = response.status();
        if status_code == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Fatal::CredentialsRejected.into());
        }
        if !status_code.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            eyre::bail!(
                "YouTube API GET {resource} failed with status {status_code}: {error_text}"
            );
        }

        Ok(response)
    }

    /// Returns a paginated stream of the authenticated user's channel subscriptions.
    ///
    /// Uses `subscriptions.list` with `mine=true`, requesting `page_size`
    /// items (1-50) per call.
    ///
    /// # Required Scopes
    ///
    /// * `https://www.googleapis.com/auth/youtube.readonly`
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/subscriptions/list>
    #[instrument(skip(self))]
    pub fn list_my_subscriptions(
        &self,
        page_size: u32,
    ) -> impl Stream<Item = eyre::Result<Subscription>> + use<'_> {
        PagedStream::new(move |page_token| async move {
            let response = self
                .list_subscriptions_internal(page_size, page_token)
                .await?;
            Ok(Page {
                items: response.items,
                next_page_token: response.next_page_token,
            })
        })
    }

    async fn list_subscriptions_internal(
        &self,
        max_results: u32,
        page_token: Option<String>,
    ) -> eyre::Result<SubscriptionListResponse> {
        let max_results_string = max_results.to_string();
        let mut query_params = vec![
            ("part", "snippet"),
            ("mine", "true"),
            ("maxResults", max_results_string.as_str()),
        ];
        if let Some(ref token) = page_token {
            query_params.push(("pageToken", token.as_str()));
        }

        let subscriptions: SubscriptionListResponse = self
            .get("subscriptions", &query_params)
            .await?
            .json()
            .await
            .context("parse YouTube subscriptions API response as JSON")?;

        tracing::debug!(
            total_results = subscriptions.page_info.total_results,
            returned_items = subscriptions.items.len(),
            "fetched subscriptions"
        );

        Ok(subscriptions)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use oauth2::basic::BasicTokenType;
    use oauth2::{AccessToken, EmptyExtraTokenFields, RefreshToken};
    use serde_json::json;
    use tokio_stream::StreamExt;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn token(access: &str, expires_in: Option<u64>) -> BasicTokenResponse {
        let mut token = BasicTokenResponse::new(
            AccessToken::new(access.into()),
            BasicTokenType::Bearer,
            EmptyExtraTokenFields {},
        );
        token.set_refresh_token(Some(RefreshToken::new("refresh".into())));
        token.set_expires_in(expires_in.map(Duration::from_secs).as_ref());
        token
    }

    pub(crate) fn subscription(channel_id: &str, title: &str) -> serde_json::Value {
        json!({
            "kind": "youtube#subscription",
            "id": format!("sub-{channel_id}"),
            "snippet": {
                "publishedAt": "2024-05-01T09:30:00Z",
                "title": title,
                "resourceId": { "kind": "youtube#channel", "channelId": channel_id },
            }
        })
    }

    pub(crate) fn page(items: &[serde_json::Value], next: Option<&str>) -> ResponseTemplate {
        let mut body = json!({
            "kind": "youtube#subscriptionListResponse",
            "pageInfo": { "totalResults": 3, "resultsPerPage": 2 },
            "items": items,
        });
        if let Some(next) = next {
            body["nextPageToken"] = json!(next);
        }
        ResponseTemplate::new(200).set_body_json(body)
    }

    fn live_token() -> TimeBoundAccessToken {
        TimeBoundAccessToken::new(token("live-token", Some(3600)))
    }

    fn stale_token() -> TimeBoundAccessToken {
        TimeBoundAccessToken::expired(token("stale", None))
    }

    fn client(server: &MockServer, token: TimeBoundAccessToken) -> YouTubeClient {
        YouTubeClient::new(
            token,
            Arc::new(OAuthManager::new(
                "client",
                Some("secret".into()),
                format!("{}/token", server.uri()),
            )),
            reqwest::Client::new(),
            &format!("{}/youtube/v3/", server.uri()),
        )
    }

    #[test]
    fn stored_token_starts_expired() {
        assert!(TimeBoundAccessToken::expired(token("a", Some(3600))).is_expired());
        assert!(!TimeBoundAccessToken::new(token("a", Some(3600))).is_expired());
        // shorter than the margin
        assert!(TimeBoundAccessToken::new(token("a", Some(60))).is_expired());
    }

    #[tokio::test]
    async fn lists_subscriptions_across_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/subscriptions"))
            .and(query_param("pageToken", "p2"))
            .respond_with(page(&[subscription("UC3", "Three")], None))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/subscriptions"))
            .and(query_param("mine", "true"))
            .and(query_param("part", "snippet"))
            .and(query_param("maxResults", "2"))
            .and(header("authorization", "Bearer live-token"))
            .respond_with(page(
                &[subscription("UC1", "One"), subscription("UC2", "Two")],
                Some("p2"),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let yt = client(&server, live_token());
        let titles: Vec<String> = yt
            .list_my_subscriptions(2)
            .map(|s| s.unwrap().snippet.title)
            .collect()
            .await;

        assert_eq!(titles, ["One", "Two", "Three"]);
    }

    #[tokio::test]
    async fn refreshes_expired_token_before_first_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh-token",
                "token_type": "Bearer",
                "expires_in": 3599,
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/subscriptions"))
            .and(header("authorization", "Bearer fresh-token"))
            .respond_with(page(&[], None))
            .expect(1)
            .mount(&server)
            .await;

        let yt = client(&server, stale_token());
        let items: Vec<_> = yt.list_my_subscriptions(50).collect().await;
        assert!(items.is_empty());

        let refreshed = yt.token().await;
        assert_eq!(refreshed.access_token().secret(), "fresh-token");
        assert_eq!(
            refreshed.refresh_token().map(|t| t.secret().as_str()),
            Some("refresh")
        );
    }

    #[tokio::test]
    async fn refused_refresh_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
            )
            .mount(&server)
            .await;

        let yt = client(&server, stale_token());
        let mut stream = std::pin::pin!(yt.list_my_subscriptions(50));
        let err = stream.next().await.unwrap().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Fatal>(),
            Some(Fatal::CredentialsRejected)
        ));
    }

    #[tokio::test]
    async fn api_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
            .mount(&server)
            .await;

        let yt = client(&server, live_token());
        let mut stream = std::pin::pin!(yt.list_my_subscriptions(50));
        let err = stream.next().await.unwrap().unwrap_err();

        let message = err.to_string();
        assert!(message.contains("403"), "{message}");
        assert!(message.contains("quotaExceeded"), "{message}");
        assert!(err.downcast_ref::<Fatal>().is_none());
    }
}
