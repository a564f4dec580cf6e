//! Mirror a YouTube account's channel subscriptions into a Tiny Tiny RSS category.
//!
//! One call to [`run`] is one reconciliation pass: log in to tt-rss, read the
//! feeds in the YouTube category, read the account's subscriptions, then
//! subscribe and unsubscribe until the category matches. The pass is meant to
//! be scheduled externally; nothing is kept between passes apart from the
//! refreshed OAuth token.

use crate::config::Config;
use crate::credentials::StoredCredentials;
use crate::error::Fatal;
use crate::oauth::{GOOGLE_TOKEN_URL, OAuthManager};
use crate::reconcile::{Summary, reconcile};
use crate::source::YouTubeSubscriptions;
use crate::ttrss::CategoryReader;
use crate::youtube_api::{TimeBoundAccessToken, YouTubeClient};
use eyre::Context;
use oauth2::TokenResponse;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod config;
pub mod credentials;
pub mod error;
pub mod feed;
pub mod oauth;
pub mod reconcile;
pub mod source;
pub mod ttrss;
pub mod youtube_api;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: PathBuf,
    /// Compute and log the changes without applying them.
    pub dry_run: bool,
}

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

fn http_client() -> eyre::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("build HTTP client")
}

/// Runs one reconciliation pass.
///
/// Fatal preconditions (configuration, credentials, login, missing category)
/// surface as a [`Fatal`] inside the returned report, before anything is
/// mutated. The tt-rss session is closed whether or not the pass succeeds.
pub async fn run(options: &RunOptions) -> eyre::Result<Summary> {
    let config = Config::load(&options.config_path).map_err(Fatal::from)?;
    tracing::info!(
        dry_run = options.dry_run,
        "starting YouTube subscription sync"
    );

    let http = http_client()?;
    let mut reader = CategoryReader::connect(http.clone(), &config.ttrss).await?;

    let credentials_path = &config.youtube.credentials_file;
    let credentials = match StoredCredentials::load(credentials_path).await {
        Ok(credentials) => credentials,
        Err(e) => {
            reader.logout().await;
            return Err(e);
        }
    };
    let youtube = YouTubeClient::new(
        TimeBoundAccessToken::expired(credentials.token.clone()),
        Arc::new(credentials.oauth_manager()),
        http,
        &config.youtube.api_url,
    );
    let mut source = YouTubeSubscriptions::new(youtube.clone(), config.youtube.page_size);

    let outcome = reconcile(&mut reader, &mut source, options.dry_run).await;
    reader.logout().await;

    let token = youtube.token().await;
    if token.access_token().secret() != credentials.token.access_token().secret() {
        let refreshed = StoredCredentials {
            token,
            ..credentials
        };
        if let Err(e) = refreshed.save(credentials_path).await {
            tracing::warn!(error = %e, "failed to store refreshed OAuth token");
        }
    }

    let summary = outcome?;
    tracing::info!(
        added = summary.added,
        removed = summary.removed,
        unchanged = summary.unchanged,
        dry_run = summary.dry_run,
        "sync complete"
    );
    Ok(summary)
}

/// Runs the interactive OAuth flow and writes the credentials file named in
/// the configuration at `config_path`. Returns where the file was written.
pub async fn authorize(
    config_path: &Path,
    client_id: &str,
    client_secret: Option<String>,
) -> eyre::Result<PathBuf> {
    let config = Config::load(config_path).map_err(Fatal::from)?;
    let oauth = OAuthManager::new(client_id, client_secret, GOOGLE_TOKEN_URL);

    let token = oauth
        .authenticate()
        .await
        .context("authorize youtube-rss to read YouTube subscriptions")?;

    let path = config.youtube.credentials_file;
    StoredCredentials::new(&oauth, token)
        .save(&path)
        .await
        .context("store OAuth credentials")?;
    tracing::info!(path = %path.display(), "stored OAuth credentials");
    Ok(path)
}
