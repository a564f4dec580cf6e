//! The stored OAuth credentials file written by `youtube-rss authorize`.

use crate::error::Fatal;
use crate::oauth::{GOOGLE_TOKEN_URL, OAuthManager};
use eyre::Context;
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything needed to act as the user against the YouTube API without
/// asking them again: the OAuth client and the last token it was issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub token: BasicTokenResponse,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl StoredCredentials {
    pub fn new(oauth: &OAuthManager, token: BasicTokenResponse) -> Self {
        Self {
            client_id: oauth.client_id().to_string(),
            client_secret: oauth.client_secret().map(str::to_string),
            token_uri: oauth.token_url().to_string(),
            token,
        }
    }

    /// Reads the credentials at `path`.
    ///
    /// A missing file is [`Fatal::MissingCredentials`] and a malformed one
    /// [`Fatal::InvalidCredentials`]; both mean `authorize` has to be run.
    pub async fn load(path: &Path) -> eyre::Result<Self> {
        let exists = tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("check for credentials file {}", path.display()))?;
        if !exists {
            return Err(Fatal::MissingCredentials(path.to_path_buf()).into());
        }

        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read credentials file {}", path.display()))?;
        let credentials: Self =
            serde_json::from_str(&json).map_err(|source| Fatal::InvalidCredentials {
                path: path.to_path_buf(),
                source,
            })?;

        if credentials.token.refresh_token().is_none() {
            tracing::warn!(path = %path.display(), "stored credentials have no refresh token");
        }
        Ok(credentials)
    }

    /// Writes the credentials to `path`, replacing the file in one rename.
    ///
    /// On Unix the file is readable by the owner only.
    pub async fn save(&self, path: &Path) -> eyre::Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize credentials")?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create directory {}", dir.display()))?;
        }

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .with_context(|| format!("write {}", temp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .await
                .with_context(|| format!("restrict permissions of {}", temp_path.display()))?;
        }

        tokio::fs::rename(&temp_path, path)
            .await
            .with_context(|| format!("move credentials into place at {}", path.display()))?;
        tracing::debug!(path = %path.display(), "saved OAuth credentials");
        Ok(())
    }

    pub fn oauth_manager(&self) -> OAuthManager {
        OAuthManager::new(
            self.client_id.clone(),
            self.client_secret.clone(),
            self.token_uri.clone(),
        )
    }
}
