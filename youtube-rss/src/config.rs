//! Configuration file parser for `conf/youtube-rss.toml`.
//!
//! Unlike most settings files this one is mandatory: without tt-rss
//! credentials and the path to the stored YouTube credentials there is
//! nothing useful to do, so a missing file is an error rather than defaults.
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default YouTube Data API v3 endpoint.
pub const DEFAULT_YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Largest page size `subscriptions.list` accepts.
pub const MAX_PAGE_SIZE: u32 = 50;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file found at {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config file {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Config {
    pub ttrss: TtRssConfig,
    pub youtube: YouTubeConfig,
}

/// Where and as whom to log in to tt-rss.
///
/// `password` is a [`SecretString`] so it never shows up in `Debug` output.
#[derive(Debug, Deserialize)]
pub struct TtRssConfig {
    /// Base URL of the tt-rss installation; the API lives at `<url>/api/`.
    pub url: String,
    pub username: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    /// Title of the category holding the YouTube feeds.
    #[serde(default = "default_category")]
    pub category: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YouTubeConfig {
    /// Stored OAuth credentials, written by `youtube-rss authorize`.
    pub credentials_file: PathBuf,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Subscriptions fetched per request.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_category() -> String {
    "YouTube".to_string()
}

fn default_api_url() -> String {
    DEFAULT_YOUTUBE_API_URL.to_string()
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn deserialize_secret<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

impl Config {
    pub const DEFAULT_PATH: &'static str = "conf/youtube-rss.toml";

    /// Load and validate the configuration at `path`.
    ///
    /// A relative `credentials_file` is resolved against the directory
    /// containing the config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::Missing(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut config: Config = match toml::from_str(&content) {
            Ok(config) => config,
            Err(source) => {
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        config.validate(path)?;

        if config.youtube.credentials_file.is_relative()
            && let Some(dir) = path.parent()
        {
            config.youtube.credentials_file = dir.join(&config.youtube.credentials_file);
        }

        tracing::debug!(
            path = %path.display(),
            ttrss_url = %config.ttrss.url,
            category = %config.ttrss.category,
            "loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if self.ttrss.url.trim().is_empty() {
            return Err(invalid("ttrss.url must not be empty"));
        }
        if self.ttrss.username.trim().is_empty() {
            return Err(invalid("ttrss.username must not be empty"));
        }
        if self.ttrss.category.is_empty() {
            return Err(invalid("ttrss.category must not be empty"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.youtube.page_size) {
            return Err(invalid(&format!(
                "youtube.page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
