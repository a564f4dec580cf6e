//! Conditions that stop a sync before it touches anything.
//!
//! These travel inside an [`eyre::Report`] like every other error, and the
//! binary recovers them with [`exit_code`] to pick the process exit status.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Fatal {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(
        "no OAuth credentials found at {}; run `youtube-rss authorize` first",
        .0.display()
    )]
    MissingCredentials(PathBuf),

    #[error("OAuth credentials at {} are unreadable: {source}", path.display())]
    InvalidCredentials {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "YouTube no longer accepts the stored OAuth credentials; run `youtube-rss authorize` again"
    )]
    CredentialsRejected,

    #[error("logging in to tt-rss as {username} failed: {reason}")]
    Login { username: String, reason: String },

    #[error("no tt-rss category named \"{0}\"; please create it first")]
    MissingCategory(String),
}

impl Fatal {
    pub fn exit_code(&self) -> u8 {
        match self {
            Fatal::Config(_) => 2,
            Fatal::MissingCredentials(_)
            | Fatal::InvalidCredentials { .. }
            | Fatal::CredentialsRejected
            | Fatal::Login { .. } => 3,
            Fatal::MissingCategory(_) => 4,
        }
    }
}

/// Process exit status for a failed run: the [`Fatal`] class if there is one, 1 otherwise.
pub fn exit_code(report: &eyre::Report) -> u8 {
    report.downcast_ref::<Fatal>().map_or(1, Fatal::exit_code)
}
