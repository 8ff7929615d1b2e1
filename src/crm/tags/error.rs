use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type covering the different failure cases that can occur while the
/// tool loads its settings, talks to either platform, or persists snapshots.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Wrapper for IO failures such as reading or writing snapshot files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised when a settings file is not valid TOML.
    #[error("settings parse error in {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Raised when a `.env` file cannot be read or has a malformed line.
    #[error("dotenv error in {path}: {source}")]
    Dotenv {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    /// Transport level failures (connection refused, timeout, bad body).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote platform answered with a non-success status code.
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: StatusCode,
        body: String,
    },

    /// A required setting was not provided by any configuration layer.
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),

    /// A setting was provided but its value cannot be used.
    #[error("invalid value for setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    /// The target platform has no audience at all.
    #[error("no audience/list defined yet in Mailchimp")]
    NoAudiences,

    /// The configured audience name matched nothing.
    #[error("cannot find audience/list: {0}")]
    AudienceNotFound(String),

    /// The configured audience name matched more than one audience.
    #[error("ambiguous audience/list name: {0}")]
    AmbiguousAudience(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
