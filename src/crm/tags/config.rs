//! Layered settings for a sync run.
//!
//! Values come from an optional TOML settings file, an optional TOML secrets
//! file, and then environment variables named after the upper-cased key.
//! Later layers override earlier ones. A `.env` file can supply environment
//! variables too; real process variables win over its entries. The resulting [`Settings`] is built
//! once at start-up and handed to each component by reference.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::crm::tags::error::{Result, SyncError};

pub const DEFAULT_FOLLOWUPBOSS_LIMIT: usize = 100;
pub const DEFAULT_MAILCHIMP_LIMIT: usize = 1000;
pub const DEFAULT_ERROR_TAG: &str = "Mailchimp API Error";

/// Validated settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub followupboss_api_key: String,
    pub followupboss_api_url: String,
    pub followupboss_limit: usize,
    pub followupboss_exclude_tags: Vec<String>,
    pub mailchimp_api_key: String,
    pub mailchimp_api_url: String,
    pub mailchimp_limit: usize,
    pub mailchimp_error_tag: String,
    pub mailchimp_audience: Option<String>,
    /// Whether a failure while tagging a lead after a sync error stops the run.
    pub abort_on_recovery_failure: bool,
}

impl Settings {
    /// Loads settings from the given files, the `.env` file and the process
    /// environment. Any of the files may be absent.
    pub fn load(settings_path: &Path, secrets_path: &Path, dotenv_path: &Path) -> Result<Self> {
        Self::load_with_env(settings_path, secrets_path, dotenv_path, |key| {
            std::env::var(key).ok()
        })
    }

    /// Like [`Settings::load`], with the process environment replaced by
    /// `env`. Entries of the `.env` file only fill keys `env` does not set.
    pub fn load_with_env<F>(
        settings_path: &Path,
        secrets_path: &Path,
        dotenv_path: &Path,
        env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = read_optional(settings_path)?;
        let secrets = read_optional(secrets_path)?;
        let dotenv = read_dotenv(dotenv_path)?;
        Self::from_layers(&[settings, secrets], |key| {
            env(key).or_else(|| dotenv.get(key).cloned())
        })
    }

    /// Builds settings from already parsed TOML layers plus an environment
    /// lookup function.
    pub fn from_layers<F>(layers: &[Option<RawSettings>], env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut raw = RawSettings::default();
        for layer in layers.iter().flatten() {
            raw.merge(layer.clone());
        }
        raw.merge(RawSettings::from_env(env)?);
        raw.validate()
    }

    /// Tags that keep a lead out of the sync: the configured exclusions plus
    /// the error tag.
    pub fn excluded_tags(&self) -> BTreeSet<String> {
        let mut excluded: BTreeSet<String> =
            self.followupboss_exclude_tags.iter().cloned().collect();
        excluded.insert(self.mailchimp_error_tag.clone());
        excluded
    }
}

/// One unvalidated configuration layer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    pub followupboss_api_key: Option<String>,
    pub followupboss_api_url: Option<String>,
    pub followupboss_limit: Option<usize>,
    pub followupboss_exclude_tags: Option<Vec<String>>,
    pub mailchimp_api_key: Option<String>,
    pub mailchimp_api_url: Option<String>,
    pub mailchimp_limit: Option<usize>,
    pub mailchimp_error_tag: Option<String>,
    pub mailchimp_audience: Option<String>,
    pub abort_on_recovery_failure: Option<bool>,
}

impl RawSettings {
    /// Parses a TOML document into a layer.
    pub fn parse(source: &str, path: &Path) -> Result<Self> {
        toml::from_str(source).map_err(|source| SyncError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_env<F>(env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            followupboss_api_key: env("FOLLOWUPBOSS_API_KEY"),
            followupboss_api_url: env("FOLLOWUPBOSS_API_URL"),
            followupboss_limit: parse_env(&env, "FOLLOWUPBOSS_LIMIT", "followupboss_limit")?,
            followupboss_exclude_tags: env("FOLLOWUPBOSS_EXCLUDE_TAGS")
                .map(|value| split_list(&value)),
            mailchimp_api_key: env("MAILCHIMP_API_KEY"),
            mailchimp_api_url: env("MAILCHIMP_API_URL"),
            mailchimp_limit: parse_env(&env, "MAILCHIMP_LIMIT", "mailchimp_limit")?,
            mailchimp_error_tag: env("MAILCHIMP_ERROR_TAG"),
            mailchimp_audience: env("MAILCHIMP_AUDIENCE"),
            abort_on_recovery_failure: parse_env(
                &env,
                "ABORT_ON_RECOVERY_FAILURE",
                "abort_on_recovery_failure",
            )?,
        })
    }

    /// Overrides every field `other` sets.
    fn merge(&mut self, other: RawSettings) {
        self.followupboss_api_key = other.followupboss_api_key.or(self.followupboss_api_key.take());
        self.followupboss_api_url = other.followupboss_api_url.or(self.followupboss_api_url.take());
        self.followupboss_limit = other.followupboss_limit.or(self.followupboss_limit.take());
        self.followupboss_exclude_tags = other
            .followupboss_exclude_tags
            .or(self.followupboss_exclude_tags.take());
        self.mailchimp_api_key = other.mailchimp_api_key.or(self.mailchimp_api_key.take());
        self.mailchimp_api_url = other.mailchimp_api_url.or(self.mailchimp_api_url.take());
        self.mailchimp_limit = other.mailchimp_limit.or(self.mailchimp_limit.take());
        self.mailchimp_error_tag = other.mailchimp_error_tag.or(self.mailchimp_error_tag.take());
        self.mailchimp_audience = other.mailchimp_audience.or(self.mailchimp_audience.take());
        self.abort_on_recovery_failure = other
            .abort_on_recovery_failure
            .or(self.abort_on_recovery_failure.take());
    }

    fn validate(self) -> Result<Settings> {
        let followupboss_limit = positive(
            "followupboss_limit",
            self.followupboss_limit.unwrap_or(DEFAULT_FOLLOWUPBOSS_LIMIT),
        )?;
        let mailchimp_limit = positive(
            "mailchimp_limit",
            self.mailchimp_limit.unwrap_or(DEFAULT_MAILCHIMP_LIMIT),
        )?;

        Ok(Settings {
            followupboss_api_key: required("followupboss_api_key", self.followupboss_api_key)?,
            followupboss_api_url: required("followupboss_api_url", self.followupboss_api_url)?,
            followupboss_limit,
            followupboss_exclude_tags: self.followupboss_exclude_tags.unwrap_or_default(),
            mailchimp_api_key: required("mailchimp_api_key", self.mailchimp_api_key)?,
            mailchimp_api_url: required("mailchimp_api_url", self.mailchimp_api_url)?,
            mailchimp_limit,
            mailchimp_error_tag: self
                .mailchimp_error_tag
                .unwrap_or_else(|| DEFAULT_ERROR_TAG.to_string()),
            mailchimp_audience: self.mailchimp_audience.filter(|name| !name.is_empty()),
            abort_on_recovery_failure: self.abort_on_recovery_failure.unwrap_or(true),
        })
    }
}

fn read_optional(path: &Path) -> Result<Option<RawSettings>> {
    if !path.exists() {
        debug!(path = %path.display(), "settings layer not present");
        return Ok(None);
    }
    let source = fs::read_to_string(path)?;
    RawSettings::parse(&source, path).map(Some)
}

fn read_dotenv(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        debug!(path = %path.display(), "no .env file");
        return Ok(HashMap::new());
    }
    let dotenv_error = |source: dotenvy::Error| SyncError::Dotenv {
        path: path.to_path_buf(),
        source,
    };
    dotenvy::from_path_iter(path)
        .map_err(dotenv_error)?
        .map(|entry| entry.map_err(dotenv_error))
        .collect()
}

fn required(key: &'static str, value: Option<String>) -> Result<String> {
    value
        .filter(|value| !value.is_empty())
        .ok_or(SyncError::MissingSetting(key))
}

fn positive(key: &'static str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(SyncError::InvalidSetting {
            key,
            reason: "page size must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn parse_env<F, T>(env: &F, var: &str, key: &'static str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env(var)
        .map(|value| {
            value.trim().parse().map_err(|err: T::Err| SyncError::InvalidSetting {
                key,
                reason: err.to_string(),
            })
        })
        .transpose()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
