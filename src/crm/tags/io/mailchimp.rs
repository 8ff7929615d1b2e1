use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::crm::tags::config::Settings;
use crate::crm::tags::error::{Result, SyncError};
use crate::crm::tags::io::http::{check_status, endpoint};
use crate::crm::tags::model::{Audience, Subscriber, email_fingerprint, normalize_email};

const SERVICE: &str = "Mailchimp";

/// Timeout applied to the listing calls; mutations use the client default.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const LIST_FIELDS: &str = "lists.id,lists.name,total_items";
const MEMBER_FIELDS: &str = "members.email_address,members.status,members.tags,total_items";

/// Read and write access to the email marketing platform.
pub trait SubscriberTarget {
    /// Picks the audience to sync into.
    fn resolve_audience(&self, name: Option<&str>) -> Result<Audience>;

    /// Lists every member of an audience, emails lowercased.
    fn fetch_subscribers(&self, audience_id: &str) -> Result<Vec<Subscriber>>;

    /// Subscribes a new member with an initial tag set.
    fn create_subscriber(&self, audience_id: &str, email: &str, tags: &[String]) -> Result<()>;

    /// Marks the given tags active on an existing member.
    fn add_tags(&self, audience_id: &str, email: &str, tags: &[String]) -> Result<()>;
}

/// Chooses exactly one audience.
///
/// With a name, the match must be exact and unique. Without one, the first
/// audience in response order wins; the listing is requested newest first.
pub fn select_audience(audiences: Vec<Audience>, name: Option<&str>) -> Result<Audience> {
    if audiences.is_empty() {
        return Err(SyncError::NoAudiences);
    }

    let Some(name) = name else {
        if audiences.len() > 1 {
            warn!(
                audience_count = audiences.len(),
                "no audience name configured; using the most recently created one"
            );
        }
        return audiences.into_iter().next().ok_or(SyncError::NoAudiences);
    };

    let mut matching: Vec<Audience> = audiences
        .into_iter()
        .filter(|audience| audience.name == name)
        .collect();
    match matching.len() {
        0 => Err(SyncError::AudienceNotFound(name.to_string())),
        1 => Ok(matching.remove(0)),
        _ => Err(SyncError::AmbiguousAudience(name.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct ListsPage {
    #[serde(default)]
    lists: Vec<Audience>,
    #[serde(default)]
    total_items: Option<usize>,
}

/// One page of `/lists/{id}/members`.
#[derive(Debug, Deserialize)]
pub struct MembersPage {
    #[serde(default)]
    pub members: Vec<Subscriber>,
    #[serde(default)]
    pub total_items: usize,
}

/// Blocking client for the Mailchimp marketing API.
#[derive(Debug, Clone)]
pub struct MailchimpClient {
    http: Client,
    base_url: String,
    api_key: String,
    limit: usize,
}

impl MailchimpClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("crm-tag-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http_client(http, settings))
    }

    /// Create a client around a pre-built `reqwest` client. A zero page size
    /// is raised to one; offset paging would otherwise never advance.
    pub fn with_http_client(http: Client, settings: &Settings) -> Self {
        Self {
            http,
            base_url: settings.mailchimp_api_url.clone(),
            api_key: settings.mailchimp_api_key.clone(),
            limit: settings.mailchimp_limit.max(1),
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(endpoint(&self.base_url, path))
            .bearer_auth(&self.api_key)
            .timeout(FETCH_TIMEOUT)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(endpoint(&self.base_url, path))
            .bearer_auth(&self.api_key)
    }

    /// Lists every audience, newest first.
    #[instrument(level = "debug", skip(self))]
    pub fn list_audiences(&self) -> Result<Vec<Audience>> {
        let mut audiences = Vec::new();
        let mut offset = 0;
        loop {
            let response = self
                .get("lists")
                .query(&[("sort_field", "date_created"), ("sort_dir", "DESC")])
                .query(&[("count", self.limit), ("offset", offset)])
                .query(&[("fields", LIST_FIELDS)])
                .send()?;
            let page: ListsPage = check_status(response, SERVICE)?.json()?;
            let received = page.lists.len();
            audiences.extend(page.lists);

            offset += self.limit;
            // Older payloads omit total_items; a short page is the last one.
            let total = page.total_items.unwrap_or(0);
            if received < self.limit || offset >= total {
                break;
            }
        }
        Ok(audiences)
    }
}

impl SubscriberTarget for MailchimpClient {
    #[instrument(level = "info", skip(self))]
    fn resolve_audience(&self, name: Option<&str>) -> Result<Audience> {
        let audience = select_audience(self.list_audiences()?, name)?;
        info!(audience = %audience.name, id = %audience.id, "target Mailchimp audience");
        Ok(audience)
    }

    #[instrument(level = "info", skip(self), fields(limit = self.limit))]
    fn fetch_subscribers(&self, audience_id: &str) -> Result<Vec<Subscriber>> {
        let mut subscribers = Vec::new();
        let path = format!("lists/{audience_id}/members");
        let mut offset = 0;

        loop {
            let response = self
                .get(&path)
                .query(&[("sort_field", "timestamp_signup"), ("sort_dir", "ASC")])
                .query(&[("count", self.limit), ("offset", offset)])
                .query(&[("fields", MEMBER_FIELDS)])
                .send()?;
            let page: MembersPage = check_status(response, SERVICE)?.json()?;
            debug!(
                offset,
                received = page.members.len(),
                total = page.total_items,
                "fetched page of members"
            );

            subscribers.extend(page.members.into_iter().map(|mut member| {
                member.email_address = normalize_email(&member.email_address);
                member.audience_id = audience_id.to_string();
                member
            }));

            offset += self.limit;
            if offset >= page.total_items {
                break;
            }
        }

        info!(subscriber_count = subscribers.len(), "fetched Mailchimp members");
        Ok(subscribers)
    }

    #[instrument(level = "info", skip(self, tags))]
    fn create_subscriber(&self, audience_id: &str, email: &str, tags: &[String]) -> Result<()> {
        let response = self
            .post(&format!("lists/{audience_id}/members"))
            .json(&json!({
                "email_address": email,
                "status": "subscribed",
                "tags": tags,
            }))
            .send()?;
        let response = check_status(response, SERVICE)?;
        debug!(status = %response.status(), "member created");
        Ok(())
    }

    #[instrument(level = "info", skip(self, tags))]
    fn add_tags(&self, audience_id: &str, email: &str, tags: &[String]) -> Result<()> {
        let fingerprint = email_fingerprint(email);
        let tags: Vec<_> = tags
            .iter()
            .map(|tag| json!({ "name": tag, "status": "active" }))
            .collect();
        let response = self
            .post(&format!("lists/{audience_id}/members/{fingerprint}/tags"))
            .json(&json!({ "tags": tags }))
            .send()?;
        check_status(response, SERVICE)?;
        Ok(())
    }
}
