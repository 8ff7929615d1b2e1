use std::collections::BTreeSet;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::crm::tags::config::Settings;
use crate::crm::tags::error::Result;
use crate::crm::tags::io::http::{check_status, endpoint, resolve_link};
use crate::crm::tags::model::Lead;

const SERVICE: &str = "Follow Up Boss";
const LEAD_FIELDS: &str = "id,name,tags,emails";

/// Read and write access to the lead tracker.
pub trait LeadSource {
    /// Fetches every lead that is not excluded by tag.
    fn fetch_leads(&self) -> Result<Vec<Lead>>;

    /// Replaces the tag set of a lead.
    fn set_tags(&self, lead_id: &str, tags: &[String]) -> Result<()>;
}

/// One page of the `/people` listing.
#[derive(Debug, Deserialize)]
pub struct PeoplePage {
    #[serde(default)]
    pub people: Vec<Lead>,
    #[serde(default, rename = "_metadata")]
    pub metadata: Option<PageMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    #[serde(default)]
    pub next_link: Option<String>,
}

impl PeoplePage {
    pub fn next_link(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.next_link.as_deref())
            .filter(|link| !link.is_empty())
    }
}

/// Blocking client for the Follow Up Boss REST API.
#[derive(Debug, Clone)]
pub struct FollowUpBossClient {
    http: Client,
    base_url: String,
    api_key: String,
    limit: usize,
    excluded: BTreeSet<String>,
}

impl FollowUpBossClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("crm-tag-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http_client(http, settings))
    }

    /// Create a client around a pre-built `reqwest` client. A zero page size
    /// is raised to one.
    pub fn with_http_client(http: Client, settings: &Settings) -> Self {
        Self {
            http,
            base_url: settings.followupboss_api_url.clone(),
            api_key: settings.followupboss_api_key.clone(),
            limit: settings.followupboss_limit.max(1),
            excluded: settings.excluded_tags(),
        }
    }
}

impl LeadSource for FollowUpBossClient {
    #[instrument(level = "info", skip_all, fields(limit = self.limit))]
    fn fetch_leads(&self) -> Result<Vec<Lead>> {
        let mut leads = Vec::new();
        let limit = self.limit.to_string();

        let mut request = self
            .http
            .get(endpoint(&self.base_url, "people"))
            .query(&[
                ("sort", "created"),
                ("limit", limit.as_str()),
                ("offset", "0"),
                ("fields", LEAD_FIELDS),
            ]);

        loop {
            let response = request.basic_auth(&self.api_key, Some("")).send()?;
            let page: PeoplePage = check_status(response, SERVICE)?.json()?;

            let received = page.people.len();
            let next_link = page.next_link().map(str::to_string);
            leads.extend(
                page.people
                    .into_iter()
                    .filter(|lead| !lead.is_excluded_by(&self.excluded)),
            );
            debug!(received, kept = leads.len(), "fetched page of leads");

            match next_link {
                Some(link) => {
                    request = self.http.get(resolve_link(&self.base_url, &link));
                }
                None => break,
            }
        }

        info!(lead_count = leads.len(), "fetched leads");
        Ok(leads)
    }

    #[instrument(level = "info", skip(self, tags), fields(tag_count = tags.len()))]
    fn set_tags(&self, lead_id: &str, tags: &[String]) -> Result<()> {
        let response = self
            .http
            .put(endpoint(&self.base_url, &format!("people/{lead_id}")))
            .basic_auth(&self.api_key, Some(""))
            .json(&json!({ "tags": tags }))
            .send()?;
        check_status(response, SERVICE)?;
        Ok(())
    }
}
