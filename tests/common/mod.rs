#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeSet;

use crm_tag_sync::config::Settings;
use crm_tag_sync::io::followupboss::LeadSource;
use crm_tag_sync::io::mailchimp::{SubscriberTarget, select_audience};
use crm_tag_sync::io::snapshot::SnapshotStore;
use crm_tag_sync::model::{
    Audience, Lead, LeadEmail, Subscriber, SubscriberStatus, SubscriberTag, normalize_email,
};
use crm_tag_sync::{Result, SyncError};
use reqwest::StatusCode;
use tokio::runtime::{Builder, Runtime};
use wiremock::{Mock, MockServer, Request};

pub fn settings(followupboss_url: &str, mailchimp_url: &str) -> Settings {
    Settings {
        followupboss_api_key: "fub-key".to_string(),
        followupboss_api_url: followupboss_url.to_string(),
        followupboss_limit: 100,
        followupboss_exclude_tags: vec!["Do Not Email".to_string()],
        mailchimp_api_key: "mc-key".to_string(),
        mailchimp_api_url: mailchimp_url.to_string(),
        mailchimp_limit: 1000,
        mailchimp_error_tag: "Mailchimp API Error".to_string(),
        mailchimp_audience: None,
        abort_on_recovery_failure: true,
    }
}

pub fn lead(id: &str, tags: &[&str], emails: &[&str]) -> Lead {
    Lead {
        id: id.to_string(),
        name: format!("Lead {id}"),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        emails: emails.iter().map(|email| LeadEmail::new(*email)).collect(),
    }
}

pub fn subscriber(audience_id: &str, email: &str, tags: &[&str]) -> Subscriber {
    Subscriber {
        email_address: email.to_string(),
        status: SubscriberStatus::Subscribed,
        tags: tags
            .iter()
            .map(|name| SubscriberTag {
                id: None,
                name: name.to_string(),
            })
            .collect(),
        audience_id: audience_id.to_string(),
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

/// A wiremock server driven from synchronous tests.
///
/// The clients under test are blocking, so the server lives on a runtime
/// owned by the test and the clients are called from the test thread.
pub struct MockApi {
    server: MockServer,
    runtime: Runtime,
}

impl MockApi {
    pub fn start() -> Self {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("tokio runtime");
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    pub fn received(&self) -> Vec<Request> {
        self.runtime
            .block_on(self.server.received_requests())
            .expect("request recording enabled")
    }
}

/// Value of a decoded query parameter of a received request.
pub fn query_value(request: &Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// In-memory lead source recording tag rewrites.
#[derive(Default)]
pub struct FakeSource {
    pub leads: Vec<Lead>,
    pub fail_set_tags: bool,
    pub fetch_calls: RefCell<usize>,
    pub set_tags_calls: RefCell<Vec<(String, Vec<String>)>>,
}

impl LeadSource for FakeSource {
    fn fetch_leads(&self) -> Result<Vec<Lead>> {
        *self.fetch_calls.borrow_mut() += 1;
        Ok(self.leads.clone())
    }

    fn set_tags(&self, lead_id: &str, tags: &[String]) -> Result<()> {
        self.set_tags_calls
            .borrow_mut()
            .push((lead_id.to_string(), tags.to_vec()));
        if self.fail_set_tags {
            return Err(SyncError::Status {
                service: "Follow Up Boss",
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: String::new(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetCall {
    Create {
        audience_id: String,
        email: String,
        tags: Vec<String>,
    },
    AddTags {
        audience_id: String,
        email: String,
        tags: Vec<String>,
    },
}

/// In-memory target whose writes are applied to its own member list, so a
/// second fetch sees the first run's effect.
#[derive(Default)]
pub struct FakeTarget {
    pub audiences: Vec<Audience>,
    pub members: RefCell<Vec<Subscriber>>,
    pub failing_emails: BTreeSet<String>,
    pub calls: RefCell<Vec<TargetCall>>,
    pub fetch_calls: RefCell<usize>,
}

impl FakeTarget {
    pub fn mutations(&self) -> Vec<TargetCall> {
        self.calls.borrow().clone()
    }

    fn fail_for(&self, email: &str) -> Result<()> {
        if self.failing_emails.contains(email) {
            return Err(SyncError::Status {
                service: "Mailchimp",
                status: StatusCode::BAD_REQUEST,
                body: format!("{email} looks fake or invalid"),
            });
        }
        Ok(())
    }
}

impl SubscriberTarget for FakeTarget {
    fn resolve_audience(&self, name: Option<&str>) -> Result<Audience> {
        select_audience(self.audiences.clone(), name)
    }

    fn fetch_subscribers(&self, audience_id: &str) -> Result<Vec<Subscriber>> {
        *self.fetch_calls.borrow_mut() += 1;
        Ok(self
            .members
            .borrow()
            .iter()
            .filter(|member| member.audience_id == audience_id)
            .cloned()
            .collect())
    }

    fn create_subscriber(&self, audience_id: &str, email: &str, tags: &[String]) -> Result<()> {
        self.calls.borrow_mut().push(TargetCall::Create {
            audience_id: audience_id.to_string(),
            email: email.to_string(),
            tags: tags.to_vec(),
        });
        self.fail_for(email)?;
        let names: Vec<&str> = tags.iter().map(String::as_str).collect();
        self.members
            .borrow_mut()
            .push(subscriber(audience_id, &normalize_email(email), &names));
        Ok(())
    }

    fn add_tags(&self, audience_id: &str, email: &str, tags: &[String]) -> Result<()> {
        self.calls.borrow_mut().push(TargetCall::AddTags {
            audience_id: audience_id.to_string(),
            email: email.to_string(),
            tags: tags.to_vec(),
        });
        self.fail_for(email)?;
        let mut members = self.members.borrow_mut();
        if let Some(member) = members
            .iter_mut()
            .find(|member| member.audience_id == audience_id && member.email_address == email)
        {
            for tag in tags {
                if !member.tags.iter().any(|existing| &existing.name == tag) {
                    member.tags.push(SubscriberTag {
                        id: None,
                        name: tag.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Snapshot store kept in memory.
pub struct MemorySnapshot<T> {
    pub table: RefCell<Option<T>>,
    pub saves: RefCell<usize>,
}

impl<T> MemorySnapshot<T> {
    pub fn empty() -> Self {
        Self {
            table: RefCell::new(None),
            saves: RefCell::new(0),
        }
    }

    pub fn holding(table: T) -> Self {
        Self {
            table: RefCell::new(Some(table)),
            saves: RefCell::new(0),
        }
    }
}

impl<T: Clone> SnapshotStore<T> for MemorySnapshot<T> {
    fn load(&self) -> Result<Option<T>> {
        Ok(self.table.borrow().clone())
    }

    fn save(&self, table: &T) -> Result<()> {
        *self.saves.borrow_mut() += 1;
        *self.table.borrow_mut() = Some(table.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.table.borrow_mut() = None;
        Ok(())
    }
}
