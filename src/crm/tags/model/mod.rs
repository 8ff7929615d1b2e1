use std::collections::BTreeSet;

use md5::{Digest, Md5};
use serde::{Deserialize, Deserializer, Serialize};

/// Lowercases an email address so it can be used as a join key.
pub fn normalize_email(email: &str) -> String {
    email.to_lowercase()
}

/// Hex encoded MD5 digest of the normalized email. Mailchimp addresses list
/// members by this value, which saves a lookup round-trip.
pub fn email_fingerprint(email: &str) -> String {
    let digest = Md5::digest(normalize_email(email).as_bytes());
    hex::encode(digest)
}

/// A person record from Follow Up Boss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Lead identifier. The API sends numbers; it is carried as a string.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Display name; empty when the API sends null or omits it.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Tags in the order the API returned them.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    /// Email entries as sent by the API, unnormalized. May be empty.
    #[serde(default, deserialize_with = "null_as_default")]
    pub emails: Vec<LeadEmail>,
}

impl Lead {
    /// The lead's tags as a set.
    pub fn tag_set(&self) -> BTreeSet<&str> {
        self.tags.iter().map(String::as_str).collect()
    }

    /// Normalized email addresses, in source order.
    pub fn normalized_emails(&self) -> Vec<String> {
        self.emails
            .iter()
            .map(|email| normalize_email(&email.value))
            .collect()
    }

    /// True when any of the lead's tags is in `excluded`.
    pub fn is_excluded_by(&self, excluded: &BTreeSet<String>) -> bool {
        self.tags.iter().any(|tag| excluded.contains(tag))
    }
}

/// One email entry of a lead. Only `value` is used; the remaining fields
/// (type, status, primary flag) are kept so snapshots stay faithful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadEmail {
    /// The address as entered in the tracker.
    pub value: String,
    /// Every other field of the entry, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LeadEmail {
    /// An entry carrying only an address.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Membership status of a Mailchimp list member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    /// Opted in and receiving campaigns.
    Subscribed,
    /// Opted out.
    Unsubscribed,
    /// Removed after hard bounces.
    Cleaned,
    /// Awaiting double opt-in confirmation.
    Pending,
    /// Known only from transactional email.
    Transactional,
    Archived,
    /// Any status this crate does not know about.
    #[serde(other)]
    Unknown,
}

/// A tag attached to a list member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberTag {
    /// Mailchimp's tag id; absent in locally built values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Tag name, compared verbatim against lead tags.
    pub name: String,
}

/// A Mailchimp list member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Lowercased on ingest.
    pub email_address: String,
    /// Membership status; informational, the sync tags members regardless.
    pub status: SubscriberStatus,
    /// Active tags on the member. A null list decodes as empty.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<SubscriberTag>,
    /// Filled in by the client; the members endpoint does not send it.
    #[serde(default)]
    pub audience_id: String,
}

impl Subscriber {
    /// Names of the member's tags as a set, for subset checks.
    pub fn tag_names(&self) -> BTreeSet<&str> {
        self.tags.iter().map(|tag| tag.name.as_str()).collect()
    }
}

/// A Mailchimp audience (list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audience {
    /// List id used in every member endpoint path.
    pub id: String,
    /// Human readable name matched against `mailchimp_audience`.
    pub name: String,
}

/// All members of the active audience, as fetched at the start of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberTable {
    /// Audience the rows were fetched from.
    pub audience_id: String,
    /// Members in fetch order; the first row wins for a repeated email.
    pub subscribers: Vec<Subscriber>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Int(number) => number.to_string(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
