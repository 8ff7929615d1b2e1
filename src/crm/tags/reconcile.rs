//! The reconciliation pass.
//!
//! Every email of every lead is joined against the subscriber table and the
//! smallest corrective call is issued: create a member, add tags, or nothing.
//! Per-email failures are counted and flagged on the lead; they never stop the
//! pass. Neither input table is modified.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, error, info, instrument, warn};

use crate::crm::tags::error::Result;
use crate::crm::tags::io::followupboss::LeadSource;
use crate::crm::tags::io::mailchimp::SubscriberTarget;
use crate::crm::tags::model::{Lead, Subscriber, SubscriberTable, normalize_email};

/// What happens when tagging a lead with the error tag fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Propagate the error and stop the run.
    Abort,
    /// Log the error and keep going.
    LogAndContinue,
}

impl RecoveryPolicy {
    pub fn from_abort_flag(abort: bool) -> Self {
        if abort {
            RecoveryPolicy::Abort
        } else {
            RecoveryPolicy::LogAndContinue
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub already_ok: usize,
    pub updated_members: usize,
    pub new_members: usize,
    pub failures: usize,
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Already ok: {}", self.already_ok)?;
        writeln!(f, "Updated members: {}", self.updated_members)?;
        writeln!(f, "New members: {}", self.new_members)?;
        write!(f, "Failures: {}", self.failures)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    AlreadyOk,
    Updated,
    Created,
}

pub struct Reconciler<'a, S, T> {
    source: &'a S,
    target: &'a T,
    error_tag: String,
    recovery: RecoveryPolicy,
}

impl<'a, S, T> Reconciler<'a, S, T>
where
    S: LeadSource,
    T: SubscriberTarget,
{
    pub fn new(source: &'a S, target: &'a T, error_tag: impl Into<String>) -> Self {
        Self {
            source,
            target,
            error_tag: error_tag.into(),
            recovery: RecoveryPolicy::Abort,
        }
    }

    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    /// Runs one pass over `leads` against `table`.
    ///
    /// Only a failure of the error-tagging call under
    /// [`RecoveryPolicy::Abort`] returns `Err`.
    #[instrument(
        level = "info",
        skip_all,
        fields(lead_count = leads.len(), audience_id = %table.audience_id)
    )]
    pub fn run(&self, leads: &[Lead], table: &SubscriberTable) -> Result<SyncSummary> {
        let index = index_by_email(&table.subscribers);
        let mut summary = SyncSummary::default();

        for lead in leads {
            if lead.emails.is_empty() {
                debug!(lead_id = %lead.id, "lead has no email, skipping");
                continue;
            }

            for email in lead.normalized_emails() {
                let existing = index.get(email.as_str()).copied();
                match self.reconcile_email(lead, &email, existing, &table.audience_id) {
                    Ok(Outcome::AlreadyOk) => summary.already_ok += 1,
                    Ok(Outcome::Updated) => summary.updated_members += 1,
                    Ok(Outcome::Created) => summary.new_members += 1,
                    Err(err) => {
                        summary.failures += 1;
                        warn!(lead_id = %lead.id, %email, error = %err, "sync failed");
                        self.flag_lead(lead)?;
                    }
                }
            }
        }

        info!(
            already_ok = summary.already_ok,
            updated = summary.updated_members,
            created = summary.new_members,
            failures = summary.failures,
            "reconciliation finished"
        );
        Ok(summary)
    }

    fn reconcile_email(
        &self,
        lead: &Lead,
        email: &str,
        existing: Option<&Subscriber>,
        audience_id: &str,
    ) -> Result<Outcome> {
        let Some(subscriber) = existing else {
            self.target.create_subscriber(audience_id, email, &lead.tags)?;
            info!(lead_id = %lead.id, email, "created member");
            return Ok(Outcome::Created);
        };

        let present = subscriber.tag_names();
        let missing: Vec<&str> = lead
            .tag_set()
            .into_iter()
            .filter(|tag| !present.contains(tag))
            .collect();
        if missing.is_empty() {
            return Ok(Outcome::AlreadyOk);
        }

        let member_audience = if subscriber.audience_id.is_empty() {
            audience_id
        } else {
            subscriber.audience_id.as_str()
        };
        // Sends the full lead tag set, not only the missing ones.
        self.target.add_tags(member_audience, email, &lead.tags)?;
        info!(lead_id = %lead.id, email, ?missing, "added tags to member");
        Ok(Outcome::Updated)
    }

    fn flag_lead(&self, lead: &Lead) -> Result<()> {
        let mut tags = lead.tags.clone();
        tags.push(self.error_tag.clone());

        match (self.source.set_tags(&lead.id, &tags), self.recovery) {
            (Ok(()), _) => Ok(()),
            (Err(err), RecoveryPolicy::Abort) => Err(err),
            (Err(err), RecoveryPolicy::LogAndContinue) => {
                error!(lead_id = %lead.id, error = %err, "could not flag lead with error tag");
                Ok(())
            }
        }
    }
}

fn index_by_email(subscribers: &[Subscriber]) -> HashMap<String, &Subscriber> {
    let mut index = HashMap::with_capacity(subscribers.len());
    for subscriber in subscribers {
        index
            .entry(normalize_email(&subscriber.email_address))
            .or_insert(subscriber);
    }
    index
}
