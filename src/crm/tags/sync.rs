use std::path::PathBuf;

use tracing::{info, instrument};

use crate::crm::tags::config::Settings;
use crate::crm::tags::error::Result;
use crate::crm::tags::io::followupboss::{FollowUpBossClient, LeadSource};
use crate::crm::tags::io::mailchimp::{MailchimpClient, SubscriberTarget};
use crate::crm::tags::io::snapshot::{
    JsonSnapshot, LEADS_SNAPSHOT, SUBSCRIBERS_SNAPSHOT, SnapshotStore, load_or_fetch,
};
use crate::crm::tags::model::{Lead, SubscriberTable};
use crate::crm::tags::reconcile::{Reconciler, RecoveryPolicy, SyncSummary};

/// Where snapshots live and whether they survive a successful run.
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub dir: PathBuf,
    pub keep: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            keep: false,
        }
    }
}

/// Runs a full sync against the live platforms described by `settings`.
#[instrument(level = "info", skip_all, fields(snapshot_dir = %snapshots.dir.display()))]
pub fn run(settings: &Settings, snapshots: &SnapshotOptions) -> Result<SyncSummary> {
    let source = FollowUpBossClient::new(settings)?;
    let target = MailchimpClient::new(settings)?;
    let leads = JsonSnapshot::in_dir(&snapshots.dir, LEADS_SNAPSHOT);
    let members = JsonSnapshot::in_dir(&snapshots.dir, SUBSCRIBERS_SNAPSHOT);

    let summary = run_with(settings, &source, &target, &leads, &members)?;

    if !snapshots.keep {
        leads.clear()?;
        members.clear()?;
    }
    Ok(summary)
}

/// Loads or fetches both tables and reconciles them.
///
/// Snapshots are not cleared here; that is left to the caller once the run
/// counts as successful.
pub fn run_with<S, T, L, M>(
    settings: &Settings,
    source: &S,
    target: &T,
    lead_store: &L,
    member_store: &M,
) -> Result<SyncSummary>
where
    S: LeadSource,
    T: SubscriberTarget,
    L: SnapshotStore<Vec<Lead>>,
    M: SnapshotStore<SubscriberTable>,
{
    let leads = load_or_fetch(lead_store, || source.fetch_leads())?;
    info!(lead_count = leads.len(), "leads ready");

    let table = load_or_fetch(member_store, || {
        let audience = target.resolve_audience(settings.mailchimp_audience.as_deref())?;
        let subscribers = target.fetch_subscribers(&audience.id)?;
        Ok(SubscriberTable {
            audience_id: audience.id,
            subscribers,
        })
    })?;
    info!(
        subscriber_count = table.subscribers.len(),
        audience_id = %table.audience_id,
        "members ready"
    );

    Reconciler::new(source, target, settings.mailchimp_error_tag.clone())
        .with_recovery(RecoveryPolicy::from_abort_flag(
            settings.abort_on_recovery_failure,
        ))
        .run(&leads, &table)
}
