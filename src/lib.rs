//! Core library for the crm-tag-sync command line application.
//!
//! The tool keeps Mailchimp list members in step with the leads of a Follow
//! Up Boss account: every lead email must exist as a member carrying at least
//! the lead's tags. Settings live in [`crm::tags::config`], the platform
//! clients and snapshot store under [`crm::tags::io`], the record types in
//! [`crm::tags::model`], the diffing pass in [`crm::tags::reconcile`], and
//! the end-to-end run in [`crm::tags::sync`].

pub mod crm;

pub use crm::tags::{Result, SyncError, config, error, io, model, reconcile, sync};
