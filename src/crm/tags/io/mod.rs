pub mod followupboss;
pub mod http;
pub mod mailchimp;
pub mod snapshot;
