use reqwest::blocking::Response;

use crate::crm::tags::error::{Result, SyncError};

/// Turns a non-success response into [`SyncError::Status`], keeping the body
/// for the log line.
pub fn check_status(response: Response, service: &'static str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(SyncError::Status {
        service,
        status,
        body,
    })
}

/// Joins a path onto a base URL, tolerating a trailing slash on the base.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Resolves a pagination link that may be absolute or relative to the base.
pub fn resolve_link(base_url: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else {
        endpoint(base_url, link)
    }
}
