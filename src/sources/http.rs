use std::time::Duration;

use reqwest::blocking::{Client, Response};

use crate::Result;

/// Default per-request timeout for every outbound call.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("newsreel/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

/// Split a response into its body on success, or `(status, body)` for an error payload.
pub(crate) fn success_or_body(resp: Response) -> std::result::Result<Response, (u16, String)> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err((status.as_u16(), body.trim().to_owned()))
}
