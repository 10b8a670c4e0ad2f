// Shared HTTP plumbing for the external services
// Classifies failures into transient and permanent so retry policy lives with the caller

#[cfg(test)]
mod tests;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Failure reported by an external service call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// HTTP 429; the service asked us to slow down
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Timeouts, connection failures and 5xx responses
    #[error("transient failure: {0}")]
    Transient(String),
    /// Anything retrying cannot fix (bad request, auth failure, malformed response)
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ServiceError {
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Transient(_))
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Classify a non-success HTTP status
    #[inline]
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited(format!("HTTP {}", status)),
            500..=599 => Self::Transient(format!("Server error: HTTP {}", status)),
            _ => Self::Permanent(format!("Client error: HTTP {}", status)),
        }
    }
}

impl From<ureq::Error> for ServiceError {
    #[inline]
    fn from(error: ureq::Error) -> Self {
        match error {
            ureq::Error::StatusCode(status) => Self::from_status(status),
            ureq::Error::ConnectionFailed
            | ureq::Error::HostNotFound
            | ureq::Error::Timeout(_)
            | ureq::Error::Io(_) => Self::Transient(format!("Transport error: {}", error)),
            other => Self::Permanent(format!("Request error: {}", other)),
        }
    }
}

/// Build a blocking agent whose every call is bounded by `timeout`
#[inline]
pub fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Append `path` to `base`, keeping any path prefix already on the base URL
#[inline]
pub fn endpoint(base: &str, path: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    ))
}

/// POST a JSON body and decode a JSON response, single attempt
///
/// Blocks the current thread until the response arrives or the agent times out.
pub fn post_json<B, R>(
    agent: &ureq::Agent,
    url: &Url,
    headers: &[(&str, &str)],
    body: &B,
) -> Result<R, ServiceError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let payload = serde_json::to_string(body)
        .map_err(|e| ServiceError::Permanent(format!("Failed to serialize request: {}", e)))?;

    debug!("POST {} ({} bytes)", url, payload.len());

    let mut request = agent
        .post(url.as_str())
        .header("Content-Type", "application/json");
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    let response_text = request
        .send(&payload)
        .and_then(|mut resp| resp.body_mut().read_to_string())
        .map_err(|e| {
            let error = ServiceError::from(e);
            warn!("POST {} failed: {}", url, error);
            error
        })?;

    serde_json::from_str(&response_text).map_err(|e| {
        ServiceError::Permanent(format!("Failed to parse response from {}: {}", url, e))
    })
}
