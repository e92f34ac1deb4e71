//! Shared HTTP plumbing.
//!
//! Client construction and URL helpers used by polling, the server stream,
//! the pub/sub token request and payment creation.

use reqwest::Client;
use tracing::instrument;
use url::Url;

use super::config::HttpConfig;
use crate::error::{Result, SyncError};

/// Builds a pooled HTTP client with request and connect timeouts.
///
/// # Errors
///
/// Returns error if client configuration fails.
pub fn build_client(config: &HttpConfig) -> Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .build()
        .map_err(SyncError::HttpError)
}

/// Builds a client for long-lived streaming responses.
///
/// Only the connect timeout applies; a total request timeout would cut the
/// stream.
///
/// # Errors
///
/// Returns error if client configuration fails.
pub fn build_stream_client(config: &HttpConfig) -> Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .connect_timeout(config.connect_timeout())
        .build()
        .map_err(SyncError::HttpError)
}

/// Appends one percent-encoded path segment (`/api/payment-status` + `p1`).
///
/// # Errors
///
/// Returns [`SyncError::InvalidUrl`] for URLs that cannot have a path
/// (e.g. `mailto:`).
pub fn append_segment(url: &Url, segment: &str) -> Result<Url> {
    let mut joined = url.clone();
    joined
        .path_segments_mut()
        .map_err(|()| SyncError::InvalidUrl(format!("URL cannot be a base: {url}")))?
        .pop_if_empty()
        .push(segment);
    Ok(joined)
}

/// Returns `url` with `key=value` appended to its query string.
#[must_use]
pub fn with_query(url: &Url, key: &str, value: &str) -> Url {
    let mut url = url.clone();
    url.query_pairs_mut().append_pair(key, value);
    url
}

/// Issues a GET and returns the body of a successful response.
///
/// # Errors
///
/// Returns [`SyncError::HttpError`] on network failure and
/// [`SyncError::TransportError`] on a non-success status.
#[instrument(skip(client), fields(url = %url))]
pub async fn get_bytes(client: &Client, url: &Url) -> Result<Vec<u8>> {
    let response = client
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::TransportError(format!("server returned status {}", status.as_u16())));
    }

    Ok(response.bytes().await.map_err(SyncError::HttpError)?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_default_config() {
        assert!(build_client(&HttpConfig::default()).is_ok());
        assert!(build_stream_client(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn test_append_segment() {
        let base = Url::parse("https://shop.example.com/api/payment-status").unwrap();
        let url = append_segment(&base, "p1").unwrap();
        assert_eq!(url.as_str(), "https://shop.example.com/api/payment-status/p1");
    }

    #[test]
    fn test_append_segment_trailing_slash() {
        let base = Url::parse("https://shop.example.com/api/payment-status/").unwrap();
        let url = append_segment(&base, "p1").unwrap();
        assert_eq!(url.as_str(), "https://shop.example.com/api/payment-status/p1");
    }

    #[test]
    fn test_append_segment_encodes_id() {
        let base = Url::parse("https://shop.example.com/status").unwrap();
        let url = append_segment(&base, "a/b c").unwrap();
        assert_eq!(url.as_str(), "https://shop.example.com/status/a%2Fb%20c");
    }

    #[test]
    fn test_append_segment_rejects_non_base() {
        let base = Url::parse("mailto:ops@example.com").unwrap();
        let error = append_segment(&base, "p1").unwrap_err();
        assert!(
            matches!(error, SyncError::InvalidUrl(ref m) if m.contains("mailto:ops@example.com")),
            "unexpected error {error}"
        );
    }

    #[test]
    fn test_with_query_preserves_existing_pairs() {
        let base = Url::parse("https://shop.example.com/api/payments/stream?v=2").unwrap();
        let url = with_query(&base, "paymentId", "p1");
        assert_eq!(url.as_str(), "https://shop.example.com/api/payments/stream?v=2&paymentId=p1");
    }
}
