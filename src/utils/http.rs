// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;
use crate::models::HttpConfig;

/// Create a configured asynchronous HTTP client.
///
/// Per-request timeouts for collaborator calls are applied separately; this
/// is the outer bound for any single request.
pub fn create_async_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Join a collaborator base URL and an endpoint path.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        assert_eq!(endpoint("http://frontier:7072/", "/urls"), "http://frontier:7072/urls");
        assert_eq!(endpoint("http://lightrag:9621", "query"), "http://lightrag:9621/query");
    }

    #[test]
    fn test_create_async_client() {
        assert!(create_async_client(&HttpConfig::default()).is_ok());
    }
}
