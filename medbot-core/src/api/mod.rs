// medbot-core/src/api/mod.rs

//! Raw HTTP calls to the model vendors.

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LimitsConfig;

pub mod gemini;
pub mod openai;

const MAX_DELAY: Duration = Duration::from_secs(60);
const BACKOFF_FACTOR: f64 = 2.0;

/// How often a request is re-sent after a transient failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// One attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_secs(1),
        }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            max_retries: limits.max_retries,
            initial_delay: limits.retry_initial_delay(),
        }
    }
}

/// Builds the HTTP client shared by the providers and the search client.
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Sends the request produced by `make_request`, retrying network errors,
/// 429 and 5xx responses according to `policy`.
///
/// Returns the response only when its status is a success.
pub async fn send_with_retry<F>(make_request: F, policy: RetryPolicy) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut retries = 0;
    let mut current_delay = policy.initial_delay;

    loop {
        let response = match make_request().send().await {
            Ok(resp) => resp,
            Err(e) => {
                if retries < policy.max_retries {
                    retries += 1;
                    warn!(
                        "Network error sending request: {}. Retrying in {:?} (attempt {}/{})",
                        e, current_delay, retries, policy.max_retries
                    );
                    tokio::time::sleep(current_delay).await;
                    current_delay = next_delay(current_delay);
                    continue;
                }
                if policy.max_retries == 0 {
                    return Err(anyhow!("Network error: {}", e));
                }
                return Err(anyhow!(
                    "Network error after {} retries: {}",
                    policy.max_retries,
                    e
                ));
            }
        };

        let status = response.status();

        if (status.as_u16() == 429 || status.is_server_error()) && retries < policy.max_retries {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);

            let wait_time = retry_after.unwrap_or(current_delay).min(MAX_DELAY);
            retries += 1;
            warn!(
                "API request failed with status {}. Retrying in {:?} (attempt {}/{})",
                status, wait_time, retries, policy.max_retries
            );
            tokio::time::sleep(wait_time).await;
            current_delay = next_delay(current_delay);
            continue;
        }

        if !status.is_success() {
            let headers = response.headers().clone();
            let error_text = response
                .text()
                .await
                .context("Failed to read API error response body")?;
            debug!(
                "API request failed. Status: {}, Headers: {:#?}, Body: {}",
                status, headers, error_text
            );
            return Err(anyhow!("API error: {} - {}", status, error_text));
        }

        return Ok(response);
    }
}

fn next_delay(current: Duration) -> Duration {
    std::cmp::min(
        Duration::from_secs_f64(current.as_secs_f64() * BACKOFF_FACTOR),
        MAX_DELAY,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_next_delay_doubles_and_caps() {
        assert_eq!(next_delay(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(next_delay(Duration::from_secs(45)), MAX_DELAY);
    }

    #[tokio::test]
    async fn test_send_with_retry_single_attempt_by_default() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/fail");
                then.status(503).body("unavailable");
            })
            .await;

        let client = Client::new();
        let url = server.url("/fail");
        let result = send_with_retry(|| client.post(&url), RetryPolicy::none()).await;

        assert_eq!(mock.hits(), 1);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("API error: 503"), "Unexpected error: {}", err);
        assert!(err.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_send_with_retry_retries_server_errors() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/flaky");
                then.status(500).body("boom");
            })
            .await;

        let client = Client::new();
        let url = server.url("/flaky");
        let policy = RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(5),
        };
        let result = send_with_retry(|| client.post(&url), policy).await;

        assert_eq!(mock.hits(), 3);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_send_with_retry_does_not_retry_client_errors() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/auth");
                then.status(401).body("bad credentials");
            })
            .await;

        let client = Client::new();
        let url = server.url("/auth");
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(5),
        };
        let result = send_with_retry(|| client.post(&url), policy).await;

        assert_eq!(mock.hits(), 1);
        assert!(result.unwrap_err().to_string().contains("API error: 401"));
    }
}
