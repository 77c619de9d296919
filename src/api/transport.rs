//! Rate-limited HTTP transport
//!
//! All outbound requests pass through one process-wide limiter that enforces
//! a minimum interval between consecutive requests (the upstream API allows
//! 1 request per second by default). Throttle responses are retried with a
//! bounded backoff; everything else in the transport error taxonomy is fatal
//! to the run.

use reqwest::{Client, Response};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Errors produced below the payload level. All of these abort the run.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The URL path itself does not exist. This is a client or configuration
    /// defect, never a transient condition, and is never retried.
    #[error("endpoint path not found: {url}")]
    PathNotFound { url: String },

    /// The credential was rejected outright.
    #[error("authorization rejected for {url}")]
    Unauthorized { url: String },

    /// Throttle responses kept coming back until the retry budget ran out.
    #[error("still throttled after {attempts} attempts: {url}")]
    Throttled { url: String, attempts: u32 },

    #[error("unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("network error for {url}: {source}")]
    Network {
        url: String,
        source: reqwest::Error,
    },

    #[error("failed to decode JSON body from {url}: {source}")]
    Decode {
        url: String,
        source: reqwest::Error,
    },
}

/// Process-wide admission gate for outbound requests
///
/// The slot is reserved at request start, not completion, so concurrent
/// callers cannot burst past the configured rate.
pub struct RateLimiter {
    min_interval: Duration,
    last_request_at: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request_at: Mutex::new(None),
        }
    }

    /// Waits until the minimum interval since the previous admission has
    /// elapsed, then reserves the slot.
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_request_at.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// HTTP transport with rate limiting and throttle retry
pub struct Transport {
    client: Client,
    limiter: RateLimiter,
    api_key: Option<String>,
    max_retries: u32,
}

/// Builds the HTTP client used for all API traffic
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(concat!("arena-stats/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

impl Transport {
    pub fn new(
        client: Client,
        min_interval: Duration,
        max_retries: u32,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            limiter: RateLimiter::new(min_interval),
            api_key,
            max_retries,
        }
    }

    /// Performs a GET and decodes the JSON body.
    ///
    /// Throttle statuses (429, and 403 which this API also uses to signal
    /// rate limiting) are retried up to `max_retries` times, honoring
    /// `Retry-After` when present. Transport-level 404 and 401 are returned
    /// immediately without retry.
    pub async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<serde_json::Value, TransportError> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            self.limiter.acquire().await;

            let mut request = self.client.get(url);
            if let Some(key) = &self.api_key {
                request = request.header("x-api-key", key);
            }
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            let response = request.send().await.map_err(|source| {
                TransportError::Network {
                    url: url.to_string(),
                    source,
                }
            })?;

            let status = response.status();
            match status.as_u16() {
                // 403 shows up alongside 429 when this API rate limits.
                429 | 403 => {
                    if attempts > self.max_retries {
                        return Err(TransportError::Throttled {
                            url: url.to_string(),
                            attempts,
                        });
                    }
                    let wait = retry_after(&response)
                        .unwrap_or_else(|| self.limiter.min_interval.max(Duration::from_secs(1)));
                    tracing::warn!(
                        "Throttled by upstream (attempt {}/{}), waiting {:?}",
                        attempts,
                        self.max_retries,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
                404 => {
                    return Err(TransportError::PathNotFound {
                        url: url.to_string(),
                    });
                }
                401 => {
                    return Err(TransportError::Unauthorized {
                        url: url.to_string(),
                    });
                }
                _ if !status.is_success() => {
                    return Err(TransportError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                _ => {}
            }

            return response.json().await.map_err(|source| TransportError::Decode {
                url: url.to_string(),
                source,
            });
        }
    }
}

/// Parses a `Retry-After` header given in seconds, if present
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("Retry-After")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| *seconds >= 0.0)
        .map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(Duration::from_secs(10)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_spaces_requests_by_min_interval() {
        let limiter = RateLimiter::new(Duration::from_secs(1));

        let start = Instant::now();
        limiter.acquire().await;
        let first = start.elapsed();
        limiter.acquire().await;
        let second = start.elapsed();

        // First admission is immediate, second waits out the interval.
        assert!(first < Duration::from_millis(10));
        assert!(second >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_does_not_wait_after_interval_already_elapsed() {
        let limiter = RateLimiter::new(Duration::from_millis(100));

        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let before = Instant::now();
        limiter.acquire().await;
        assert!(before.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn zero_interval_disables_the_limiter() {
        let limiter = RateLimiter::new(Duration::ZERO);
        limiter.acquire().await;
        limiter.acquire().await;
    }
}
