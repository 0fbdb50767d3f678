//! Rate-limited HTTP access to the upstream API.
//!
//! A single fetcher instance is shared (behind an `Arc`) by every stage that
//! talks to the upstream, so the minimum inter-request interval holds across
//! index, content, and author lookups together.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::error::{AppError, Result};

pub struct RateLimitedFetcher {
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimitedFetcher {
    pub fn new(client: reqwest::Client, min_interval: Duration) -> Self {
        Self {
            client,
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request may be sent and claim the slot.
    ///
    /// The lock is held across the sleep so concurrent callers queue up
    /// behind each other instead of racing for the same slot.
    pub async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let since = previous.elapsed();
            if since < self.min_interval {
                tokio::time::sleep(self.min_interval - since).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Issue a throttled GET and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, stage: &'static str, url: Url) -> Result<T> {
        self.throttle().await;

        let started = Instant::now();
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        log::debug!(
            "[{stage}] GET {url} -> {} in {}ms",
            status.as_u16(),
            started.elapsed().as_millis()
        );

        if !status.is_success() {
            return Err(AppError::Status {
                stage,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| AppError::api(stage, format!("malformed payload: {e}")))
    }
}
