use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

/// Key used when a locator yields neither a host nor a leading segment.
pub const GLOBAL_HOST_KEY: &str = "global";

/// Derives the pacing key for a source locator.
///
/// Full URLs key on their lowercased host (plus explicit port). Bare locators
/// such as `acme` or `boards.example.com/acme` key on their first segment.
pub fn rate_limit_key(locator: &str) -> String {
    let trimmed = locator.trim();
    if let Ok(url) = Url::parse(trimmed) {
        if let Some(host) = url.host_str() {
            let host = host.to_ascii_lowercase();
            return match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            };
        }
    }

    let segment = trimmed
        .split('/')
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if segment.is_empty() {
        GLOBAL_HOST_KEY.to_string()
    } else {
        segment
    }
}

/// Enforces a minimum spacing between request starts per key, across all workers.
///
/// The lock only guards the timestamp table; sleeping happens outside it so
/// waiters on other keys are never blocked.
#[derive(Debug, Default)]
pub struct DomainRateLimiter {
    last_start: Mutex<HashMap<String, Instant>>,
}

impl DomainRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until a request to `key` may start and records the start.
    /// Returns the time spent waiting.
    pub async fn wait(&self, key: &str, min_interval: Duration) -> Duration {
        let began = Instant::now();
        loop {
            let mut table = self.last_start.lock().await;
            let now = Instant::now();
            let remaining = match table.get(key) {
                Some(last) if !min_interval.is_zero() => {
                    min_interval.saturating_sub(now.duration_since(*last))
                }
                _ => Duration::ZERO,
            };

            if remaining.is_zero() {
                table.insert(key.to_string(), now);
                return now.duration_since(began);
            }

            drop(table);
            tokio::time::sleep(remaining).await;
        }
    }

    pub async fn tracked_keys(&self) -> usize {
        self.last_start.lock().await.len()
    }
}
