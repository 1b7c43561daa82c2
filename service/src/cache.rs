use crate::clock::Clock;
use crate::discover::{DiscoveryError, PartitionResolver};
use crate::validate::DateInterval;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct CacheEntry {
    urls: Vec<String>,
    expires_at: DateTime<Utc>,
}

/// Process-wide cache of the default-range partition discovery.
///
/// Only the default (no explicit date range) resolution is cached; explicit
/// ranges are infrequent admin queries and always resolve fresh. The entry
/// lock is held across population, so N callers arriving while the entry is
/// empty or stale trigger exactly one resolution and all observe its result.
/// A failed population leaves the previous entry untouched and the error
/// propagates to the triggering caller only; the next caller retries.
pub struct DiscoveryCache {
    resolver: Arc<PartitionResolver>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
}

impl DiscoveryCache {
    pub fn new(resolver: Arc<PartitionResolver>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            resolver,
            clock,
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// The partition URLs for the default lookback window.
    ///
    /// Served from cache while fresh, re-resolved synchronously otherwise.
    pub async fn default_urls(&self) -> Result<Vec<String>, DiscoveryError> {
        let mut guard = self.entry.lock().await;

        if let Some(entry) = guard.as_ref() {
            if self.clock.now() < entry.expires_at {
                log::debug!(
                    "Serving {} partition URLs from cache (expires {})",
                    entry.urls.len(),
                    entry.expires_at
                );
                return Ok(entry.urls.clone());
            }
            log::debug!("Discovery cache expired at {}", entry.expires_at);
        }

        let urls = self
            .resolver
            .resolve(&DateInterval::default(), self.clock.now())
            .await?;
        let expires_at = self.clock.now() + self.ttl;
        log::info!(
            "Discovered {} partition URLs, caching until {}",
            urls.len(),
            expires_at
        );
        *guard = Some(CacheEntry {
            urls: urls.clone(),
            expires_at,
        });

        Ok(urls)
    }
}
