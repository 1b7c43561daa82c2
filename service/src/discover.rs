use crate::validate::DateInterval;
use chrono::{DateTime, Datelike, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Placeholder for the 4-digit year in a partition URL template.
pub const YEAR_PLACEHOLDER: &str = "[YEAR]";
/// Placeholder for the zero-padded 2-digit month in a partition URL template.
pub const MONTH_PLACEHOLDER: &str = "[MONTH]";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("partition URL template must contain {YEAR_PLACEHOLDER} and {MONTH_PLACEHOLDER}: {template}")]
    InvalidTemplate { template: String },
}

/// One month of the partitioned dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PartitionKey {
    pub year: i32,
    pub month: u32,
}

impl PartitionKey {
    fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    fn of(date: DateTime<Utc>) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Move back `months` whole months, crossing year boundaries as needed.
    fn back(self, months: u32) -> Self {
        let total = self.year * 12 + self.month as i32 - 1 - months as i32;
        Self {
            year: total.div_euclid(12),
            month: total.rem_euclid(12) as u32 + 1,
        }
    }
}

/// Walk month-by-month over the interval, inclusive of both end months.
///
/// Without an explicit start the walk begins `lookback_months` before `now`;
/// without an explicit end it finishes at the current month.
pub fn partition_keys(
    interval: &DateInterval,
    now: DateTime<Utc>,
    lookback_months: u32,
) -> Vec<PartitionKey> {
    let first = match interval.start {
        Some(start) => PartitionKey::of(start),
        None => PartitionKey::of(now).back(lookback_months),
    };
    let last = match interval.end {
        Some(end) => PartitionKey::of(end),
        None => PartitionKey::of(now),
    };

    let mut keys = Vec::new();
    let mut key = first;
    while key <= last {
        keys.push(key);
        key = key.next();
    }
    keys
}

/// Substitute a partition key into the URL template.
pub fn partition_url(template: &str, key: PartitionKey) -> String {
    template
        .replace(YEAR_PLACEHOLDER, &format!("{:04}", key.year))
        .replace(MONTH_PLACEHOLDER, &format!("{:02}", key.month))
}

/// What an existence probe learned about a candidate partition URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The partition exists and can be scanned.
    Exists,
    /// The partition is not published. Expected for the current month.
    Absent,
    /// Transport failure, timeout or server error. The partition may exist.
    Inconclusive,
}

/// Existence check for a candidate partition URL.
pub trait PartitionProbe: Send + Sync {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ProbeOutcome>;
}

/// HEAD-request probe over HTTP.
pub struct HttpProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl PartitionProbe for HttpProbe {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ProbeOutcome> {
        async move {
            match self.client.head(url).timeout(self.timeout).send().await {
                Ok(response) if response.status().is_success() => ProbeOutcome::Exists,
                Ok(response) if response.status().is_client_error() => {
                    log::debug!("Partition not published: {} ({})", url, response.status());
                    ProbeOutcome::Absent
                }
                Ok(response) => {
                    log::warn!("Partition probe got {} for {}", response.status(), url);
                    ProbeOutcome::Inconclusive
                }
                Err(e) => {
                    log::warn!("Partition probe failed for {}: {:?}", url, e);
                    ProbeOutcome::Inconclusive
                }
            }
        }
        .boxed()
    }
}

/// Determines which monthly partitions currently exist for a time interval.
pub struct PartitionResolver {
    template: String,
    lookback_months: u32,
    probe: Arc<dyn PartitionProbe>,
}

impl PartitionResolver {
    pub fn new(
        template: String,
        lookback_months: u32,
        probe: Arc<dyn PartitionProbe>,
    ) -> Self {
        Self {
            template,
            lookback_months,
            probe,
        }
    }

    /// Resolve the partition URLs that exist for the interval.
    ///
    /// Candidate months are probed concurrently; the result preserves
    /// chronological order regardless of probe completion order. A month
    /// whose probe reports [ProbeOutcome::Absent] is skipped silently, an
    /// inconclusive probe is retried once and then treated as absent. An
    /// empty result is the steady state before the first partition of a
    /// range is published, not an error.
    pub async fn resolve(
        &self,
        interval: &DateInterval,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, DiscoveryError> {
        if !self.template.contains(YEAR_PLACEHOLDER) || !self.template.contains(MONTH_PLACEHOLDER)
        {
            return Err(DiscoveryError::InvalidTemplate {
                template: self.template.clone(),
            });
        }

        let candidates: Vec<String> = partition_keys(interval, now, self.lookback_months)
            .into_iter()
            .map(|key| partition_url(&self.template, key))
            .collect();

        let outcomes =
            futures::future::join_all(candidates.iter().map(|url| self.probe_with_retry(url)))
                .await;

        let urls = candidates
            .into_iter()
            .zip(outcomes)
            .filter_map(|(url, outcome)| match outcome {
                ProbeOutcome::Exists => Some(url),
                ProbeOutcome::Absent => None,
                ProbeOutcome::Inconclusive => {
                    log::warn!("Treating inconclusive partition probe as absent: {}", url);
                    None
                }
            })
            .collect();

        Ok(urls)
    }

    async fn probe_with_retry(&self, url: &str) -> ProbeOutcome {
        match self.probe.probe(url).await {
            ProbeOutcome::Inconclusive => {
                log::debug!("Retrying inconclusive partition probe: {}", url);
                self.probe.probe(url).await
            }
            outcome => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEMPLATE: &str = "https://data.example.com/benchmarks/[YEAR]/[MONTH]/runs.parquet";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 15, 10, 0, 0).unwrap()
    }

    fn interval(start: &str, end: &str) -> DateInterval {
        crate::validate::validate_range(now(), Some(start), Some(end)).unwrap()
    }

    struct FixedProbe {
        outcomes: HashMap<String, ProbeOutcome>,
        calls: AtomicUsize,
        delay_first: bool,
    }

    impl FixedProbe {
        fn new(outcomes: HashMap<String, ProbeOutcome>) -> Self {
            Self {
                outcomes,
                calls: AtomicUsize::new(0),
                delay_first: false,
            }
        }
    }

    impl PartitionProbe for FixedProbe {
        fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ProbeOutcome> {
            async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                // Let the chronologically-first probe finish last.
                if self.delay_first && call == 0 {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                self.outcomes
                    .get(url)
                    .copied()
                    .unwrap_or(ProbeOutcome::Absent)
            }
            .boxed()
        }
    }

    fn url(year: i32, month: u32) -> String {
        partition_url(TEMPLATE, PartitionKey { year, month })
    }

    #[test]
    fn walk_covers_three_months_inclusive() {
        let keys = partition_keys(&interval("2025-01-05", "2025-03-20"), now(), 2);
        assert_eq!(
            keys,
            vec![
                PartitionKey { year: 2025, month: 1 },
                PartitionKey { year: 2025, month: 2 },
                PartitionKey { year: 2025, month: 3 },
            ]
        );
    }

    #[test]
    fn walk_crosses_year_boundaries() {
        let keys = partition_keys(&interval("2024-11-01", "2025-01-31"), now(), 2);
        assert_eq!(
            keys,
            vec![
                PartitionKey { year: 2024, month: 11 },
                PartitionKey { year: 2024, month: 12 },
                PartitionKey { year: 2025, month: 1 },
            ]
        );
    }

    #[test]
    fn default_walk_uses_the_lookback_window() {
        let keys = partition_keys(&DateInterval::default(), now(), 2);
        assert_eq!(
            keys,
            vec![
                PartitionKey { year: 2024, month: 12 },
                PartitionKey { year: 2025, month: 1 },
                PartitionKey { year: 2025, month: 2 },
            ]
        );
    }

    #[test]
    fn substitution_pads_the_month() {
        assert_eq!(
            url(2025, 3),
            "https://data.example.com/benchmarks/2025/03/runs.parquet"
        );
    }

    #[tokio::test]
    async fn missing_months_are_skipped_without_error() {
        let probe = FixedProbe::new(HashMap::from([
            (url(2025, 1), ProbeOutcome::Exists),
            (url(2025, 2), ProbeOutcome::Absent),
            (url(2025, 3), ProbeOutcome::Exists),
        ]));
        let resolver = PartitionResolver::new(TEMPLATE.to_string(), 2, Arc::new(probe));

        let urls = resolver
            .resolve(&interval("2025-01-01", "2025-03-31"), now())
            .await
            .unwrap();
        assert_eq!(urls, vec![url(2025, 1), url(2025, 3)]);
    }

    #[tokio::test]
    async fn result_is_chronological_even_when_probes_finish_out_of_order() {
        let mut probe = FixedProbe::new(HashMap::from([
            (url(2025, 1), ProbeOutcome::Exists),
            (url(2025, 2), ProbeOutcome::Exists),
            (url(2025, 3), ProbeOutcome::Exists),
        ]));
        probe.delay_first = true;
        let resolver = PartitionResolver::new(TEMPLATE.to_string(), 2, Arc::new(probe));

        let urls = resolver
            .resolve(&interval("2025-01-01", "2025-03-31"), now())
            .await
            .unwrap();
        assert_eq!(urls, vec![url(2025, 1), url(2025, 2), url(2025, 3)]);
    }

    #[tokio::test]
    async fn inconclusive_probes_are_retried_then_treated_as_absent() {
        let probe = Arc::new(FixedProbe::new(HashMap::from([
            (url(2025, 1), ProbeOutcome::Exists),
            (url(2025, 2), ProbeOutcome::Inconclusive),
        ])));
        let resolver = PartitionResolver::new(TEMPLATE.to_string(), 2, probe.clone());

        let urls = resolver
            .resolve(&interval("2025-01-01", "2025-02-15"), now())
            .await
            .unwrap();
        assert_eq!(urls, vec![url(2025, 1)]);
        // One probe for January, two for inconclusive February.
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_range_result_is_not_an_error() {
        let probe = FixedProbe::new(HashMap::new());
        let resolver = PartitionResolver::new(TEMPLATE.to_string(), 2, Arc::new(probe));

        let urls = resolver
            .resolve(&interval("2025-01-01", "2025-01-31"), now())
            .await
            .unwrap();
        assert!(urls.is_empty());
    }

    #[tokio::test]
    async fn template_without_placeholders_is_rejected() {
        let probe = FixedProbe::new(HashMap::new());
        let resolver = PartitionResolver::new(
            "https://data.example.com/benchmarks/runs.parquet".to_string(),
            2,
            Arc::new(probe),
        );

        let err = resolver
            .resolve(&DateInterval::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidTemplate { .. }));
    }
}
