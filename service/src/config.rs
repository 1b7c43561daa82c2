use anyhow::Context;
use std::time::Duration;

/// Environment variable holding the partition URL template.
const PARTITION_URL_TEMPLATE_ENV: &str = "PARTITION_URL_TEMPLATE";
/// Environment variable overriding the default lookback window, in months.
const LOOKBACK_MONTHS_ENV: &str = "LOOKBACK_MONTHS";
/// Environment variable overriding the discovery cache TTL, in seconds.
const DISCOVERY_TTL_SECS_ENV: &str = "DISCOVERY_TTL_SECS";
/// Environment variable overriding the partition probe timeout, in seconds.
const PROBE_TIMEOUT_SECS_ENV: &str = "PROBE_TIMEOUT_SECS";
/// Environment variable overriding the partition fetch timeout, in seconds.
const FETCH_TIMEOUT_SECS_ENV: &str = "FETCH_TIMEOUT_SECS";
/// Environment variable holding the admin bearer token.
const ADMIN_TOKEN_ENV: &str = "ADMIN_TOKEN";
/// Environment variable holding the comma-separated list of known scenario ids.
const SCENARIO_IDS_ENV: &str = "SCENARIO_IDS";

const DEFAULT_LOOKBACK_MONTHS: u32 = 2;
const DEFAULT_DISCOVERY_TTL_SECS: i64 = 3600;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration of the metrics service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// URL template with `[YEAR]`/`[MONTH]` placeholders, one file per month.
    pub partition_url_template: String,
    /// How many months before the current one the default window reaches back.
    pub lookback_months: u32,
    /// How long a default-range discovery result stays fresh.
    pub discovery_ttl: chrono::Duration,
    /// Timeout for a single partition existence probe.
    pub probe_timeout: Duration,
    /// Timeout for fetching one partition's bytes during a query.
    pub fetch_timeout: Duration,
    /// Bearer token for the admin endpoints. Admin access is denied when unset.
    pub admin_token: Option<String>,
    /// Known scenario ids, used to reject unknown ids with a 404.
    ///
    /// When unset, any well-formed scenario id is accepted.
    pub scenario_ids: Option<Vec<String>>,
}

impl ServiceConfig {
    /// Read the configuration from the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let partition_url_template = std::env::var(PARTITION_URL_TEMPLATE_ENV).context(
            "Cannot discover partitions without environment variable `PARTITION_URL_TEMPLATE`",
        )?;

        let lookback_months = parse_env(LOOKBACK_MONTHS_ENV)?.unwrap_or(DEFAULT_LOOKBACK_MONTHS);
        let ttl_secs = parse_env(DISCOVERY_TTL_SECS_ENV)?.unwrap_or(DEFAULT_DISCOVERY_TTL_SECS);
        let discovery_ttl = discovery_ttl_from_secs(ttl_secs)?;
        let probe_secs = parse_env(PROBE_TIMEOUT_SECS_ENV)?.unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS);
        let fetch_secs = parse_env(FETCH_TIMEOUT_SECS_ENV)?.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);

        let admin_token = std::env::var(ADMIN_TOKEN_ENV).ok().filter(|t| !t.is_empty());
        let scenario_ids = std::env::var(SCENARIO_IDS_ENV).ok().map(|raw| {
            raw.split(',')
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect()
        });

        Ok(Self {
            partition_url_template,
            lookback_months,
            discovery_ttl,
            probe_timeout: Duration::from_secs(probe_secs),
            fetch_timeout: Duration::from_secs(fetch_secs),
            admin_token,
            scenario_ids,
        })
    }
}

/// A non-positive TTL would mark every cache entry stale on arrival.
fn discovery_ttl_from_secs(secs: i64) -> anyhow::Result<chrono::Duration> {
    anyhow::ensure!(
        secs > 0,
        "`{DISCOVERY_TTL_SECS_ENV}` must be a positive number of seconds, got {secs}"
    );
    Ok(chrono::Duration::seconds(secs))
}

fn parse_env<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => {
            let value = raw
                .parse()
                .with_context(|| format!("Invalid value for `{name}`: {raw}"))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn discovery_ttl_rejects_non_positive_values() {
        assert!(discovery_ttl_from_secs(0).is_err());
        assert!(discovery_ttl_from_secs(-3600).is_err());
        assert_eq!(
            discovery_ttl_from_secs(3600).unwrap(),
            chrono::Duration::seconds(3600)
        );
    }
}
