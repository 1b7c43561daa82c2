use std::sync::Arc;

pub mod cache;
pub mod clock;
pub mod config;
pub mod discover;
pub mod engine;
mod frame;
pub mod http;
pub mod query;
pub mod validate;

use cache::DiscoveryCache;
use clock::Clock;
use config::ServiceConfig;
use discover::{HttpProbe, PartitionResolver};
use engine::QueryEngine;
use http::{AdminPolicy, AppState, BearerTokenPolicy, DenyAllPolicy, StaticCatalog};

/// Wire the application state from a configuration and a clock.
///
/// The clock is injected so that tests can pin "now"; production callers pass
/// [clock::SystemClock].
pub fn app_state(config: &ServiceConfig, clock: Arc<dyn Clock>) -> AppState {
    let probe = Arc::new(HttpProbe::new(config.probe_timeout));
    let resolver = Arc::new(PartitionResolver::new(
        config.partition_url_template.clone(),
        config.lookback_months,
        probe,
    ));
    let cache = Arc::new(DiscoveryCache::new(
        resolver.clone(),
        clock.clone(),
        config.discovery_ttl,
    ));
    let engine = Arc::new(QueryEngine::new(config.fetch_timeout));

    let admin: Arc<dyn AdminPolicy> = match &config.admin_token {
        Some(token) => Arc::new(BearerTokenPolicy::new(token.clone())),
        None => {
            log::warn!("No admin token configured, admin endpoints are disabled");
            Arc::new(DenyAllPolicy)
        }
    };
    let catalog: Arc<dyn http::ScenarioCatalog> = Arc::new(match &config.scenario_ids {
        Some(ids) => StaticCatalog::restricted(ids.iter().cloned()),
        None => StaticCatalog::unrestricted(),
    });

    AppState {
        clock,
        resolver,
        cache,
        engine,
        catalog,
        admin,
        lookback_months: config.lookback_months,
    }
}
