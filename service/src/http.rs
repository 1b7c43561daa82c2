use crate::cache::DiscoveryCache;
use crate::clock::Clock;
use crate::discover::{DiscoveryError, PartitionResolver};
use crate::engine::{EngineError, QueryEngine};
use crate::frame::{records_from_frame, summaries_from_frame, total_count_from_frame};
use crate::query::{
    build_detail_count_query, build_detail_query, build_summary_count_query, build_summary_query,
    EffectiveWindow, Pagination, SortSpec, StatusFilter, DEFAULT_LIMIT,
};
use crate::validate::{validate_range, DateInterval, ValidationError};
use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use terrabench_model::{
    AdminEnvelope, BenchmarkRunRecord, DateRange, DetailResponse, ErrorBody, FiltersApplied,
    PageInfo, ResponseMetadata, ScenarioId, ScenarioSummary,
};

/// Gate for the admin endpoints.
///
/// Session handling is delegated to an external identity provider; this trait
/// is the seam it plugs into.
pub trait AdminPolicy: Send + Sync {
    fn authorize(&self, headers: &HeaderMap) -> bool;
}

/// Grants admin access to requests carrying the configured bearer token.
pub struct BearerTokenPolicy {
    token: String,
}

impl BearerTokenPolicy {
    pub fn new(token: String) -> Self {
        Self { token }
    }
}

impl AdminPolicy for BearerTokenPolicy {
    fn authorize(&self, headers: &HeaderMap) -> bool {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token == self.token)
            .unwrap_or(false)
    }
}

/// Denies all admin access. Used when no token is configured.
pub struct DenyAllPolicy;

impl AdminPolicy for DenyAllPolicy {
    fn authorize(&self, _headers: &HeaderMap) -> bool {
        false
    }
}

/// The set of scenario ids known to the catalogue.
///
/// Catalogue records are authored elsewhere; this layer only consults the id
/// set to reject lookups of unknown scenarios.
pub trait ScenarioCatalog: Send + Sync {
    fn contains(&self, id: &ScenarioId) -> bool;
}

/// Catalog backed by a fixed id set, or unrestricted when none is configured.
pub struct StaticCatalog {
    ids: Option<HashSet<String>>,
}

impl StaticCatalog {
    pub fn restricted(ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            ids: Some(ids.into_iter().collect()),
        }
    }

    pub fn unrestricted() -> Self {
        Self { ids: None }
    }
}

impl ScenarioCatalog for StaticCatalog {
    fn contains(&self, id: &ScenarioId) -> bool {
        match &self.ids {
            Some(ids) => ids.contains(id.as_str()),
            None => true,
        }
    }
}

/// Failures surfaced at the handler boundary.
///
/// Validation failures carry their reason verbatim; infrastructure failures
/// are logged with context and collapsed to a generic message so that query
/// text, URLs and stack detail never reach the response body.
pub enum ApiError {
    Validation(ValidationError),
    NotFound(String),
    Forbidden,
    Internal(anyhow::Error),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(err: DiscoveryError) -> Self {
        ApiError::Internal(err.into())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            ApiError::NotFound(id) => {
                (StatusCode::NOT_FOUND, format!("unknown scenario id: {id}"))
            }
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "admin access required".to_string()),
            ApiError::Internal(err) => {
                log::error!("Request failed: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub clock: Arc<dyn Clock>,
    pub resolver: Arc<PartitionResolver>,
    pub cache: Arc<DiscoveryCache>,
    pub engine: Arc<QueryEngine>,
    pub catalog: Arc<dyn ScenarioCatalog>,
    pub admin: Arc<dyn AdminPolicy>,
    pub lookback_months: u32,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/benchmarks", get(public_summary))
        .route("/api/benchmarks/:scenario_id", get(public_detail))
        .route("/api/admin/benchmarks", get(admin_summary))
        .route("/api/admin/benchmarks/:scenario_id", get(admin_detail))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn public_summary(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScenarioSummary>>, ApiError> {
    let urls = state.cache.default_urls().await?;
    if urls.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let window = EffectiveWindow::resolve(
        &DateInterval::default(),
        state.clock.now(),
        state.lookback_months,
    );
    let sql = build_summary_query(
        &window,
        None,
        StatusFilter::All,
        &SortSpec::summary_default(),
        None,
    );
    let frame = state.engine.execute(&urls, &sql).await?;
    let summaries = summaries_from_frame(&frame).map_err(ApiError::Internal)?;
    Ok(Json(summaries))
}

async fn public_detail(
    State(state): State<AppState>,
    Path(scenario_id): Path<String>,
) -> Result<Json<DetailResponse>, ApiError> {
    let scenario = parse_scenario(&state, &scenario_id)?;

    let urls = state.cache.default_urls().await?;
    let window = EffectiveWindow::resolve(
        &DateInterval::default(),
        state.clock.now(),
        state.lookback_months,
    );
    let data = if urls.is_empty() {
        Vec::new()
    } else {
        let sql = build_detail_query(
            &scenario,
            &window,
            StatusFilter::All,
            &SortSpec::detail_default(),
            None,
        );
        let frame = state.engine.execute(&urls, &sql).await?;
        records_from_frame(&frame).map_err(ApiError::Internal)?
    };

    Ok(Json(DetailResponse {
        scenario_id: scenario.to_string(),
        data,
    }))
}

/// Raw admin query-string parameters.
///
/// Numeric fields stay strings here so that out-of-range values surface as
/// this layer's validation errors rather than the extractor's.
#[derive(Debug, Default, Deserialize)]
struct AdminQuery {
    start: Option<String>,
    end: Option<String>,
    scenarios: Option<String>,
    status: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
    sort: Option<String>,
    order: Option<String>,
}

#[derive(Clone, Copy)]
enum QueryShape {
    Summary,
    Detail,
}

struct AdminParams {
    interval: DateInterval,
    scenarios: Option<Vec<ScenarioId>>,
    status: StatusFilter,
    sort: SortSpec,
    page: Pagination,
}

async fn admin_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AdminQuery>,
) -> Result<Json<AdminEnvelope<ScenarioSummary>>, ApiError> {
    if !state.admin.authorize(&headers) {
        return Err(ApiError::Forbidden);
    }

    let params = parse_admin_params(&state, &query, QueryShape::Summary)?;
    let window = EffectiveWindow::resolve(
        &params.interval,
        state.clock.now(),
        state.lookback_months,
    );
    let urls = resolve_urls(&state, &params.interval).await?;

    let (data, total_count) = if urls.is_empty() {
        (Vec::new(), 0)
    } else {
        let sql = build_summary_query(
            &window,
            params.scenarios.as_deref(),
            params.status,
            &params.sort,
            Some(&params.page),
        );
        let frame = state.engine.execute(&urls, &sql).await?;
        let data = summaries_from_frame(&frame).map_err(ApiError::Internal)?;

        let count_sql =
            build_summary_count_query(&window, params.scenarios.as_deref(), params.status);
        let count_frame = state.engine.execute(&urls, &count_sql).await?;
        let total = total_count_from_frame(&count_frame).map_err(ApiError::Internal)?;
        (data, total)
    };

    Ok(Json(envelope(data, total_count, &window, &params)))
}

async fn admin_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(scenario_id): Path<String>,
    Query(query): Query<AdminQuery>,
) -> Result<Json<AdminEnvelope<BenchmarkRunRecord>>, ApiError> {
    if !state.admin.authorize(&headers) {
        return Err(ApiError::Forbidden);
    }

    let scenario = parse_scenario(&state, &scenario_id)?;
    let params = parse_admin_params(&state, &query, QueryShape::Detail)?;
    let window = EffectiveWindow::resolve(
        &params.interval,
        state.clock.now(),
        state.lookback_months,
    );
    let urls = resolve_urls(&state, &params.interval).await?;

    let (data, total_count) = if urls.is_empty() {
        (Vec::new(), 0)
    } else {
        let sql = build_detail_query(
            &scenario,
            &window,
            params.status,
            &params.sort,
            Some(&params.page),
        );
        let frame = state.engine.execute(&urls, &sql).await?;
        let data = records_from_frame(&frame).map_err(ApiError::Internal)?;

        let count_sql = build_detail_count_query(&scenario, &window, params.status);
        let count_frame = state.engine.execute(&urls, &count_sql).await?;
        let total = total_count_from_frame(&count_frame).map_err(ApiError::Internal)?;
        (data, total)
    };

    Ok(Json(envelope(data, total_count, &window, &params)))
}

fn parse_scenario(state: &AppState, raw: &str) -> Result<ScenarioId, ApiError> {
    let scenario =
        ScenarioId::parse(raw).map_err(|e| ApiError::Validation(ValidationError::from(e)))?;
    if !state.catalog.contains(&scenario) {
        return Err(ApiError::NotFound(scenario.to_string()));
    }
    Ok(scenario)
}

/// Explicit ranges always resolve fresh; only the default range is cached.
async fn resolve_urls(state: &AppState, interval: &DateInterval) -> Result<Vec<String>, ApiError> {
    if interval.is_explicit() {
        Ok(state.resolver.resolve(interval, state.clock.now()).await?)
    } else {
        Ok(state.cache.default_urls().await?)
    }
}

fn parse_admin_params(
    state: &AppState,
    query: &AdminQuery,
    shape: QueryShape,
) -> Result<AdminParams, ValidationError> {
    let interval = validate_range(
        state.clock.now(),
        query.start.as_deref(),
        query.end.as_deref(),
    )?;
    let scenarios = parse_scenarios(query.scenarios.as_deref())?;
    let status = match query.status.as_deref() {
        Some(raw) => raw.parse()?,
        None => StatusFilter::default(),
    };
    let sort = parse_sort(shape, query.sort.as_deref(), query.order.as_deref())?;
    let page = parse_page(query.limit.as_deref(), query.offset.as_deref())?;

    Ok(AdminParams {
        interval,
        scenarios,
        status,
        sort,
        page,
    })
}

fn parse_scenarios(raw: Option<&str>) -> Result<Option<Vec<ScenarioId>>, ValidationError> {
    let raw = match raw {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(None),
    };
    let scenarios = raw
        .split(',')
        .map(|id| ScenarioId::parse(id.trim()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(scenarios))
}

fn parse_sort(
    shape: QueryShape,
    sort: Option<&str>,
    order: Option<&str>,
) -> Result<SortSpec, ValidationError> {
    let default = match shape {
        QueryShape::Summary => SortSpec::summary_default(),
        QueryShape::Detail => SortSpec::detail_default(),
    };
    let order = match order {
        Some(raw) => raw.parse()?,
        None => default.order,
    };
    let field = sort.unwrap_or_else(|| default.field());
    match shape {
        QueryShape::Summary => SortSpec::summary(field, order),
        QueryShape::Detail => SortSpec::detail(field, order),
    }
}

fn parse_page(limit: Option<&str>, offset: Option<&str>) -> Result<Pagination, ValidationError> {
    let limit = match limit {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| ValidationError::InvalidLimit)?,
        None => DEFAULT_LIMIT,
    };
    let offset = match offset {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| ValidationError::InvalidOffset)?,
        None => 0,
    };
    Pagination::new(limit, offset)
}

fn envelope<T>(
    data: Vec<T>,
    total_count: i64,
    window: &EffectiveWindow,
    params: &AdminParams,
) -> AdminEnvelope<T> {
    // Offset has no upper bound, so the end of the page is computed without
    // wrapping and anything beyond i64 is past every possible total.
    let scanned = i64::try_from(params.page.offset.saturating_add(params.page.limit))
        .unwrap_or(i64::MAX);
    AdminEnvelope {
        data,
        metadata: ResponseMetadata {
            total_count,
            page_info: PageInfo {
                limit: params.page.limit,
                offset: params.page.offset,
                has_next_page: scanned < total_count,
            },
            date_range: DateRange {
                start: window.start,
                end: window.end,
            },
            filters_applied: FiltersApplied {
                scenarios: params
                    .scenarios
                    .as_ref()
                    .map(|ids| ids.iter().map(ToString::to_string).collect()),
                status: params.status.as_str().to_string(),
                sort: params.sort.field().to_string(),
                order: params.sort.order.as_str().to_string(),
            },
        },
    }
}
