use crate::validate::{DateInterval, ValidationError};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use std::fmt;
use std::str::FromStr;
use terrabench_model::ScenarioId;

/// The table name partition scans are registered under in the query engine.
pub const BENCHMARK_TABLE: &str = "benchmark_runs";

/// Sort fields accepted for the summary shape.
pub const SUMMARY_SORT_FIELDS: &[&str] =
    &["scenario_id", "runs", "success_count", "failed_count"];

/// Sort fields accepted for the detail shape.
pub const DETAIL_SORT_FIELDS: &[&str] = &[
    "started_at",
    "duration_seconds",
    "cpu_seconds",
    "memory_seconds",
    "cost",
    "input_pixels",
    "max_executor_memory",
    "network_received_bytes",
];

/// Outcome filter for admin queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Passed,
    Failed,
}

impl StatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Passed => "passed",
            StatusFilter::Failed => "failed",
        }
    }
}

impl FromStr for StatusFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(StatusFilter::All),
            "passed" => Ok(StatusFilter::Passed),
            "failed" => Ok(StatusFilter::Failed),
            _ => Err(ValidationError::InvalidStatus),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(ValidationError::InvalidOrder),
        }
    }
}

/// A sort field paired with a direction.
///
/// The field is checked against the allow-list for the query shape before
/// construction, so a `SortSpec` that exists is safe to interpolate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    field: &'static str,
    pub order: SortOrder,
}

impl SortSpec {
    /// Default sort for the summary shape.
    pub fn summary_default() -> Self {
        Self {
            field: "scenario_id",
            order: SortOrder::Asc,
        }
    }

    /// Default sort for the detail shape: newest runs first.
    pub fn detail_default() -> Self {
        Self {
            field: "started_at",
            order: SortOrder::Desc,
        }
    }

    pub fn summary(field: &str, order: SortOrder) -> Result<Self, ValidationError> {
        Self::from_allow_list(SUMMARY_SORT_FIELDS, field, order)
    }

    pub fn detail(field: &str, order: SortOrder) -> Result<Self, ValidationError> {
        Self::from_allow_list(DETAIL_SORT_FIELDS, field, order)
    }

    fn from_allow_list(
        fields: &'static [&'static str],
        field: &str,
        order: SortOrder,
    ) -> Result<Self, ValidationError> {
        let field = fields
            .iter()
            .find(|allowed| **allowed == field)
            .ok_or(ValidationError::InvalidSortField)?;
        Ok(Self { field, order })
    }

    pub fn field(&self) -> &'static str {
        self.field
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.order.as_sql())
    }
}

/// Validated limit/offset pair for admin pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
}

pub const MIN_LIMIT: usize = 1;
pub const MAX_LIMIT: usize = 1000;
pub const DEFAULT_LIMIT: usize = 100;

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: usize, offset: usize) -> Result<Self, ValidationError> {
        if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
            return Err(ValidationError::InvalidLimit);
        }
        Ok(Self { limit, offset })
    }
}

/// The resolved date window a query is evaluated over.
///
/// Either the validated explicit interval or the default window reaching from
/// the first day of `truncate-to-month(now) - lookback_months` up to `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EffectiveWindow {
    pub fn resolve(interval: &DateInterval, now: DateTime<Utc>, lookback_months: u32) -> Self {
        let start = interval
            .start
            .unwrap_or_else(|| default_window_start(now, lookback_months));
        let end = interval.end.unwrap_or(now);
        Self { start, end }
    }

    fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }
}

/// First day, at midnight, of the month `lookback_months` before `now`.
fn default_window_start(now: DateTime<Utc>, lookback_months: u32) -> DateTime<Utc> {
    let total = now.year() * 12 + now.month() as i32 - 1 - lookback_months as i32;
    let (year, month) = (total.div_euclid(12), total.rem_euclid(12) as u32 + 1);
    NaiveDate::from_ymd_opt(year, month, 1)
        .expect("first day of a month is always a valid date")
        .and_time(NaiveTime::MIN)
        .and_utc()
}

fn window_predicate(window: &EffectiveWindow) -> String {
    format!(
        "started_at >= {} AND started_at <= {}",
        window.start_ms(),
        window.end_ms()
    )
}

fn status_predicate(status: StatusFilter) -> Option<String> {
    match status {
        StatusFilter::All => None,
        StatusFilter::Passed => Some("outcome = 'passed'".to_string()),
        StatusFilter::Failed => Some("outcome = 'failed'".to_string()),
    }
}

fn scenarios_predicate(scenarios: Option<&[ScenarioId]>) -> Option<String> {
    let scenarios = scenarios.filter(|s| !s.is_empty())?;
    let quoted = scenarios
        .iter()
        .map(|id| format!("'{}'", id.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("scenario_id IN ({quoted})"))
}

fn summary_predicates(
    window: &EffectiveWindow,
    scenarios: Option<&[ScenarioId]>,
    status: StatusFilter,
) -> String {
    let mut predicates = vec![
        "scenario_id IS NOT NULL".to_string(),
        window_predicate(window),
    ];
    predicates.extend(scenarios_predicate(scenarios));
    predicates.extend(status_predicate(status));
    predicates.join(" AND ")
}

fn detail_predicates(
    scenario: &ScenarioId,
    window: &EffectiveWindow,
    status: StatusFilter,
) -> String {
    let mut predicates = vec![
        format!("scenario_id = '{}'", scenario.as_str()),
        window_predicate(window),
    ];
    predicates.extend(status_predicate(status));
    predicates.join(" AND ")
}

fn page_clause(page: Option<&Pagination>) -> String {
    match page {
        Some(page) => format!(" LIMIT {} OFFSET {}", page.limit, page.offset),
        None => String::new(),
    }
}

/// Per-scenario pass/fail counts over the effective window.
pub fn build_summary_query(
    window: &EffectiveWindow,
    scenarios: Option<&[ScenarioId]>,
    status: StatusFilter,
    sort: &SortSpec,
    page: Option<&Pagination>,
) -> String {
    format!(
        "SELECT scenario_id, \
         CAST(COUNT(*) AS BIGINT) AS runs, \
         CAST(SUM(CASE WHEN outcome = 'passed' THEN 1 ELSE 0 END) AS BIGINT) AS success_count, \
         CAST(SUM(CASE WHEN outcome = 'failed' THEN 1 ELSE 0 END) AS BIGINT) AS failed_count \
         FROM {BENCHMARK_TABLE} WHERE {} GROUP BY scenario_id ORDER BY {}{}",
        summary_predicates(window, scenarios, status),
        sort,
        page_clause(page),
    )
}

/// Number of distinct scenarios the summary query would return unpaginated.
pub fn build_summary_count_query(
    window: &EffectiveWindow,
    scenarios: Option<&[ScenarioId]>,
    status: StatusFilter,
) -> String {
    format!(
        "SELECT CAST(COUNT(*) AS BIGINT) AS total_count FROM \
         (SELECT scenario_id FROM {BENCHMARK_TABLE} WHERE {} GROUP BY scenario_id) AS scenarios",
        summary_predicates(window, scenarios, status),
    )
}

/// Raw metric rows for one scenario over the effective window.
///
/// Applies the query-level rounding policy: cpu/memory/cost rounded to 2
/// decimal places and cast to integers, duration rounded to 2 decimal places.
pub fn build_detail_query(
    scenario: &ScenarioId,
    window: &EffectiveWindow,
    status: StatusFilter,
    sort: &SortSpec,
    page: Option<&Pagination>,
) -> String {
    format!(
        "SELECT scenario_id, \
         CAST(ROUND(cpu_seconds, 2) AS BIGINT) AS cpu_seconds, \
         CAST(ROUND(memory_seconds, 2) AS BIGINT) AS memory_seconds, \
         CAST(ROUND(cost, 2) AS BIGINT) AS cost, \
         ROUND(duration_seconds, 2) AS duration_seconds, \
         input_pixels, max_executor_memory, network_received_bytes, started_at, outcome \
         FROM {BENCHMARK_TABLE} WHERE {} ORDER BY {}{}",
        detail_predicates(scenario, window, status),
        sort,
        page_clause(page),
    )
}

/// Number of rows the detail query would return unpaginated.
pub fn build_detail_count_query(
    scenario: &ScenarioId,
    window: &EffectiveWindow,
    status: StatusFilter,
) -> String {
    format!(
        "SELECT CAST(COUNT(*) AS BIGINT) AS total_count FROM {BENCHMARK_TABLE} WHERE {}",
        detail_predicates(scenario, window, status),
    )
}
