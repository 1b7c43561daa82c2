use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The maximum accepted length of a scenario id.
pub const MAX_SCENARIO_ID_LEN: usize = 64;

/// Error produced when a scenario id fails validation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScenarioIdError {
    #[error("scenario id must not be empty")]
    Empty,
    #[error("scenario id must be at most {MAX_SCENARIO_ID_LEN} characters")]
    TooLong,
    #[error("scenario id may only contain ASCII letters, digits, '-' and '_'")]
    InvalidCharacter,
}

/// A validated scenario identifier.
///
/// Scenario ids name a benchmark test case and are the unit of grouping for
/// summary statistics. They are accepted from untrusted request input and end
/// up interpolated into query text, so construction is restricted to an
/// allow-listed character set: 1 to [MAX_SCENARIO_ID_LEN] characters from
/// `[A-Za-z0-9_-]`. A `ScenarioId` that exists is safe to interpolate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(String);

impl ScenarioId {
    /// Validate and wrap a raw scenario id.
    pub fn parse(raw: &str) -> Result<Self, ScenarioIdError> {
        if raw.is_empty() {
            return Err(ScenarioIdError::Empty);
        }
        if raw.len() > MAX_SCENARIO_ID_LEN {
            return Err(ScenarioIdError::TooLong);
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ScenarioIdError::InvalidCharacter);
        }
        Ok(Self(raw.to_string()))
    }

    /// The validated id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ScenarioId {
    type Err = ScenarioIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The outcome of a single benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Passed,
    Failed,
}

impl RunOutcome {
    /// The column value stored in the partition files.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Passed => "passed",
            RunOutcome::Failed => "failed",
        }
    }
}

impl FromStr for RunOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passed" => Ok(RunOutcome::Passed),
            "failed" => Ok(RunOutcome::Failed),
            other => Err(format!("unknown run outcome: {other}")),
        }
    }
}

/// One row of the detail listing for a scenario.
///
/// Sourced read-only from the scanned partition files. The metric fields carry
/// the query-level rounding policy: `cpu_seconds`, `memory_seconds` and `cost`
/// are rounded to 2 decimal places and cast to integers, `duration_seconds`
/// is rounded to 2 decimal places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRunRecord {
    /// The scenario this run belongs to
    pub scenario_id: String,
    /// CPU time consumed by the run, in seconds
    pub cpu_seconds: i64,
    /// Memory-seconds consumed by the run
    pub memory_seconds: i64,
    /// Monetary cost of the run
    pub cost: i64,
    /// Wall-clock duration of the run, in seconds
    pub duration_seconds: f64,
    /// Number of input pixels processed
    pub input_pixels: i64,
    /// Peak executor memory, in bytes
    pub max_executor_memory: i64,
    /// Bytes received over the network during the run
    pub network_received_bytes: i64,
    /// The time the run started
    pub started_at: DateTime<Utc>,
    /// Whether the run passed or failed
    pub outcome: RunOutcome,
}

/// Per-scenario aggregate of run outcomes.
///
/// Computed fresh for every query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    /// The scenario being summarised
    pub scenario_id: String,
    /// Total number of runs in the queried window
    pub runs: i64,
    /// Number of runs with outcome `passed`
    pub success_count: i64,
    /// Number of runs with outcome `failed`
    pub failed_count: i64,
    /// Success percentage rounded to 2 decimal places
    ///
    /// Not set when the scenario has no runs in the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
}

impl ScenarioSummary {
    /// Build a summary, deriving the success rate from the counts.
    pub fn new(scenario_id: String, runs: i64, success_count: i64, failed_count: i64) -> Self {
        let success_rate = if runs > 0 {
            let percentage = success_count as f64 * 100.0 / runs as f64;
            Some((percentage * 100.0).round() / 100.0)
        } else {
            None
        };
        Self {
            scenario_id,
            runs,
            success_count,
            failed_count,
            success_rate,
        }
    }
}

/// Response body of the public and admin detail endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailResponse {
    pub scenario_id: String,
    pub data: Vec<BenchmarkRunRecord>,
}

/// Pagination state reported alongside admin responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub limit: usize,
    pub offset: usize,
    pub has_next_page: bool,
}

/// The effective date window a query was evaluated over.
///
/// Either the validated explicit range or the default lookback window,
/// reported as RFC 3339 timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Echo of the filters an admin query was evaluated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiltersApplied {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenarios: Option<Vec<String>>,
    pub status: String,
    pub sort: String,
    pub order: String,
}

/// Metadata attached to every admin response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub total_count: i64,
    pub page_info: PageInfo,
    pub date_range: DateRange,
    pub filters_applied: FiltersApplied,
}

/// Envelope for the admin summary and detail endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminEnvelope<T> {
    pub data: Vec<T>,
    pub metadata: ResponseMetadata,
}

/// Error body returned on any non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_id_accepts_allowed_charset() {
        let id = ScenarioId::parse("rice_mapper-v2").unwrap();
        assert_eq!(id.as_str(), "rice_mapper-v2");
    }

    #[test]
    fn scenario_id_rejects_quotes_and_spaces() {
        assert_eq!(
            ScenarioId::parse("rice' OR 1=1 --"),
            Err(ScenarioIdError::InvalidCharacter)
        );
        assert_eq!(
            ScenarioId::parse("rice mapper"),
            Err(ScenarioIdError::InvalidCharacter)
        );
    }

    #[test]
    fn scenario_id_rejects_empty_and_oversized() {
        assert_eq!(ScenarioId::parse(""), Err(ScenarioIdError::Empty));
        let long = "a".repeat(MAX_SCENARIO_ID_LEN + 1);
        assert_eq!(ScenarioId::parse(&long), Err(ScenarioIdError::TooLong));
    }

    #[test]
    fn summary_success_rate_is_percentage_with_two_decimals() {
        let summary = ScenarioSummary::new("a".to_string(), 7, 5, 2);
        assert_eq!(summary.success_rate, Some(71.43));

        let third = ScenarioSummary::new("c".to_string(), 3, 1, 2);
        assert_eq!(third.success_rate, Some(33.33));

        let all = ScenarioSummary::new("d".to_string(), 4, 4, 0);
        assert_eq!(all.success_rate, Some(100.0));

        let empty = ScenarioSummary::new("b".to_string(), 0, 0, 0);
        assert_eq!(empty.success_rate, None);
    }

    #[test]
    fn run_outcome_round_trips_through_column_value() {
        assert_eq!("passed".parse::<RunOutcome>().unwrap(), RunOutcome::Passed);
        assert_eq!("failed".parse::<RunOutcome>().unwrap(), RunOutcome::Failed);
        assert!("skipped".parse::<RunOutcome>().is_err());
    }
}
