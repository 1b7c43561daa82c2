use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use terrabench_model::ScenarioIdError;
use thiserror::Error;

/// Rejection reasons for user-supplied query parameters.
///
/// These are client-caused and surface verbatim as 400 responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("start must be a valid date in YYYY-MM-DD format")]
    InvalidStartFormat,
    #[error("start must not be in the future")]
    StartInFuture,
    #[error("end must be a valid date in YYYY-MM-DD format")]
    InvalidEndFormat,
    #[error("end must not be in the future")]
    EndInFuture,
    #[error("start is required when end is provided")]
    StartRequiredWithEnd,
    #[error("end must be on or after start")]
    EndNotAfterStart,
    #[error("invalid scenario id: {0}")]
    InvalidScenarioId(#[from] ScenarioIdError),
    #[error("status must be one of passed, failed, all")]
    InvalidStatus,
    #[error("limit must be between 1 and 1000")]
    InvalidLimit,
    #[error("offset must be a non-negative integer")]
    InvalidOffset,
    #[error("sort must be one of the allowed fields")]
    InvalidSortField,
    #[error("order must be asc or desc")]
    InvalidOrder,
}

/// A normalized, inclusive date window.
///
/// When `end` is set, `start` is always set too and `start <= end` holds.
/// `start` sits at 00:00:00.000 and `end` at 23:59:59.999 of their calendar
/// days, so a same-day range is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateInterval {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateInterval {
    /// Whether the caller supplied an explicit range.
    ///
    /// Explicit ranges bypass the discovery cache.
    pub fn is_explicit(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}

/// Start-of-day boundary for a calendar date.
fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// End-of-day boundary (23:59:59.999) for a calendar date.
fn day_end(date: NaiveDate) -> DateTime<Utc> {
    let end = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
        .unwrap_or(NaiveTime::MIN);
    date.and_time(end).and_utc()
}

/// Validate and normalize the `start`/`end` query parameters.
///
/// Pure in `now` and the inputs. Rules are checked in a fixed order so that
/// each failure maps to exactly one [ValidationError] variant.
pub fn validate_range(
    now: DateTime<Utc>,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<DateInterval, ValidationError> {
    let today_end = day_end(now.date_naive());

    let start_date = match start {
        Some(raw) => {
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| ValidationError::InvalidStartFormat)?;
            let start = day_start(date);
            if start > today_end {
                return Err(ValidationError::StartInFuture);
            }
            Some(start)
        }
        None => None,
    };

    let end_date = match end {
        Some(raw) => {
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| ValidationError::InvalidEndFormat)?;
            let end = day_end(date);
            if end > today_end {
                return Err(ValidationError::EndInFuture);
            }
            Some(end)
        }
        None => None,
    };

    if end_date.is_some() && start_date.is_none() {
        return Err(ValidationError::StartRequiredWithEnd);
    }

    if let (Some(start), Some(end)) = (start_date, end_date) {
        if end <= start {
            return Err(ValidationError::EndNotAfterStart);
        }
    }

    Ok(DateInterval {
        start: start_date,
        end: end_date,
    })
}
