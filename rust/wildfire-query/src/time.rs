//! Caller date parsing and "latest" slice resolution.

use crate::{
    error::{Result, ServiceError},
    query::{session::Session, statement},
    registry::Dataset,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::debug;

/// Upper bound substituted when a date range has no maximum. Only ever used
/// inside range predicates, never returned as a resolved slice.
pub fn range_sentinel_max() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .unwrap_or(NaiveDate::MAX)
        .and_time(NaiveTime::MIN)
}

/// Parses a caller-supplied date or timestamp. Offsets are normalised to UTC.
pub fn parse_time(raw: &str) -> Result<NaiveDateTime> {
    let value = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.naive_utc());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts);
        }
    }

    Err(ServiceError::InvalidFilterValue(format!(
        "'{raw}' is not an ISO-8601 date or timestamp"
    )))
}

pub fn parse_optional_time(raw: Option<&str>) -> Result<Option<NaiveDateTime>> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(parse_time)
        .transpose()
}

/// Concrete time value a single-slice query filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "at", rename_all = "snake_case")]
pub enum TimeSlice {
    Requested(NaiveDateTime),
    Latest(NaiveDateTime),
}

impl TimeSlice {
    pub fn at(self) -> NaiveDateTime {
        match self {
            TimeSlice::Requested(at) | TimeSlice::Latest(at) => at,
        }
    }
}

/// Uses the requested time verbatim, otherwise the dataset's maximum
/// acquisition time. `None` means the dataset holds no rows yet.
pub async fn resolve_slice<S>(
    session: &mut S,
    dataset: Dataset,
    requested: Option<NaiveDateTime>,
) -> Result<Option<TimeSlice>>
where
    S: Session + ?Sized,
{
    if let Some(at) = requested {
        return Ok(Some(TimeSlice::Requested(at)));
    }

    let latest = session
        .load_times(&statement::latest_time(dataset.descriptor()))
        .await?
        .into_iter()
        .next()
        .flatten();

    debug!(dataset = dataset.descriptor().key, ?latest, "resolved latest slice");
    Ok(latest.map(TimeSlice::Latest))
}
