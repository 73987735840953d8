//! Time-bound parsing for queries. All wall-clock input is local time.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::error::{ChatlogError, ChatlogResult};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Which end of a range a bound closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

/// Parse `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`.
///
/// A date-only end bound covers the whole day (`23:59:59`); a date-only start
/// bound begins at midnight.
pub fn parse_bound(input: &str, bound: Bound) -> ChatlogResult<DateTime<Local>> {
    let input = input.trim();
    let naive = if input.contains(' ') {
        NaiveDateTime::parse_from_str(input, DATETIME_FORMAT)
            .map_err(|e| ChatlogError::Config(format!("invalid time '{input}': {e}")))?
    } else {
        let date = NaiveDate::parse_from_str(input, DATE_FORMAT)
            .map_err(|e| ChatlogError::Config(format!("invalid date '{input}': {e}")))?;
        let time = match bound {
            Bound::Start => NaiveTime::MIN,
            Bound::End => NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
        };
        date.and_time(time)
    };

    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| ChatlogError::Config(format!("'{input}' does not exist in local time")))
}

/// Convert a stored unix timestamp (seconds) to local time.
///
/// Out-of-range values collapse to the epoch rather than failing the query.
pub fn local_from_unix(ts: i64) -> DateTime<Local> {
    DateTime::from_timestamp(ts, 0)
        .map(|utc| utc.with_timezone(&Local))
        .unwrap_or_default()
}
