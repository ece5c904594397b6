//! Instants, query windows and the timestamp formats the appliance speaks.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::error::{Error, Result};

/// One end of a query window: either an absolute UTC instant or an offset
/// relative to some other instant ("two hours before the end").
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeSpec {
    Absolute(DateTime<Utc>),
    Relative(Duration),
}

/// Resolve a possibly-relative window into absolute instants.
///
/// Both ends relative: both are measured from `now`. Only the start
/// relative: it is measured from the end. Only the end relative: a
/// non-negative offset is measured from the start, a negative one from
/// `now`. The result is swapped if needed so start <= end.
pub fn resolve_interval(
    start: TimeSpec,
    end: TimeSpec,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    use TimeSpec::*;
    let (mut t0, mut t1) = match (start, end) {
        (Absolute(s), Absolute(e)) => (s, e),
        (Relative(ds), Relative(de)) => (now + ds, now + de),
        (Relative(ds), Absolute(e)) => (e + ds, e),
        (Absolute(s), Relative(de)) => {
            if de >= Duration::zero() {
                (s, s + de)
            } else {
                (s, now + de)
            }
        }
    };
    if t0 > t1 {
        std::mem::swap(&mut t0, &mut t1);
    }
    (t0, t1)
}

/// ISO 8601 UTC with exactly six fractional digits, as the appliance
/// expects in `from`/`to`, eg. `2014-04-10T16:27:37.767454Z`.
pub fn iso_string(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// POSIX seconds of Jan 1 00:00:00 UTC of `year`, the anchor for the `sec`
/// field of every sample in a segment. None when the year is out of the
/// representable range.
pub fn year_base(year: u32) -> Option<i64> {
    let date = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, 1, 1)?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

/// Parse a command line time argument: `now`, an RFC 3339 instant,
/// `YYYY-MM-DD HH:MM[:SS]` (UTC implied), or a signed duration such as
/// `-1h` or `90m`.
pub fn parse_timespec(input: &str, now: DateTime<Utc>) -> Result<TimeSpec> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("now") {
        return Ok(TimeSpec::Absolute(now));
    }

    let (negative, body) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };
    if let Ok(d) = humantime::parse_duration(body.trim()) {
        let d = Duration::from_std(d)
            .map_err(|_| Error::Config(format!("duration {input:?} out of range")))?;
        return Ok(TimeSpec::Relative(if negative { -d } else { d }));
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(input) {
        return Ok(TimeSpec::Absolute(t.with_timezone(&Utc)));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Ok(TimeSpec::Absolute(naive.and_utc()));
        }
    }

    Err(Error::Config(format!("unrecognized time {input:?}")))
}
