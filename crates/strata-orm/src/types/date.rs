//! Temporal rich types: `Date`, `DateTime` and `Timestamp`.
//!
//! Storage text is parsed with the configured format first, then RFC 3339,
//! then the SQL default `"%Y-%m-%d %H:%M:%S"`. The literal `"now"` reads as
//! the current instant.

use std::fmt::Write;

use chrono::{NaiveDate, NaiveDateTime, Utc};

use super::{RichValue, RichValueExt, TransformContext, Typeable};
use crate::value::Value;

const SQL_DATETIME: &str = "%Y-%m-%d %H:%M:%S";
const ISO_DATETIME: &str = "%Y-%m-%dT%H:%M:%S";

/// Render with a user-supplied format; `None` if the format is invalid.
fn format_with(item: impl std::fmt::Display, out: &mut String) -> Option<()> {
    write!(out, "{item}").ok()
}

fn format_datetime(value: &NaiveDateTime, format: &str) -> Option<String> {
    let mut out = String::new();
    format_with(value.format(format), &mut out).map(|()| out)
}

fn format_date(value: &NaiveDate, format: &str) -> Option<String> {
    let mut out = String::new();
    format_with(value.format(format), &mut out).map(|()| out)
}

fn is_now(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("now")
}

/// Parse datetime text in any of the accepted shapes.
fn parse_datetime_text(s: &str, format: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
        return Some(dt);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fallback in [SQL_DATETIME, ISO_DATETIME] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fallback) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn from_unix(seconds: i64) -> Option<chrono::DateTime<Utc>> {
    chrono::DateTime::from_timestamp(seconds, 0)
}

fn now_seconds() -> chrono::DateTime<Utc> {
    let now = Utc::now();
    from_unix(now.timestamp()).unwrap_or(now)
}

/// Calendar date, stored as text in the configured date format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(pub NaiveDate);

impl Date {
    #[must_use]
    pub fn today() -> Self {
        Self(Utc::now().date_naive())
    }
}

impl RichValue for Date {
    fn to_storage(&self, ctx: &TransformContext<'_>) -> Option<Value> {
        format_date(&self.0, &ctx.formats.date).map(Value::Text)
    }

    fn to_display(&self) -> Option<String> {
        Some(self.0.to_string())
    }

    fn to_plain(&self, ctx: &TransformContext<'_>) -> Option<serde_json::Value> {
        format_date(&self.0, &ctx.formats.date).map(serde_json::Value::String)
    }
}

impl Typeable for Date {
    fn from_storage(raw: &Value, ctx: &TransformContext<'_>) -> Option<Self> {
        match raw {
            Value::Text(s) if is_now(s) => Some(Self::today()),
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), &ctx.formats.date)
                .ok()
                .or_else(|| parse_datetime_text(s, &ctx.formats.datetime).map(|dt| dt.date()))
                .map(Self),
            Value::Int(seconds) => from_unix(*seconds).map(|dt| Self(dt.date_naive())),
            Value::Rich(rich) => {
                let any = rich.as_any();
                any.downcast_ref::<Self>().copied().or_else(|| {
                    any.downcast_ref::<DateTime>()
                        .map(|dt| Self(dt.0.date()))
                })
            }
            _ => None,
        }
    }
}

impl From<Date> for Value {
    fn from(value: Date) -> Self {
        Self::rich(value)
    }
}

/// Wall-clock datetime (UTC), stored as text in the configured format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime(pub NaiveDateTime);

impl DateTime {
    /// Current instant, truncated to whole seconds.
    #[must_use]
    pub fn now() -> Self {
        Self(now_seconds().naive_utc())
    }
}

impl RichValue for DateTime {
    fn to_storage(&self, ctx: &TransformContext<'_>) -> Option<Value> {
        format_datetime(&self.0, &ctx.formats.datetime).map(Value::Text)
    }

    fn to_display(&self) -> Option<String> {
        format_datetime(&self.0, SQL_DATETIME)
    }

    fn to_plain(&self, ctx: &TransformContext<'_>) -> Option<serde_json::Value> {
        format_datetime(&self.0, &ctx.formats.datetime).map(serde_json::Value::String)
    }
}

impl Typeable for DateTime {
    fn from_storage(raw: &Value, ctx: &TransformContext<'_>) -> Option<Self> {
        match raw {
            Value::Text(s) if is_now(s) => Some(Self::now()),
            Value::Text(s) => parse_datetime_text(s, &ctx.formats.datetime).map(Self),
            Value::Int(seconds) => from_unix(*seconds).map(|dt| Self(dt.naive_utc())),
            Value::Rich(rich) => {
                let any = rich.as_any();
                any.downcast_ref::<Self>().copied().or_else(|| {
                    any.downcast_ref::<Timestamp>()
                        .map(|ts| Self(ts.0.naive_utc()))
                })
            }
            _ => None,
        }
    }
}

impl From<DateTime> for Value {
    fn from(value: DateTime) -> Self {
        Self::rich(value)
    }
}

/// Instant stored as integer unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub chrono::DateTime<Utc>);

impl Timestamp {
    #[must_use]
    pub fn now() -> Self {
        Self(now_seconds())
    }

    #[must_use]
    pub fn from_unix(seconds: i64) -> Option<Self> {
        from_unix(seconds).map(Self)
    }
}

impl RichValue for Timestamp {
    fn to_storage(&self, _ctx: &TransformContext<'_>) -> Option<Value> {
        Some(Value::Int(self.0.timestamp()))
    }

    fn to_display(&self) -> Option<String> {
        Some(self.0.to_rfc3339())
    }

    fn to_plain(&self, _ctx: &TransformContext<'_>) -> Option<serde_json::Value> {
        Some(serde_json::Value::from(self.0.timestamp()))
    }
}

impl Typeable for Timestamp {
    fn from_storage(raw: &Value, ctx: &TransformContext<'_>) -> Option<Self> {
        match raw {
            Value::Int(seconds) => Self::from_unix(*seconds),
            Value::Text(s) if is_now(s) => Some(Self::now()),
            Value::Text(s) => s.trim().parse::<i64>().map_or_else(
                |_| parse_datetime_text(s, &ctx.formats.datetime).map(|dt| Self(dt.and_utc())),
                Self::from_unix,
            ),
            Value::Rich(rich) => {
                let any = rich.as_any();
                any.downcast_ref::<Self>()
                    .copied()
                    .or_else(|| any.downcast_ref::<DateTime>().map(|dt| Self(dt.0.and_utc())))
            }
            _ => None,
        }
    }
}

impl From<Timestamp> for Value {
    fn from(value: Timestamp) -> Self {
        Self::rich(value)
    }
}
