use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc,
};
use serde_json::Value;

/// Field-name suffixes treated as timestamps by the payload rewriters.
///
/// Matching is purely by name: any field ending in one of these is rewritten
/// whatever it actually holds.
pub const TIME_FIELD_SUFFIXES: &[&str] = &["_at", "_time", "_date", "_datetime"];

const LOCAL_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

pub fn format_date<D: Datelike>(date: &D) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

pub fn format_time(hours: u32, minutes: u32) -> String {
    format!("{hours:02}:{minutes:02}")
}

/// ISO-8601 in UTC with millisecond precision and a `Z` suffix.
pub fn to_iso_utc(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_naive(input: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Wall-clock time in `offset` to a UTC instant.
pub fn local_to_utc(local: &NaiveDateTime, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn utc_to_local(utc: &DateTime<Utc>, offset: &FixedOffset) -> NaiveDateTime {
    utc.with_timezone(offset).naive_local()
}

/// Parses a timestamp that carries its own offset, or a bare one that is
/// taken to already be UTC (the backend often omits the `Z`).
pub fn parse_utc_lenient(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    parse_naive(input).map(|naive| Utc.from_utc_datetime(&naive))
}

/// Converts a local date-time string (or an already-offset one) to ISO UTC.
/// Returns `None` and logs a warning when the input cannot be parsed.
pub fn convert_to_utc(input: &str, offset: &FixedOffset) -> Option<String> {
    let trimmed = input.trim();
    let converted = match DateTime::parse_from_rfc3339(trimmed) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(_) => parse_naive(trimmed).and_then(|naive| local_to_utc(&naive, offset)),
    };

    if converted.is_none() {
        tracing::warn!(input, "could not convert time to UTC");
    }
    converted.map(|dt| to_iso_utc(&dt))
}

/// Converts a UTC timestamp to `YYYY-MM-DD HH:MM` wall-clock time in `offset`.
pub fn convert_from_utc(iso_utc: &str, offset: &FixedOffset) -> Option<String> {
    let converted = parse_utc_lenient(iso_utc)
        .map(|utc| utc_to_local(&utc, offset).format(LOCAL_DISPLAY_FORMAT).to_string());
    if converted.is_none() {
        tracing::warn!(input = iso_utc, "could not convert time from UTC");
    }
    converted
}

pub fn is_time_field(name: &str) -> bool {
    TIME_FIELD_SUFFIXES
        .iter()
        .any(|suffix| name.len() > suffix.len() && name.ends_with(suffix))
}

fn epoch_millis_to_utc(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .and_then(DateTime::from_timestamp_millis)
}

fn rewrite_time_fields<F>(value: &Value, rewrite: &F) -> Value
where
    F: Fn(&Value) -> Value,
{
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    let next = if is_time_field(key) {
                        rewrite(v)
                    } else {
                        rewrite_time_fields(v, rewrite)
                    };
                    (key.clone(), next)
                })
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| rewrite_time_fields(v, rewrite)).collect())
        }
        other => other.clone(),
    }
}

/// Deep-walks a request payload and rewrites every time-named field to ISO UTC.
///
/// Strings are parsed as local wall-clock time, numbers as epoch milliseconds,
/// `null` is kept. Anything unparseable (including objects or arrays stored
/// under a time-named key) becomes `null`.
pub fn convert_time_params_to_utc(value: &Value, offset: &FixedOffset) -> Value {
    rewrite_time_fields(value, &|v: &Value| match v {
        Value::Null => Value::Null,
        Value::String(s) => convert_to_utc(s, offset)
            .map(Value::String)
            .unwrap_or(Value::Null),
        Value::Number(_) => epoch_millis_to_utc(v)
            .map(|dt| Value::String(to_iso_utc(&dt)))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

/// Deep-walks a response payload and rewrites every time-named field from UTC
/// to `YYYY-MM-DD HH:MM` local time. Unparseable values are left untouched.
pub fn convert_time_response_to_local(value: &Value, offset: &FixedOffset) -> Value {
    rewrite_time_fields(value, &|v: &Value| match v {
        Value::String(s) => convert_from_utc(s, offset)
            .map(Value::String)
            .unwrap_or_else(|| v.clone()),
        other => other.clone(),
    })
}

/// Serde adapter for backend instants that may lack a `Z` suffix.
pub mod utc_lenient {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_iso_utc(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_utc_lenient(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
